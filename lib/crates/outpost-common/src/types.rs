use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Store-assigned identifier of a deployment row.
pub type DeploymentId = u64;

/// Lifecycle of an event's infrastructure. Variants are declared in the order
/// a deployment moves through them; transitions only go forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Preparing,
    Idle,
    Ready,
    Live,
    Teardown,
    Complete,
}

impl DeploymentStatus {
    /// Returns `true` when moving from `self` to `next` goes forward.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        next > self
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Idle => "idle",
            Self::Ready => "ready",
            Self::Live => "live",
            Self::Teardown => "teardown",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root entity for one event's infrastructure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Deployment {
    pub id: DeploymentId,
    /// Random identifier handed out to the event owner.
    pub instance_id: Uuid,
    /// The event this deployment belongs to. At most one deployment per event.
    pub event_id: Uuid,
    pub status: DeploymentStatus,
}

impl Deployment {
    /// A not-yet-stored deployment for `event_id` in the `Preparing` state.
    #[must_use]
    pub fn new(event_id: Uuid) -> Self {
        Self {
            id: 0,
            instance_id: Uuid::new_v4(),
            event_id,
            status: DeploymentStatus::Preparing,
        }
    }
}

/// Readiness of the private network.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkState {
    #[default]
    Pending,
    Available,
    Failed,
}

/// Private network provisioned for a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkInstance {
    pub id: u64,
    pub deployment_id: DeploymentId,
    /// Provider network identifier (e.g. `vpc-0abc`).
    pub network_id: String,
    /// Default security group of the network.
    pub security_group_id: String,
    pub internet_gateway_id: String,
    pub state: NetworkState,
}

/// File-system lifecycle as reported by the storage provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageState {
    #[default]
    Creating,
    Available,
    Updating,
    Deleting,
    Deleted,
    Error,
}

impl StorageState {
    /// The file system can never become mountable from this state.
    #[must_use]
    pub fn is_failed(self) -> bool {
        matches!(self, Self::Error | Self::Deleting | Self::Deleted)
    }

    /// The provider is still working on the file system.
    #[must_use]
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Creating | Self::Updating)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for StorageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared file system provisioned for a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StorageInstance {
    pub id: u64,
    pub deployment_id: DeploymentId,
    pub file_system_id: String,
    pub resource_arn: String,
    /// Last lifecycle state observed from the provider.
    pub state: StorageState,
}

/// Compute cluster status as reported by the provider.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    Provisioning,
    Active,
    Deprovisioning,
    Inactive,
    Failed,
}

/// Compute cluster provisioned for a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterInstance {
    pub id: u64,
    pub deployment_id: DeploymentId,
    pub name: String,
    pub arn: String,
    pub status: ClusterStatus,
}

/// A registered workload definition. Immutable once stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadDefinition {
    pub id: u64,
    pub deployment_id: DeploymentId,
    /// Family name the definition was registered under; also the log group.
    pub family: Uuid,
    pub arn: String,
    /// Storage instance the shared volume was bound to at registration.
    pub storage_id: u64,
}

/// Container health reported for a running task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
}

/// One execution of a workload definition for one owning user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunningInstance {
    pub id: u64,
    pub definition_id: u64,
    pub cluster_id: u64,
    pub owner: Uuid,
    pub task_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<String>,
    pub pull_started_at: Option<DateTime<Utc>>,
    pub pull_stopped_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stopped_reason: Option<String>,
    pub health: HealthStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
}

impl RunningInstance {
    /// A not-yet-started instance with no provider task attached.
    #[must_use]
    pub fn new(definition_id: u64, cluster_id: u64, owner: Uuid) -> Self {
        Self {
            id: 0,
            definition_id,
            cluster_id,
            owner,
            task_arn: String::new(),
            last_status: None,
            pull_started_at: None,
            pull_stopped_at: None,
            started_at: None,
            stopped_at: None,
            stopped_reason: None,
            health: HealthStatus::Unknown,
            public_ip: None,
        }
    }
}
