//! Port trait definitions for the Application layer.
//!
//! Ports are the interfaces (contracts) that infrastructure must fulfill:
//! the cloud provider's network, storage, and compute APIs, and one
//! repository per persisted entity. This file imports only from
//! `crate::domain` and `outpost_common`, never from `crate::infra`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use outpost_common::{
    ClusterInstance, ClusterStatus, Deployment, DeploymentId, DeploymentStatus, HealthStatus,
    NetworkInstance, RunningInstance, StorageInstance, StorageState, WorkloadDefinition,
};
use uuid::Uuid;

use crate::domain::TransportProtocol;

// ── Network value types ───────────────────────────────────────────────────────

/// Inbound rule added to a security group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressRule {
    /// `-1` means every protocol.
    pub protocol: String,
    pub from_port: i32,
    pub to_port: i32,
    pub cidr: String,
    pub description: String,
}

impl IngressRule {
    /// Every protocol and port from anywhere.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            protocol: "-1".to_string(),
            from_port: -1,
            to_port: -1,
            cidr: "0.0.0.0/0".to_string(),
            description: "All Traffic".to_string(),
        }
    }
}

// ── Storage value types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceMode {
    GeneralPurpose,
    MaxIo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThroughputMode {
    Bursting,
    Elastic,
    Provisioned,
}

/// Parameters of a new shared file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateFileSystem {
    /// Idempotency token for the provider call.
    pub creation_token: String,
    pub performance_mode: PerformanceMode,
    pub throughput_mode: ThroughputMode,
    pub backup: bool,
    pub encrypted: bool,
}

/// A file system as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemDescription {
    pub file_system_id: String,
    pub arn: String,
    pub state: StorageState,
}

// ── Compute value types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDescription {
    pub name: String,
    pub arn: String,
    pub status: ClusterStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub name: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Container log shipping: one group per workload family, one stream prefix
/// per image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfiguration {
    pub group: String,
    pub stream_prefix: String,
    pub region: String,
    pub create_group: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppProtocol {
    Http,
    Http2,
    Grpc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub name: String,
    pub container_port: u16,
    pub host_port: Option<u16>,
    pub protocol: TransportProtocol,
    pub app_protocol: AppProtocol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPoint {
    pub container_path: String,
    pub source_volume: String,
    pub read_only: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerDefinition {
    pub name: String,
    pub image: String,
    pub essential: Option<bool>,
    pub log: LogConfiguration,
    pub environment: Vec<KeyValue>,
    pub port_mappings: Vec<PortMapping>,
    pub mount_points: Vec<MountPoint>,
}

/// A task volume backed by the shared file system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedVolume {
    pub name: String,
    pub file_system_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    /// Each task gets its own interface in the deployment network.
    Vpc,
    Bridge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchType {
    /// Serverless capacity managed by the provider.
    Fargate,
    Ec2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterTaskDefinition {
    pub family: String,
    pub cpu: String,
    pub memory: String,
    pub network_mode: NetworkMode,
    pub launch_type: LaunchType,
    pub execution_role_arn: String,
    pub task_role_arn: String,
    pub containers: Vec<ContainerDefinition>,
    pub volumes: Vec<SharedVolume>,
}

/// Per-container environment injected at run time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerOverride {
    pub container_name: String,
    pub environment: Vec<KeyValue>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunTask {
    pub cluster_arn: String,
    pub task_definition_arn: String,
    pub count: u32,
    pub launch_type: LaunchType,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
    pub overrides: Vec<ContainerOverride>,
    /// Correlation reference, fresh per request.
    pub reference_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAttachment {
    /// e.g. `ElasticNetworkInterface`.
    pub kind: String,
    pub details: Vec<KeyValue>,
}

/// A task as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TaskDescription {
    pub task_arn: String,
    pub last_status: Option<String>,
    /// `None` when the provider did not report a recognised health value.
    pub health: Option<HealthStatus>,
    pub pull_started_at: Option<DateTime<Utc>>,
    pub pull_stopped_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stopped_reason: Option<String>,
    pub attachments: Vec<TaskAttachment>,
}

/// Per-task failure reported inside an otherwise successful run response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskFailure {
    pub arn: Option<String>,
    pub reason: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunTaskOutput {
    pub tasks: Vec<TaskDescription>,
    pub failures: Vec<TaskFailure>,
}

// ── Cloud Provider Port Traits ────────────────────────────────────────────────

/// Private network provisioning.
#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// Allocate a network with the given address block; returns its id.
    async fn create_network(&self, cidr: &str) -> Result<String>;
    /// Enable internal name resolution (DNS hostnames) for the network.
    async fn enable_dns_hostnames(&self, network_id: &str) -> Result<()>;
    /// Create a subnet; returns its id.
    async fn create_subnet(&self, network_id: &str, zone_id: &str, cidr: &str) -> Result<String>;
    /// Create an internet gateway; returns its id.
    async fn create_internet_gateway(&self) -> Result<String>;
    async fn attach_internet_gateway(&self, gateway_id: &str, network_id: &str) -> Result<()>;
    /// Security groups of the network, default group first.
    async fn describe_security_groups(&self, network_id: &str) -> Result<Vec<String>>;
    async fn authorize_ingress(&self, security_group_id: &str, rule: &IngressRule) -> Result<()>;
    /// Route tables of the network, main table first.
    async fn describe_route_tables(&self, network_id: &str) -> Result<Vec<String>>;
    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        gateway_id: &str,
    ) -> Result<()>;
    /// Ids of every subnet in the network.
    async fn describe_subnets(&self, network_id: &str) -> Result<Vec<String>>;
    /// Public address associated with a network interface, if any.
    async fn describe_network_interface(&self, interface_id: &str) -> Result<Option<String>>;
}

/// Shared file-system provisioning.
#[async_trait]
pub trait StorageApi: Send + Sync {
    async fn create_file_system(&self, request: &CreateFileSystem)
    -> Result<FileSystemDescription>;
    async fn describe_file_system(&self, file_system_id: &str) -> Result<FileSystemDescription>;
    /// Attach the file system to a subnet; returns the mount target's state.
    async fn create_mount_target(
        &self,
        file_system_id: &str,
        subnet_id: &str,
        security_group_id: &str,
    ) -> Result<StorageState>;
}

/// Container compute: clusters, task definitions, and tasks.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn create_cluster(&self, name: &str) -> Result<ClusterDescription>;
    /// Register a task definition; returns its ARN.
    async fn register_task_definition(&self, request: &RegisterTaskDefinition) -> Result<String>;
    /// Names of the containers declared by a registered task definition.
    async fn describe_task_definition(&self, arn: &str) -> Result<Vec<String>>;
    async fn run_task(&self, request: &RunTask) -> Result<RunTaskOutput>;
    async fn describe_tasks(
        &self,
        cluster_arn: &str,
        task_arns: &[String],
    ) -> Result<Vec<TaskDescription>>;
    async fn stop_task(
        &self,
        cluster_arn: &str,
        task_arn: &str,
        reason: &str,
    ) -> Result<TaskDescription>;
}

/// Composite trait: any type implementing all three APIs is a `CloudProvider`.
pub trait CloudProvider: NetworkApi + StorageApi + ComputeApi {}

/// Blanket implementation: any type implementing all three APIs is a `CloudProvider`.
impl<T> CloudProvider for T where T: NetworkApi + StorageApi + ComputeApi {}

// ── Persistence Port Traits ───────────────────────────────────────────────────

/// Result of a conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion<T> {
    /// The row was stored; the store assigned its id.
    Inserted(T),
    /// A row already occupied the slot; it is returned unchanged.
    Existing(T),
}

impl<T> Insertion<T> {
    #[must_use]
    pub fn into_inner(self) -> T {
        match self {
            Self::Inserted(row) | Self::Existing(row) => row,
        }
    }

    #[must_use]
    pub fn was_inserted(&self) -> bool {
        matches!(self, Self::Inserted(_))
    }
}

/// Deployment rows, unique per event.
#[async_trait]
pub trait DeploymentRepository: Send + Sync {
    /// Store `deployment` unless one already exists for its event. The id of
    /// `deployment` is ignored.
    async fn insert_deployment(&self, deployment: Deployment) -> Result<Insertion<Deployment>>;
    async fn find_deployment(&self, id: DeploymentId) -> Result<Option<Deployment>>;
    async fn find_deployment_by_event(&self, event_id: Uuid) -> Result<Option<Deployment>>;
    async fn update_deployment_status(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
    ) -> Result<()>;
}

/// Network rows, unique per deployment.
#[async_trait]
pub trait NetworkRepository: Send + Sync {
    async fn insert_network(&self, network: NetworkInstance) -> Result<Insertion<NetworkInstance>>;
    async fn find_network(&self, deployment_id: DeploymentId) -> Result<Option<NetworkInstance>>;
}

/// Storage rows, unique per deployment.
#[async_trait]
pub trait StorageRepository: Send + Sync {
    async fn insert_storage(&self, storage: StorageInstance) -> Result<Insertion<StorageInstance>>;
    async fn find_storage(&self, deployment_id: DeploymentId) -> Result<Option<StorageInstance>>;
    async fn update_storage(&self, storage: &StorageInstance) -> Result<()>;
}

/// Cluster rows, unique per deployment.
#[async_trait]
pub trait ClusterRepository: Send + Sync {
    async fn insert_cluster(&self, cluster: ClusterInstance) -> Result<Insertion<ClusterInstance>>;
    async fn find_cluster(&self, deployment_id: DeploymentId) -> Result<Option<ClusterInstance>>;
    async fn find_cluster_by_id(&self, cluster_id: u64) -> Result<Option<ClusterInstance>>;
}

/// Workload definition rows, unique per deployment.
#[async_trait]
pub trait WorkloadDefinitionRepository: Send + Sync {
    async fn insert_definition(
        &self,
        definition: WorkloadDefinition,
    ) -> Result<Insertion<WorkloadDefinition>>;
    async fn find_definition(
        &self,
        deployment_id: DeploymentId,
    ) -> Result<Option<WorkloadDefinition>>;
    async fn update_definition(&self, definition: &WorkloadDefinition) -> Result<()>;
}

/// Running instances, unique per (definition, owner).
#[async_trait]
pub trait RunningInstanceRepository: Send + Sync {
    async fn insert_instance(
        &self,
        instance: RunningInstance,
    ) -> Result<Insertion<RunningInstance>>;
    async fn find_instance(
        &self,
        definition_id: u64,
        owner: Uuid,
    ) -> Result<Option<RunningInstance>>;
    /// Overwrite an existing instance. Fails if none is stored.
    async fn update_instance(&self, instance: &RunningInstance) -> Result<()>;
    /// Remove an instance; returns `false` if none was stored.
    async fn delete_instance(&self, definition_id: u64, owner: Uuid) -> Result<bool>;
}

/// Composite trait: a store that persists every entity.
pub trait Persistence:
    DeploymentRepository
    + NetworkRepository
    + StorageRepository
    + ClusterRepository
    + WorkloadDefinitionRepository
    + RunningInstanceRepository
{
}

/// Blanket implementation: any type implementing all six repositories is a `Persistence`.
impl<T> Persistence for T where
    T: DeploymentRepository
        + NetworkRepository
        + StorageRepository
        + ClusterRepository
        + WorkloadDefinitionRepository
        + RunningInstanceRepository
{
}
