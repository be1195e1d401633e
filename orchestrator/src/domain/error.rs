//! Typed domain error enums.
//!
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator. Callers at the HTTP edge recover them with
//! [`OrchestratorError::find`].

use outpost_common::{DeploymentId, DeploymentStatus, StorageState};
use thiserror::Error;

// ── Orchestrator errors ───────────────────────────────────────────────────────

/// Stable, named failures the HTTP layer is expected to special-case.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("the deployment does not exist")]
    DeploymentMissing,

    #[error("the deployment is not ready (status: {status})")]
    DeploymentNotReady { status: DeploymentStatus },

    #[error("the deployment is missing a network")]
    NetworkMissing,

    #[error("the deployment is missing a file system")]
    StorageMissing,

    #[error("the deployment file system is not available (state: {state})")]
    StorageNotReady { state: StorageState },

    #[error("the deployment is missing a cluster")]
    ClusterMissing,

    #[error("the deployment is missing a workload definition")]
    WorkloadDefinitionMissing,

    #[error("no running instance exists for this owner")]
    RunningInstanceMissing,

    #[error("the task failed to start: {reason}")]
    RunTaskFailure {
        arn: Option<String>,
        reason: String,
        detail: Option<String>,
    },

    #[error("a workload definition needs at least one container")]
    EmptyWorkloadSpec,
}

impl OrchestratorError {
    /// Locate a sentinel anywhere in an error's context chain.
    #[must_use]
    pub fn find(err: &anyhow::Error) -> Option<&Self> {
        err.downcast_ref::<Self>()
            .or_else(|| err.chain().find_map(|cause| cause.downcast_ref::<Self>()))
    }
}

/// Returns `true` when the failure is something the caller can correct
/// (missing dependency, not-ready deployment, rejected run). Everything else
/// is an infrastructure failure.
#[must_use]
pub fn is_client_correctable(err: &anyhow::Error) -> bool {
    OrchestratorError::find(err).is_some()
}

// ── Persistence context ───────────────────────────────────────────────────────

/// Context attached to store failures so they can be told apart from remote
/// provisioning failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("failed to persist {entity} for deployment {deployment_id}")]
pub struct PersistenceFailure {
    pub entity: &'static str,
    pub deployment_id: DeploymentId,
}

impl PersistenceFailure {
    #[must_use]
    pub fn is_cause_of(err: &anyhow::Error) -> bool {
        err.downcast_ref::<Self>().is_some()
    }
}

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors raised while validating the orchestrator configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid CIDR block: {0}")]
    InvalidCidr(String),

    #[error("At least one availability zone is required")]
    NoAvailabilityZones,

    #[error("Subnet prefix /{subnet} must be longer than the network prefix /{network}")]
    SubnetPrefixTooShort { subnet: u8, network: u8 },

    #[error("{zones} availability zones do not fit: the network holds {capacity} subnets")]
    TooManyZones { zones: usize, capacity: u64 },

    #[error("Storage poll interval must be at least one second")]
    ZeroPollInterval,
}
