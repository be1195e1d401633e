//! Domain layer: pure types, errors, and validation.
//!
//! This module has zero imports from `crate::infra` or `crate::application`,
//! no `tokio`, and no I/O. All functions take data in and return data out.

pub mod error;
pub mod network;
pub mod workload;

pub use error::{ConfigError, OrchestratorError, PersistenceFailure, is_client_correctable};
pub use network::{DEFAULT_ROUTE, Ipv4Cidr, NetworkLayout, SubnetPlan};
pub use workload::{
    ContainerSpec, EnvVar, EventFlag, PortSpec, SHARED_VOLUME_NAME, TransportProtocol,
    VolumeMount, WorkloadSpec,
};
