pub mod config;
pub mod store_keys;
pub mod types;

pub use config::OrchestratorConfig;
pub use store_keys::{
    cluster_id_key, cluster_key, deployment_event_key, deployment_key, instance_key, keys,
    network_key, sequence_key, storage_key, workload_key,
};
pub use types::*;
