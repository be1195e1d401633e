use uuid::Uuid;

use crate::types::DeploymentId;

/// Valkey key prefixes for persisted orchestrator rows
pub mod keys {
    /// Id sequences, one counter per entity
    /// Format: outpost:seq:{entity}
    /// Value: integer (INCR)
    pub const SEQUENCE: &str = "outpost:seq";

    /// Deployment rows
    /// Format: outpost:deployment:{deployment_id}
    /// Value: JSON-serialized Deployment
    pub const DEPLOYMENT: &str = "outpost:deployment";

    /// Event to deployment index, claimed with SET NX
    /// Format: outpost:deployment:event:{event_id}
    /// Value: deployment id
    pub const DEPLOYMENT_BY_EVENT: &str = "outpost:deployment:event";

    /// Network rows, one per deployment
    /// Format: outpost:network:{deployment_id}
    /// Value: JSON-serialized NetworkInstance
    pub const NETWORK: &str = "outpost:network";

    /// Storage rows, one per deployment
    /// Format: outpost:storage:{deployment_id}
    /// Value: JSON-serialized StorageInstance
    pub const STORAGE: &str = "outpost:storage";

    /// Cluster rows, one per deployment
    /// Format: outpost:cluster:{deployment_id}
    /// Value: JSON-serialized ClusterInstance
    pub const CLUSTER: &str = "outpost:cluster";

    /// Cluster id to deployment index
    /// Format: outpost:cluster:id:{cluster_id}
    /// Value: deployment id
    pub const CLUSTER_BY_ID: &str = "outpost:cluster:id";

    /// Workload definition rows, one per deployment
    /// Format: outpost:workload:{deployment_id}
    /// Value: JSON-serialized WorkloadDefinition
    pub const WORKLOAD: &str = "outpost:workload";

    /// Running instances, one per (definition, owner)
    /// Format: outpost:instance:{definition_id}:{owner}
    /// Value: JSON-serialized RunningInstance
    pub const INSTANCE: &str = "outpost:instance";
}

/// Helper functions for key construction
pub fn sequence_key(entity: &str) -> String {
    format!("{}:{}", keys::SEQUENCE, entity)
}

pub fn deployment_key(id: DeploymentId) -> String {
    format!("{}:{}", keys::DEPLOYMENT, id)
}

pub fn deployment_event_key(event_id: Uuid) -> String {
    format!("{}:{}", keys::DEPLOYMENT_BY_EVENT, event_id)
}

pub fn network_key(deployment_id: DeploymentId) -> String {
    format!("{}:{}", keys::NETWORK, deployment_id)
}

pub fn storage_key(deployment_id: DeploymentId) -> String {
    format!("{}:{}", keys::STORAGE, deployment_id)
}

pub fn cluster_key(deployment_id: DeploymentId) -> String {
    format!("{}:{}", keys::CLUSTER, deployment_id)
}

pub fn cluster_id_key(cluster_id: u64) -> String {
    format!("{}:{}", keys::CLUSTER_BY_ID, cluster_id)
}

pub fn workload_key(deployment_id: DeploymentId) -> String {
    format!("{}:{}", keys::WORKLOAD, deployment_id)
}

pub fn instance_key(definition_id: u64, owner: Uuid) -> String {
    format!("{}:{}:{}", keys::INSTANCE, definition_id, owner)
}
