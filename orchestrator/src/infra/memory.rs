//! In-memory store for tests and single-process embedding.
//!
//! Data is lost when the process exits. Every insert-if-absent check and
//! write happens under one write lock, so concurrent ensures cannot both
//! insert.

use std::collections::HashMap;

use anyhow::{Result, bail};
use async_trait::async_trait;
use outpost_common::{
    ClusterInstance, Deployment, DeploymentId, DeploymentStatus, NetworkInstance,
    RunningInstance, StorageInstance, WorkloadDefinition,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::ports::{
    ClusterRepository, DeploymentRepository, Insertion, NetworkRepository,
    RunningInstanceRepository, StorageRepository, WorkloadDefinitionRepository,
};

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    deployments: HashMap<DeploymentId, Deployment>,
    deployments_by_event: HashMap<Uuid, DeploymentId>,
    networks: HashMap<DeploymentId, NetworkInstance>,
    storages: HashMap<DeploymentId, StorageInstance>,
    clusters: HashMap<DeploymentId, ClusterInstance>,
    definitions: HashMap<DeploymentId, WorkloadDefinition>,
    instances: HashMap<(u64, Uuid), RunningInstance>,
}

impl Tables {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn network_count(&self) -> usize {
        self.tables.read().await.networks.len()
    }

    pub async fn storage_count(&self) -> usize {
        self.tables.read().await.storages.len()
    }

    pub async fn cluster_count(&self) -> usize {
        self.tables.read().await.clusters.len()
    }

    pub async fn instance_count(&self) -> usize {
        self.tables.read().await.instances.len()
    }
}

#[async_trait]
impl DeploymentRepository for MemoryStore {
    async fn insert_deployment(&self, mut deployment: Deployment) -> Result<Insertion<Deployment>> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .deployments_by_event
            .get(&deployment.event_id)
            .and_then(|id| tables.deployments.get(id))
        {
            return Ok(Insertion::Existing(existing.clone()));
        }
        deployment.id = tables.allocate_id();
        tables
            .deployments_by_event
            .insert(deployment.event_id, deployment.id);
        tables.deployments.insert(deployment.id, deployment.clone());
        Ok(Insertion::Inserted(deployment))
    }

    async fn find_deployment(&self, id: DeploymentId) -> Result<Option<Deployment>> {
        Ok(self.tables.read().await.deployments.get(&id).cloned())
    }

    async fn find_deployment_by_event(&self, event_id: Uuid) -> Result<Option<Deployment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .deployments_by_event
            .get(&event_id)
            .and_then(|id| tables.deployments.get(id))
            .cloned())
    }

    async fn update_deployment_status(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let Some(deployment) = tables.deployments.get_mut(&id) else {
            bail!("deployment {id} not found");
        };
        deployment.status = status;
        Ok(())
    }
}

#[async_trait]
impl NetworkRepository for MemoryStore {
    async fn insert_network(
        &self,
        mut network: NetworkInstance,
    ) -> Result<Insertion<NetworkInstance>> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.networks.get(&network.deployment_id) {
            return Ok(Insertion::Existing(existing.clone()));
        }
        network.id = tables.allocate_id();
        tables
            .networks
            .insert(network.deployment_id, network.clone());
        Ok(Insertion::Inserted(network))
    }

    async fn find_network(&self, deployment_id: DeploymentId) -> Result<Option<NetworkInstance>> {
        Ok(self.tables.read().await.networks.get(&deployment_id).cloned())
    }
}

#[async_trait]
impl StorageRepository for MemoryStore {
    async fn insert_storage(
        &self,
        mut storage: StorageInstance,
    ) -> Result<Insertion<StorageInstance>> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.storages.get(&storage.deployment_id) {
            return Ok(Insertion::Existing(existing.clone()));
        }
        storage.id = tables.allocate_id();
        tables
            .storages
            .insert(storage.deployment_id, storage.clone());
        Ok(Insertion::Inserted(storage))
    }

    async fn find_storage(&self, deployment_id: DeploymentId) -> Result<Option<StorageInstance>> {
        Ok(self.tables.read().await.storages.get(&deployment_id).cloned())
    }

    async fn update_storage(&self, storage: &StorageInstance) -> Result<()> {
        let mut tables = self.tables.write().await;
        let Some(row) = tables.storages.get_mut(&storage.deployment_id) else {
            bail!("storage for deployment {} not found", storage.deployment_id);
        };
        *row = storage.clone();
        Ok(())
    }
}

#[async_trait]
impl ClusterRepository for MemoryStore {
    async fn insert_cluster(
        &self,
        mut cluster: ClusterInstance,
    ) -> Result<Insertion<ClusterInstance>> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.clusters.get(&cluster.deployment_id) {
            return Ok(Insertion::Existing(existing.clone()));
        }
        cluster.id = tables.allocate_id();
        tables
            .clusters
            .insert(cluster.deployment_id, cluster.clone());
        Ok(Insertion::Inserted(cluster))
    }

    async fn find_cluster(&self, deployment_id: DeploymentId) -> Result<Option<ClusterInstance>> {
        Ok(self.tables.read().await.clusters.get(&deployment_id).cloned())
    }

    async fn find_cluster_by_id(&self, cluster_id: u64) -> Result<Option<ClusterInstance>> {
        Ok(self
            .tables
            .read()
            .await
            .clusters
            .values()
            .find(|cluster| cluster.id == cluster_id)
            .cloned())
    }
}

#[async_trait]
impl WorkloadDefinitionRepository for MemoryStore {
    async fn insert_definition(
        &self,
        mut definition: WorkloadDefinition,
    ) -> Result<Insertion<WorkloadDefinition>> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.definitions.get(&definition.deployment_id) {
            return Ok(Insertion::Existing(existing.clone()));
        }
        definition.id = tables.allocate_id();
        tables
            .definitions
            .insert(definition.deployment_id, definition.clone());
        Ok(Insertion::Inserted(definition))
    }

    async fn find_definition(
        &self,
        deployment_id: DeploymentId,
    ) -> Result<Option<WorkloadDefinition>> {
        Ok(self
            .tables
            .read()
            .await
            .definitions
            .get(&deployment_id)
            .cloned())
    }


    async fn update_definition(&self, definition: &WorkloadDefinition) -> Result<()> {
        let mut tables = self.tables.write().await;
        let Some(row) = tables.definitions.get_mut(&definition.deployment_id) else {
            bail!(
                "workload definition for deployment {} not found",
                definition.deployment_id
            );
        };
        *row = definition.clone();
        Ok(())
    }
}

#[async_trait]
impl RunningInstanceRepository for MemoryStore {
    async fn insert_instance(
        &self,
        mut instance: RunningInstance,
    ) -> Result<Insertion<RunningInstance>> {
        let mut tables = self.tables.write().await;
        let key = (instance.definition_id, instance.owner);
        if let Some(existing) = tables.instances.get(&key) {
            return Ok(Insertion::Existing(existing.clone()));
        }
        instance.id = tables.allocate_id();
        tables.instances.insert(key, instance.clone());
        Ok(Insertion::Inserted(instance))
    }

    async fn find_instance(
        &self,
        definition_id: u64,
        owner: Uuid,
    ) -> Result<Option<RunningInstance>> {
        Ok(self
            .tables
            .read()
            .await
            .instances
            .get(&(definition_id, owner))
            .cloned())
    }

    async fn update_instance(&self, instance: &RunningInstance) -> Result<()> {
        let mut tables = self.tables.write().await;
        let Some(row) = tables
            .instances
            .get_mut(&(instance.definition_id, instance.owner))
        else {
            bail!(
                "running instance {} for owner {} not found",
                instance.definition_id,
                instance.owner
            );
        };
        *row = instance.clone();
        Ok(())
    }

    async fn delete_instance(&self, definition_id: u64, owner: Uuid) -> Result<bool> {
        Ok(self
            .tables
            .write()
            .await
            .instances
            .remove(&(definition_id, owner))
            .is_some())
    }
}
