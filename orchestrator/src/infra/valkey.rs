//! Valkey-backed store.
//!
//! Rows are JSON strings under `outpost:*` keys (see
//! [`outpost_common::store_keys`]). Inserts claim the row key with `SET NX`,
//! updates require it with `SET XX`, and ids come from per-entity `INCR`
//! counters. A row and its index key are written by one Lua script, so a
//! reader never sees one without the other.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use fred::prelude::*;
use outpost_common::{
    ClusterInstance, Deployment, DeploymentId, DeploymentStatus, NetworkInstance,
    OrchestratorConfig, RunningInstance, StorageInstance, WorkloadDefinition, cluster_id_key,
    cluster_key, deployment_event_key, deployment_key, instance_key, network_key, sequence_key,
    storage_key, workload_key,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::application::ports::{
    ClusterRepository, DeploymentRepository, Insertion, NetworkRepository,
    RunningInstanceRepository, StorageRepository, WorkloadDefinitionRepository,
};

/// `SET NX` on `KEYS[1]`; only when that claim wins, `KEYS[2]` is written
/// in the same step. Returns 1 for a won claim, 0 otherwise.
const CLAIM_WITH_COMPANION: &str = r"
if redis.call('SET', KEYS[1], ARGV[1], 'NX') then
  redis.call('SET', KEYS[2], ARGV[2])
  return 1
end
return 0
";

#[derive(Clone)]
pub struct ValkeyStore {
    client: Client,
}

impl ValkeyStore {
    /// Connect and verify the connection with a `PING`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the server is unreachable.
    pub async fn connect(config: &OrchestratorConfig) -> Result<Self> {
        let mut fred_config =
            Config::from_url(&config.valkey_url).context("invalid Valkey URL")?;
        fred_config.username.clone_from(&config.valkey_user);
        fred_config.password.clone_from(&config.valkey_password);

        let client = Builder::from_config(fred_config)
            .with_connection_config(|conn_config| {
                conn_config.connection_timeout = Duration::from_secs(5);
                conn_config.internal_command_timeout = Duration::from_secs(10);
            })
            .set_policy(ReconnectPolicy::new_exponential(0, 100, 5000, 5))
            .build()?;

        client.init().await?;
        client
            .ping::<String>(None)
            .await
            .context("Valkey startup PING failed")?;

        tracing::info!(valkey_url = %config.valkey_url, "Valkey connection ready");
        Ok(Self { client })
    }

    async fn next_id(&self, entity: &str) -> Result<u64> {
        self.client
            .incr::<u64, _>(sequence_key(entity))
            .await
            .with_context(|| format!("allocating {entity} id"))
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let raw: Option<String> = self.client.get(key).await?;
        raw.map(|json| {
            serde_json::from_str(&json).with_context(|| format!("malformed row at {key}"))
        })
        .transpose()
    }

    /// `SET NX`; returns `false` when the key was already taken.
    async fn put_if_absent<T: Serialize>(&self, key: &str, row: &T) -> Result<bool> {
        let json = serde_json::to_string(row)?;
        let reply: Option<String> = self
            .client
            .set(key, json, None, Some(SetOptions::NX), false)
            .await?;
        Ok(reply.is_some())
    }

    /// `SET XX`; fails when there is no row to overwrite.
    async fn overwrite<T: Serialize>(&self, key: &str, row: &T) -> Result<()> {
        let json = serde_json::to_string(row)?;
        let reply: Option<String> = self
            .client
            .set(key, json, None, Some(SetOptions::XX), false)
            .await?;
        if reply.is_none() {
            bail!("no row stored at {key}");
        }
        Ok(())
    }

    /// Claim `claim_key` and write `companion_key` atomically. Returns `false`
    /// when the claim was already taken; nothing is written in that case.
    async fn claim_with_companion(
        &self,
        claim_key: &str,
        claim_value: String,
        companion_key: &str,
        companion_value: String,
    ) -> Result<bool> {
        let won: i64 = self
            .client
            .eval(
                CLAIM_WITH_COMPANION,
                vec![claim_key.to_string(), companion_key.to_string()],
                vec![claim_value, companion_value],
            )
            .await
            .with_context(|| format!("claiming {claim_key}"))?;
        Ok(won == 1)
    }

    /// Insert `row` at `key` unless one exists; returns the stored row.
    async fn insert_row<T>(&self, key: &str, row: T) -> Result<Insertion<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        if self.put_if_absent(key, &row).await? {
            return Ok(Insertion::Inserted(row));
        }
        let existing = self
            .get_json(key)
            .await?
            .with_context(|| format!("row at {key} vanished after conflicting insert"))?;
        Ok(Insertion::Existing(existing))
    }

    async fn lookup_index(&self, key: &str) -> Result<Option<DeploymentId>> {
        let raw: Option<String> = self.client.get(key).await?;
        raw.map(|id| {
            id.parse::<DeploymentId>()
                .with_context(|| format!("malformed index at {key}"))
        })
        .transpose()
    }
}

#[async_trait]
impl DeploymentRepository for ValkeyStore {
    async fn insert_deployment(&self, mut deployment: Deployment) -> Result<Insertion<Deployment>> {
        let id = self.next_id("deployment").await?;
        deployment.id = id;
        let event_key = deployment_event_key(deployment.event_id);
        let row = serde_json::to_string(&deployment)?;
        if !self
            .claim_with_companion(&event_key, id.to_string(), &deployment_key(id), row)
            .await?
        {
            let existing_id = self
                .lookup_index(&event_key)
                .await?
                .with_context(|| format!("index {event_key} vanished"))?;
            let existing = self
                .find_deployment(existing_id)
                .await?
                .with_context(|| format!("deployment {existing_id} indexed but not stored"))?;
            return Ok(Insertion::Existing(existing));
        }
        Ok(Insertion::Inserted(deployment))
    }

    async fn find_deployment(&self, id: DeploymentId) -> Result<Option<Deployment>> {
        self.get_json(&deployment_key(id)).await
    }

    async fn find_deployment_by_event(&self, event_id: Uuid) -> Result<Option<Deployment>> {
        match self.lookup_index(&deployment_event_key(event_id)).await? {
            Some(id) => self.find_deployment(id).await,
            None => Ok(None),
        }
    }

    async fn update_deployment_status(
        &self,
        id: DeploymentId,
        status: DeploymentStatus,
    ) -> Result<()> {
        let mut deployment = self
            .find_deployment(id)
            .await?
            .with_context(|| format!("deployment {id} not found"))?;
        deployment.status = status;
        self.overwrite(&deployment_key(id), &deployment).await
    }
}

#[async_trait]
impl NetworkRepository for ValkeyStore {
    async fn insert_network(
        &self,
        mut network: NetworkInstance,
    ) -> Result<Insertion<NetworkInstance>> {
        network.id = self.next_id("network").await?;
        self.insert_row(&network_key(network.deployment_id), network)
            .await
    }

    async fn find_network(&self, deployment_id: DeploymentId) -> Result<Option<NetworkInstance>> {
        self.get_json(&network_key(deployment_id)).await
    }
}

#[async_trait]
impl StorageRepository for ValkeyStore {
    async fn insert_storage(
        &self,
        mut storage: StorageInstance,
    ) -> Result<Insertion<StorageInstance>> {
        storage.id = self.next_id("storage").await?;
        self.insert_row(&storage_key(storage.deployment_id), storage)
            .await
    }

    async fn find_storage(&self, deployment_id: DeploymentId) -> Result<Option<StorageInstance>> {
        self.get_json(&storage_key(deployment_id)).await
    }

    async fn update_storage(&self, storage: &StorageInstance) -> Result<()> {
        self.overwrite(&storage_key(storage.deployment_id), storage)
            .await
    }
}

#[async_trait]
impl ClusterRepository for ValkeyStore {
    async fn insert_cluster(
        &self,
        mut cluster: ClusterInstance,
    ) -> Result<Insertion<ClusterInstance>> {
        cluster.id = self.next_id("cluster").await?;
        let key = cluster_key(cluster.deployment_id);
        let row = serde_json::to_string(&cluster)?;
        if self
            .claim_with_companion(
                &key,
                row,
                &cluster_id_key(cluster.id),
                cluster.deployment_id.to_string(),
            )
            .await?
        {
            return Ok(Insertion::Inserted(cluster));
        }
        let existing = self
            .get_json(&key)
            .await?
            .with_context(|| format!("row at {key} vanished after conflicting insert"))?;
        Ok(Insertion::Existing(existing))
    }

    async fn find_cluster(&self, deployment_id: DeploymentId) -> Result<Option<ClusterInstance>> {
        self.get_json(&cluster_key(deployment_id)).await
    }

    async fn find_cluster_by_id(&self, cluster_id: u64) -> Result<Option<ClusterInstance>> {
        match self.lookup_index(&cluster_id_key(cluster_id)).await? {
            Some(deployment_id) => self.find_cluster(deployment_id).await,
            None => Ok(None),
        }
    }
}

#[async_trait]
impl WorkloadDefinitionRepository for ValkeyStore {
    async fn insert_definition(
        &self,
        mut definition: WorkloadDefinition,
    ) -> Result<Insertion<WorkloadDefinition>> {
        definition.id = self.next_id("workload").await?;
        self.insert_row(&workload_key(definition.deployment_id), definition)
            .await
    }

    async fn find_definition(
        &self,
        deployment_id: DeploymentId,
    ) -> Result<Option<WorkloadDefinition>> {
        self.get_json(&workload_key(deployment_id)).await
    }

    async fn update_definition(&self, definition: &WorkloadDefinition) -> Result<()> {
        self.overwrite(&workload_key(definition.deployment_id), definition)
            .await
    }
}

#[async_trait]
impl RunningInstanceRepository for ValkeyStore {
    async fn insert_instance(
        &self,
        mut instance: RunningInstance,
    ) -> Result<Insertion<RunningInstance>> {
        instance.id = self.next_id("instance").await?;
        self.insert_row(&instance_key(instance.definition_id, instance.owner), instance)
            .await
    }

    async fn find_instance(
        &self,
        definition_id: u64,
        owner: Uuid,
    ) -> Result<Option<RunningInstance>> {
        self.get_json(&instance_key(definition_id, owner)).await
    }

    async fn update_instance(&self, instance: &RunningInstance) -> Result<()> {
        self.overwrite(&instance_key(instance.definition_id, instance.owner), instance)
            .await
    }

    async fn delete_instance(&self, definition_id: u64, owner: Uuid) -> Result<bool> {
        let removed: u64 = self.client.del(instance_key(definition_id, owner)).await?;
        Ok(removed > 0)
    }
}
