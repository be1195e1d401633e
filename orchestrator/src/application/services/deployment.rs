//! Deployment orchestration façade.
//!
//! Sequences network, storage, and cluster provisioning for a deployment and
//! gates the workload and instance operations on the deployment being idle.
//! This is the only surface the HTTP layer calls.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use outpost_common::{
    Deployment, DeploymentId, DeploymentStatus, OrchestratorConfig, RunningInstance,
    WorkloadDefinition,
};
use uuid::Uuid;

use crate::application::ports::{CloudProvider, Insertion, Persistence};
use crate::application::services::cluster::ClusterProvisioner;
use crate::application::services::instance::InstanceManager;
use crate::application::services::network::NetworkProvisioner;
use crate::application::services::storage::StorageProvisioner;
use crate::application::services::workload::{RegistrationIdentity, WorkloadRegistrar};
use crate::domain::error::{ConfigError, OrchestratorError, PersistenceFailure};
use crate::domain::network::NetworkLayout;
use crate::domain::workload::{EventFlag, WorkloadSpec};

/// Entry point for every provisioning and lifecycle operation.
pub struct Orchestrator<P, S> {
    store: Arc<S>,
    network: NetworkProvisioner<P, S>,
    storage: StorageProvisioner<P, S>,
    cluster: ClusterProvisioner<P, S>,
    workload: WorkloadRegistrar<P, S>,
    instances: InstanceManager<P, S>,
}

impl<P, S> Orchestrator<P, S>
where
    P: CloudProvider + 'static,
    S: Persistence + 'static,
{
    /// Build the orchestrator and every component from `config`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the network layout cannot be planned or
    /// the poll interval is zero.
    pub fn new(provider: Arc<P>, store: Arc<S>, config: &OrchestratorConfig) -> Result<Self> {
        let layout = NetworkLayout::from_config(config)?;
        if config.storage_poll_interval_secs == 0 {
            return Err(ConfigError::ZeroPollInterval.into());
        }
        let poll_interval = Duration::from_secs(config.storage_poll_interval_secs);

        Ok(Self {
            network: NetworkProvisioner::new(Arc::clone(&provider), Arc::clone(&store), layout),
            storage: StorageProvisioner::new(
                Arc::clone(&provider),
                Arc::clone(&store),
                poll_interval,
            ),
            cluster: ClusterProvisioner::new(Arc::clone(&provider), Arc::clone(&store)),
            workload: WorkloadRegistrar::new(
                Arc::clone(&provider),
                Arc::clone(&store),
                RegistrationIdentity::from(config),
            ),
            instances: InstanceManager::new(provider, Arc::clone(&store)),
            store,
        })
    }

    /// The storage provisioner, for watcher supervision.
    #[must_use]
    pub fn storage(&self) -> &StorageProvisioner<P, S> {
        &self.storage
    }

    /// Get or create the deployment for `event_id`, then initialise it.
    ///
    /// # Errors
    ///
    /// Returns an error if the deployment cannot be stored or initialisation
    /// fails.
    pub async fn create_deployment(&self, event_id: Uuid) -> Result<Deployment> {
        let inserted = self
            .store
            .insert_deployment(Deployment::new(event_id))
            .await
            .with_context(|| format!("storing deployment for event {event_id}"))?;

        let deployment = match inserted {
            Insertion::Inserted(row) => {
                tracing::info!(deployment_id = row.id, event_id = %event_id, "deployment created");
                row
            }
            Insertion::Existing(row) => {
                tracing::info!(
                    deployment_id = row.id,
                    event_id = %event_id,
                    status = %row.status,
                    "deployment already exists"
                );
                row
            }
        };

        self.initialize_deployment(deployment.id).await?;
        self.store
            .find_deployment(deployment.id)
            .await
            .context("reloading deployment")?
            .ok_or_else(|| OrchestratorError::DeploymentMissing.into())
    }

    /// Provision network, storage, and cluster in that order, then mark the
    /// deployment idle.
    ///
    /// Network and storage failures abort. A cluster that was created but
    /// could not be stored is logged and the deployment still advances.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::DeploymentMissing`] for an unknown id, or
    /// the first aborting provisioning failure.
    pub async fn initialize_deployment(&self, deployment_id: DeploymentId) -> Result<()> {
        let deployment = self
            .store
            .find_deployment(deployment_id)
            .await
            .context("looking up deployment")?
            .ok_or(OrchestratorError::DeploymentMissing)?;

        let network = self
            .network
            .ensure_network(deployment_id)
            .await
            .context("provisioning network")?;
        let storage = self
            .storage
            .ensure_storage(deployment_id)
            .await
            .context("provisioning storage")?;

        match self.cluster.ensure_cluster(deployment_id).await {
            Ok(cluster) => {
                tracing::info!(
                    deployment_id,
                    network_id = %network.network_id,
                    file_system_id = %storage.file_system_id,
                    cluster = %cluster.name,
                    "deployment infrastructure provisioned"
                );
            }
            Err(err) if PersistenceFailure::is_cause_of(&err) => {
                tracing::error!(
                    deployment_id,
                    error = %err,
                    "cluster created but not stored; continuing"
                );
            }
            Err(err) => return Err(err.context("provisioning cluster")),
        }

        self.mark_idle(&deployment).await;
        Ok(())
    }

    /// Register the event's workload definition.
    ///
    /// # Errors
    ///
    /// Fails when the deployment is missing or not idle, or registration fails.
    pub async fn register_workload_definition(
        &self,
        event_id: Uuid,
        spec: &WorkloadSpec,
    ) -> Result<WorkloadDefinition> {
        let deployment = self.ready_deployment(event_id).await?;
        self.workload.register(&deployment, spec).await
    }

    /// The event's registered workload definition.
    ///
    /// # Errors
    ///
    /// Fails when the deployment is missing or has no definition.
    pub async fn workload_definition(&self, event_id: Uuid) -> Result<WorkloadDefinition> {
        let deployment = self.deployment_for_event(event_id).await?;
        self.workload.definition(deployment.id).await
    }

    /// Start, or restart, the owner's instance of the event's workload.
    ///
    /// # Errors
    ///
    /// Fails when the deployment is missing or not idle, a dependency is not
    /// provisioned, or the provider rejects the task.
    pub async fn start_instance(
        &self,
        event_id: Uuid,
        owner: Uuid,
        flags: &[EventFlag],
    ) -> Result<RunningInstance> {
        let deployment = self.ready_deployment(event_id).await?;
        self.instances
            .start_instance(&deployment, owner, flags)
            .await
    }

    /// Refresh the owner's instance from the provider.
    ///
    /// # Errors
    ///
    /// Fails when the deployment is missing or not idle, no definition or
    /// instance exists, or the provider call fails.
    pub async fn refresh_instance(&self, event_id: Uuid, owner: Uuid) -> Result<RunningInstance> {
        let deployment = self.ready_deployment(event_id).await?;
        let definition = self.workload.definition(deployment.id).await?;
        self.instances.refresh_instance(definition.id, owner).await
    }

    /// Stop the owner's instance.
    ///
    /// # Errors
    ///
    /// Fails when the deployment is missing or not idle, no definition or
    /// instance exists, or the provider call fails.
    pub async fn stop_instance(&self, event_id: Uuid, owner: Uuid) -> Result<RunningInstance> {
        let deployment = self.ready_deployment(event_id).await?;
        let definition = self.workload.definition(deployment.id).await?;
        self.instances.stop_instance(definition.id, owner).await
    }

    async fn deployment_for_event(&self, event_id: Uuid) -> Result<Deployment> {
        self.store
            .find_deployment_by_event(event_id)
            .await
            .context("looking up deployment")?
            .ok_or_else(|| OrchestratorError::DeploymentMissing.into())
    }

    async fn ready_deployment(&self, event_id: Uuid) -> Result<Deployment> {
        let deployment = self.deployment_for_event(event_id).await?;
        if deployment.status != DeploymentStatus::Idle {
            return Err(OrchestratorError::DeploymentNotReady {
                status: deployment.status,
            }
            .into());
        }
        Ok(deployment)
    }

    async fn mark_idle(&self, deployment: &Deployment) {
        if !deployment.status.can_advance_to(DeploymentStatus::Idle) {
            tracing::debug!(
                deployment_id = deployment.id,
                status = %deployment.status,
                "deployment already past idle"
            );
            return;
        }
        match self
            .store
            .update_deployment_status(deployment.id, DeploymentStatus::Idle)
            .await
        {
            Ok(()) => tracing::info!(deployment_id = deployment.id, "deployment idle"),
            Err(err) => tracing::error!(
                deployment_id = deployment.id,
                error = %err,
                "failed to mark deployment idle"
            ),
        }
    }
}
