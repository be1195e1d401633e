//! Workload definition registration.
//!
//! Translates a [`WorkloadSpec`] into one provider task definition bound to
//! the deployment's shared file system. A deployment holds at most one
//! definition; registering again returns the stored one.

use std::sync::Arc;

use anyhow::{Context, Result};
use outpost_common::{
    Deployment, DeploymentId, OrchestratorConfig, StorageInstance, StorageState,
    WorkloadDefinition,
};
use uuid::Uuid;

use crate::application::ports::{
    AppProtocol, ComputeApi, ContainerDefinition, Insertion, KeyValue, LaunchType,
    LogConfiguration, MountPoint, NetworkMode, PortMapping, RegisterTaskDefinition, SharedVolume,
    StorageApi, StorageRepository, WorkloadDefinitionRepository,
};
use crate::domain::error::{OrchestratorError, PersistenceFailure};
use crate::domain::workload::{ContainerSpec, SHARED_VOLUME_NAME, WorkloadSpec};

/// Identities and log region every registered definition uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationIdentity {
    pub execution_role_arn: String,
    pub task_role_arn: String,
    pub log_region: String,
}

impl From<&OrchestratorConfig> for RegistrationIdentity {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            execution_role_arn: config.execution_role_arn.clone(),
            task_role_arn: config.task_role_arn().to_string(),
            log_region: config.region.clone(),
        }
    }
}

pub struct WorkloadRegistrar<P, S> {
    provider: Arc<P>,
    store: Arc<S>,
    identity: RegistrationIdentity,
}

impl<P, S> WorkloadRegistrar<P, S>
where
    P: ComputeApi + StorageApi,
    S: WorkloadDefinitionRepository + StorageRepository,
{
    pub fn new(provider: Arc<P>, store: Arc<S>, identity: RegistrationIdentity) -> Self {
        Self {
            provider,
            store,
            identity,
        }
    }

    /// Register `spec` for the deployment, or return the definition already
    /// registered for it.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::EmptyWorkloadSpec`] if `spec` has no containers.
    /// - [`OrchestratorError::StorageMissing`] if the deployment has no file system.
    /// - [`OrchestratorError::StorageNotReady`] if the file system is not available.
    /// - Any provider or store failure.
    pub async fn register(
        &self,
        deployment: &Deployment,
        spec: &WorkloadSpec,
    ) -> Result<WorkloadDefinition> {
        spec.validate()?;
        let deployment_id = deployment.id;

        if let Some(existing) = self
            .store
            .find_definition(deployment_id)
            .await
            .context("looking up existing workload definition")?
        {
            tracing::info!(
                deployment_id,
                family = %existing.family,
                "workload definition already registered"
            );
            return Ok(existing);
        }

        let storage = self.available_storage(deployment_id).await?;

        let family = Uuid::new_v4();
        let request = self.task_definition(family, spec, &storage);
        let arn = self
            .provider
            .register_task_definition(&request)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    deployment_id,
                    family = %family,
                    error = %err,
                    "register task definition failed"
                );
            })
            .context("registering task definition")?;
        tracing::info!(
            deployment_id,
            family = %family,
            arn = %arn,
            containers = request.containers.len(),
            "task definition registered"
        );

        let definition = WorkloadDefinition {
            id: 0,
            deployment_id,
            family,
            arn,
            storage_id: storage.id,
        };
        let inserted = self
            .store
            .insert_definition(definition)
            .await
            .context(PersistenceFailure {
                entity: "workload definition",
                deployment_id,
            })?;

        Ok(match inserted {
            Insertion::Inserted(row) => row,
            Insertion::Existing(row) => {
                tracing::warn!(
                    deployment_id,
                    family = %row.family,
                    "workload definition was stored concurrently; new registration is unused"
                );
                row
            }
        })
    }

    /// The definition registered for the deployment.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::WorkloadDefinitionMissing`] if none is stored.
    pub async fn definition(&self, deployment_id: DeploymentId) -> Result<WorkloadDefinition> {
        self.store
            .find_definition(deployment_id)
            .await
            .context("looking up workload definition")?
            .ok_or_else(|| OrchestratorError::WorkloadDefinitionMissing.into())
    }

    async fn available_storage(&self, deployment_id: DeploymentId) -> Result<StorageInstance> {
        let mut storage = self
            .store
            .find_storage(deployment_id)
            .await
            .context("looking up file system")?
            .ok_or(OrchestratorError::StorageMissing)?;

        if storage.state != StorageState::Available {
            let described = self
                .provider
                .describe_file_system(&storage.file_system_id)
                .await
                .with_context(|| format!("describing file system {}", storage.file_system_id))?;
            if described.state != storage.state {
                storage.state = described.state;
                self.store
                    .update_storage(&storage)
                    .await
                    .context(PersistenceFailure {
                        entity: "storage",
                        deployment_id,
                    })?;
            }
        }

        if storage.state != StorageState::Available {
            tracing::warn!(
                deployment_id,
                file_system_id = %storage.file_system_id,
                state = %storage.state,
                "file system not available for workload registration"
            );
            return Err(OrchestratorError::StorageNotReady {
                state: storage.state,
            }
            .into());
        }
        Ok(storage)
    }

    fn task_definition(
        &self,
        family: Uuid,
        spec: &WorkloadSpec,
        storage: &StorageInstance,
    ) -> RegisterTaskDefinition {
        let family = family.to_string();
        let containers = spec
            .containers
            .iter()
            .map(|container| container_definition(&family, &self.identity.log_region, container))
            .collect();

        RegisterTaskDefinition {
            family,
            cpu: spec.cpu.clone(),
            memory: spec.memory.clone(),
            network_mode: NetworkMode::Vpc,
            launch_type: LaunchType::Fargate,
            execution_role_arn: self.identity.execution_role_arn.clone(),
            task_role_arn: self.identity.task_role_arn.clone(),
            containers,
            volumes: vec![SharedVolume {
                name: SHARED_VOLUME_NAME.to_string(),
                file_system_id: storage.file_system_id.clone(),
            }],
        }
    }
}

/// Provider container definition for one declared container. Logs go to the
/// family's group under a per-image stream prefix.
fn container_definition(family: &str, region: &str, container: &ContainerSpec) -> ContainerDefinition {
    ContainerDefinition {
        name: Uuid::new_v4().to_string(),
        image: container.image.clone(),
        essential: container.essential,
        log: LogConfiguration {
            group: family.to_string(),
            stream_prefix: container.image.clone(),
            region: region.to_string(),
            create_group: true,
        },
        environment: container
            .environment
            .iter()
            .map(|var| KeyValue::new(&var.key, &var.value))
            .collect(),
        port_mappings: container
            .ports
            .iter()
            .map(|port| PortMapping {
                name: port.name.clone(),
                container_port: port.container_port,
                host_port: port.host_port,
                protocol: port.transport(),
                app_protocol: AppProtocol::Http,
            })
            .collect(),
        mount_points: container
            .volumes
            .iter()
            .map(|volume| MountPoint {
                container_path: volume.path.clone(),
                source_volume: volume.source.clone(),
                read_only: volume.read_only,
            })
            .collect(),
    }
}
