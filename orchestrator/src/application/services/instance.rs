//! Running instance lifecycle: start, refresh, and stop one task of a
//! deployment's workload definition per owner.

use std::sync::Arc;

use anyhow::{Context, Result};
use outpost_common::{Deployment, RunningInstance, WorkloadDefinition};
use uuid::Uuid;

use crate::application::ports::{
    ClusterRepository, ComputeApi, ContainerOverride, Insertion, KeyValue, LaunchType, NetworkApi,
    NetworkRepository, RunTask, RunningInstanceRepository, TaskDescription,
    WorkloadDefinitionRepository,
};
use crate::domain::error::OrchestratorError;
use crate::domain::workload::EventFlag;

/// Reason recorded with every stop request.
pub const STOP_REASON: &str = "Client task stop requested";

/// Attachment kind carrying the task's network interface.
const NETWORK_INTERFACE_ATTACHMENT: &str = "ElasticNetworkInterface";
const NETWORK_INTERFACE_DETAIL: &str = "networkInterfaceId";

pub struct InstanceManager<P, S> {
    provider: Arc<P>,
    store: Arc<S>,
}

impl<P, S> InstanceManager<P, S>
where
    P: ComputeApi + NetworkApi,
    S: NetworkRepository + ClusterRepository + WorkloadDefinitionRepository + RunningInstanceRepository,
{
    pub fn new(provider: Arc<P>, store: Arc<S>) -> Self {
        Self { provider, store }
    }

    /// Run the deployment's workload for `owner`, injecting `flags` into every
    /// container. A second start for the same owner updates the stored
    /// instance in place.
    ///
    /// # Errors
    ///
    /// - [`OrchestratorError::NetworkMissing`], [`OrchestratorError::ClusterMissing`]
    ///   or [`OrchestratorError::WorkloadDefinitionMissing`] when a dependency
    ///   is not provisioned. No run request is made.
    /// - [`OrchestratorError::RunTaskFailure`] when the provider reports a
    ///   per-task failure.
    /// - Any provider or store failure.
    pub async fn start_instance(
        &self,
        deployment: &Deployment,
        owner: Uuid,
        flags: &[EventFlag],
    ) -> Result<RunningInstance> {
        let deployment_id = deployment.id;
        let network = self
            .store
            .find_network(deployment_id)
            .await
            .context("looking up network")?
            .ok_or(OrchestratorError::NetworkMissing)?;
        let cluster = self
            .store
            .find_cluster(deployment_id)
            .await
            .context("looking up cluster")?
            .ok_or(OrchestratorError::ClusterMissing)?;
        let definition = self
            .store
            .find_definition(deployment_id)
            .await
            .context("looking up workload definition")?
            .ok_or(OrchestratorError::WorkloadDefinitionMissing)?;

        let existing = self
            .store
            .find_instance(definition.id, owner)
            .await
            .context("looking up running instance")?;

        let subnets = self
            .provider
            .describe_subnets(&network.network_id)
            .await
            .with_context(|| format!("describing subnets of {}", network.network_id))?;
        let overrides = self.container_overrides(&definition, flags).await?;

        let request = RunTask {
            cluster_arn: cluster.arn.clone(),
            task_definition_arn: definition.arn.clone(),
            count: 1,
            launch_type: LaunchType::Fargate,
            subnets,
            security_groups: vec![network.security_group_id.clone()],
            assign_public_ip: true,
            overrides,
            reference_id: Uuid::new_v4().to_string(),
        };
        let output = self
            .provider
            .run_task(&request)
            .await
            .inspect_err(|err| {
                tracing::error!(deployment_id, owner = %owner, error = %err, "run task failed");
            })
            .context("running task")?;

        if let Some(failure) = output.failures.into_iter().next() {
            tracing::error!(
                deployment_id,
                owner = %owner,
                arn = ?failure.arn,
                reason = ?failure.reason,
                detail = ?failure.detail,
                "provider rejected task"
            );
            return Err(OrchestratorError::RunTaskFailure {
                arn: failure.arn,
                reason: failure.reason.unwrap_or_else(|| "unknown".to_string()),
                detail: failure.detail,
            }
            .into());
        }
        let task = output
            .tasks
            .into_iter()
            .next()
            .context("run task returned neither a task nor a failure")?;

        // A restart is a new task; only the row identity carries over.
        let mut instance = RunningInstance::new(definition.id, cluster.id, owner);
        if let Some(existing) = &existing {
            instance.id = existing.id;
        }
        apply_task(&mut instance, &task);
        tracing::info!(
            deployment_id,
            owner = %owner,
            task_arn = %instance.task_arn,
            restart = instance.id != 0,
            "task started"
        );

        if instance.id != 0 {
            self.store
                .update_instance(&instance)
                .await
                .context("updating running instance")?;
            return Ok(instance);
        }

        match self
            .store
            .insert_instance(instance.clone())
            .await
            .context("storing running instance")?
        {
            Insertion::Inserted(row) => Ok(row),
            Insertion::Existing(row) => {
                tracing::warn!(
                    owner = %owner,
                    task_arn = %instance.task_arn,
                    "instance was stored concurrently; overwriting with the latest task"
                );
                instance.id = row.id;
                self.store
                    .update_instance(&instance)
                    .await
                    .context("updating running instance")?;
                Ok(instance)
            }
        }
    }

    /// Re-read the task from the provider and store what it reports. A task
    /// the provider no longer reports leaves the stored fields as they are;
    /// the instance is persisted either way.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::RunningInstanceMissing`] if no instance is
    /// stored, [`OrchestratorError::ClusterMissing`] if its cluster row is
    /// gone, or any provider or store failure.
    pub async fn refresh_instance(
        &self,
        definition_id: u64,
        owner: Uuid,
    ) -> Result<RunningInstance> {
        let mut instance = self.require_instance(definition_id, owner).await?;
        let cluster = self
            .store
            .find_cluster_by_id(instance.cluster_id)
            .await
            .context("looking up cluster")?
            .ok_or(OrchestratorError::ClusterMissing)?;

        let reported = self
            .provider
            .describe_tasks(&cluster.arn, std::slice::from_ref(&instance.task_arn))
            .await
            .inspect_err(|err| {
                tracing::error!(task_arn = %instance.task_arn, error = %err, "describe task failed");
            })
            .context("describing task")?
            .into_iter()
            .next();

        match reported {
            Some(task) => {
                apply_task(&mut instance, &task);
                if let Some(public_ip) = self.resolve_public_ip(&task).await {
                    instance.public_ip = Some(public_ip);
                }
            }
            None => {
                tracing::warn!(
                    task_arn = %instance.task_arn,
                    owner = %owner,
                    "task no longer reported by provider; keeping stored state"
                );
            }
        }

        self.store
            .update_instance(&instance)
            .await
            .context("updating running instance")?;
        Ok(instance)
    }

    /// Stop the owner's task.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::RunningInstanceMissing`] if no instance is
    /// stored; no stop request is made in that case.
    pub async fn stop_instance(&self, definition_id: u64, owner: Uuid) -> Result<RunningInstance> {
        let mut instance = self.require_instance(definition_id, owner).await?;
        let cluster = self
            .store
            .find_cluster_by_id(instance.cluster_id)
            .await
            .context("looking up cluster")?
            .ok_or(OrchestratorError::ClusterMissing)?;

        let task = self
            .provider
            .stop_task(&cluster.arn, &instance.task_arn, STOP_REASON)
            .await
            .inspect_err(|err| {
                tracing::error!(task_arn = %instance.task_arn, error = %err, "stop task failed");
            })
            .context("stopping task")?;
        apply_task(&mut instance, &task);
        tracing::info!(task_arn = %instance.task_arn, owner = %owner, "task stop requested");

        self.store
            .update_instance(&instance)
            .await
            .context("updating running instance")?;
        Ok(instance)
    }

    async fn require_instance(&self, definition_id: u64, owner: Uuid) -> Result<RunningInstance> {
        self.store
            .find_instance(definition_id, owner)
            .await
            .context("looking up running instance")?
            .ok_or_else(|| OrchestratorError::RunningInstanceMissing.into())
    }

    async fn container_overrides(
        &self,
        definition: &WorkloadDefinition,
        flags: &[EventFlag],
    ) -> Result<Vec<ContainerOverride>> {
        let containers = self
            .provider
            .describe_task_definition(&definition.arn)
            .await
            .with_context(|| format!("describing task definition {}", definition.arn))?;

        let environment: Vec<KeyValue> = flags
            .iter()
            .map(|flag| KeyValue::new(&flag.env_var, flag.flag_id.to_string()))
            .collect();
        Ok(containers
            .into_iter()
            .map(|container_name| ContainerOverride {
                container_name,
                environment: environment.clone(),
            })
            .collect())
    }

    /// Public address of the task's network interface. Failures are logged
    /// and yield `None`.
    async fn resolve_public_ip(&self, task: &TaskDescription) -> Option<String> {
        let interface_id = task
            .attachments
            .iter()
            .filter(|attachment| {
                attachment
                    .kind
                    .eq_ignore_ascii_case(NETWORK_INTERFACE_ATTACHMENT)
            })
            .flat_map(|attachment| &attachment.details)
            .find(|detail| detail.name.eq_ignore_ascii_case(NETWORK_INTERFACE_DETAIL))
            .map(|detail| detail.value.as_str())?;

        match self.provider.describe_network_interface(interface_id).await {
            Ok(address) => address,
            Err(err) => {
                tracing::warn!(
                    task_arn = %task.task_arn,
                    interface_id,
                    error = %err,
                    "could not resolve public address"
                );
                None
            }
        }
    }
}

/// Copy what the provider reports about a task into the stored instance.
/// Fields the provider leaves empty keep their stored value.
fn apply_task(instance: &mut RunningInstance, task: &TaskDescription) {
    if !task.task_arn.is_empty() {
        instance.task_arn.clone_from(&task.task_arn);
    }
    if task.last_status.is_some() {
        instance.last_status.clone_from(&task.last_status);
    }
    if let Some(health) = task.health {
        instance.health = health;
    }
    instance.pull_started_at = task.pull_started_at.or(instance.pull_started_at);
    instance.pull_stopped_at = task.pull_stopped_at.or(instance.pull_stopped_at);
    instance.started_at = task.started_at.or(instance.started_at);
    instance.stopped_at = task.stopped_at.or(instance.stopped_at);
    if task.stopped_reason.is_some() {
        instance.stopped_reason.clone_from(&task.stopped_reason);
    }
}
