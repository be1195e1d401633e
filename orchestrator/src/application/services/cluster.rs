//! Compute cluster provisioning for a deployment.

use std::sync::Arc;

use anyhow::{Context, Result};
use outpost_common::{ClusterInstance, DeploymentId};
use uuid::Uuid;

use crate::application::ports::{ClusterRepository, ComputeApi, Insertion};
use crate::domain::error::PersistenceFailure;

/// Creates, or returns the already-provisioned, cluster of a deployment.
pub struct ClusterProvisioner<P, S> {
    provider: Arc<P>,
    store: Arc<S>,
}

impl<P, S> ClusterProvisioner<P, S>
where
    P: ComputeApi,
    S: ClusterRepository,
{
    pub fn new(provider: Arc<P>, store: Arc<S>) -> Self {
        Self { provider, store }
    }

    /// Return the deployment's cluster, creating one under a random name if
    /// none is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup, the create call, or the insert fails.
    /// Insert failures carry a [`PersistenceFailure`] context.
    pub async fn ensure_cluster(&self, deployment_id: DeploymentId) -> Result<ClusterInstance> {
        if let Some(existing) = self
            .store
            .find_cluster(deployment_id)
            .await
            .context("looking up existing cluster")?
        {
            tracing::info!(deployment_id, cluster = %existing.name, "existing cluster found");
            return Ok(existing);
        }

        let name = Uuid::new_v4().to_string();
        let created = self
            .provider
            .create_cluster(&name)
            .await
            .inspect_err(|err| {
                tracing::error!(deployment_id, cluster = %name, error = %err, "create cluster failed");
            })
            .with_context(|| format!("creating cluster {name}"))?;
        tracing::info!(
            deployment_id,
            cluster = %created.name,
            arn = %created.arn,
            status = ?created.status,
            "cluster created"
        );

        let cluster = ClusterInstance {
            id: 0,
            deployment_id,
            name: created.name,
            arn: created.arn,
            status: created.status,
        };
        let inserted = self
            .store
            .insert_cluster(cluster)
            .await
            .inspect_err(|err| tracing::error!(deployment_id, error = %err, "failed to insert cluster"))
            .context(PersistenceFailure {
                entity: "cluster",
                deployment_id,
            })?;

        Ok(match inserted {
            Insertion::Inserted(row) => row,
            Insertion::Existing(row) => {
                tracing::warn!(
                    deployment_id,
                    cluster = %row.name,
                    "cluster was stored concurrently; newly created cluster is orphaned"
                );
                row
            }
        })
    }
}
