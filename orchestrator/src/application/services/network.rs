//! Private network provisioning for a deployment.
//!
//! Builds the network, its subnets, internet gateway, open ingress, and
//! default route. Any failed step aborts the sequence; remote resources
//! created by earlier steps are left in place.

use std::sync::Arc;

use anyhow::{Context, Result};
use outpost_common::{DeploymentId, NetworkInstance, NetworkState};

use crate::application::ports::{IngressRule, Insertion, NetworkApi, NetworkRepository};
use crate::domain::error::PersistenceFailure;
use crate::domain::network::{DEFAULT_ROUTE, NetworkLayout};

/// Creates, or returns the already-provisioned, network of a deployment.
pub struct NetworkProvisioner<P, S> {
    provider: Arc<P>,
    store: Arc<S>,
    layout: NetworkLayout,
}

impl<P, S> NetworkProvisioner<P, S>
where
    P: NetworkApi,
    S: NetworkRepository,
{
    pub fn new(provider: Arc<P>, store: Arc<S>, layout: NetworkLayout) -> Self {
        Self {
            provider,
            store,
            layout,
        }
    }

    /// Return the deployment's network, creating it if none is stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup, any provider call, or the insert fails.
    pub async fn ensure_network(&self, deployment_id: DeploymentId) -> Result<NetworkInstance> {
        if let Some(existing) = self
            .store
            .find_network(deployment_id)
            .await
            .context("looking up existing network")?
        {
            tracing::info!(
                deployment_id,
                network_id = %existing.network_id,
                "existing network found"
            );
            return Ok(existing);
        }

        let network = self.provision(deployment_id).await?;

        let inserted = self
            .store
            .insert_network(network)
            .await
            .inspect_err(|err| tracing::error!(deployment_id, error = %err, "failed to insert network"))
            .context(PersistenceFailure {
                entity: "network",
                deployment_id,
            })?;

        Ok(match inserted {
            Insertion::Inserted(row) => row,
            Insertion::Existing(row) => {
                tracing::warn!(
                    deployment_id,
                    network_id = %row.network_id,
                    "network was stored concurrently; newly created resources are orphaned"
                );
                row
            }
        })
    }

    async fn provision(&self, deployment_id: DeploymentId) -> Result<NetworkInstance> {
        let cidr = self.layout.cidr.to_string();
        let network_id = self
            .provider
            .create_network(&cidr)
            .await
            .inspect_err(|err| tracing::error!(deployment_id, error = %err, "create network failed"))
            .context("creating network")?;
        tracing::info!(deployment_id, network_id = %network_id, cidr = %cidr, "network created");

        self.provider
            .enable_dns_hostnames(&network_id)
            .await
            .inspect_err(|err| {
                tracing::error!(network_id = %network_id, error = %err, "enable DNS hostnames failed");
            })
            .context("enabling DNS hostnames")?;

        for subnet in &self.layout.subnets {
            let subnet_cidr = subnet.cidr.to_string();
            let subnet_id = self
                .provider
                .create_subnet(&network_id, &subnet.zone_id, &subnet_cidr)
                .await
                .inspect_err(|err| {
                    tracing::error!(
                        deployment_id,
                        zone = %subnet.zone_id,
                        cidr = %subnet_cidr,
                        error = %err,
                        "create subnet failed"
                    );
                })
                .with_context(|| format!("creating subnet {subnet_cidr} in {}", subnet.zone_id))?;
            tracing::info!(
                subnet_id = %subnet_id,
                zone = %subnet.zone_id,
                cidr = %subnet_cidr,
                "subnet created"
            );
        }

        let gateway_id = self
            .provider
            .create_internet_gateway()
            .await
            .inspect_err(|err| {
                tracing::error!(deployment_id, error = %err, "create internet gateway failed");
            })
            .context("creating internet gateway")?;
        self.provider
            .attach_internet_gateway(&gateway_id, &network_id)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    network_id = %network_id,
                    gateway_id = %gateway_id,
                    error = %err,
                    "attach internet gateway failed"
                );
            })
            .context("attaching internet gateway")?;
        tracing::info!(gateway_id = %gateway_id, network_id = %network_id, "internet gateway attached");

        let security_group_id = self
            .provider
            .describe_security_groups(&network_id)
            .await
            .context("describing security groups")?
            .into_iter()
            .next()
            .with_context(|| format!("network {network_id} has no default security group"))?;

        // Deliberately permissive: workloads are reachable from anywhere.
        self.provider
            .authorize_ingress(&security_group_id, &IngressRule::allow_all())
            .await
            .inspect_err(|err| {
                tracing::error!(
                    security_group_id = %security_group_id,
                    error = %err,
                    "authorize ingress failed"
                );
            })
            .context("opening security group ingress")?;

        let route_table_id = self
            .provider
            .describe_route_tables(&network_id)
            .await
            .context("describing route tables")?
            .into_iter()
            .next()
            .with_context(|| format!("network {network_id} has no route table"))?;
        self.provider
            .create_route(&route_table_id, DEFAULT_ROUTE, &gateway_id)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    route_table_id = %route_table_id,
                    error = %err,
                    "create default route failed"
                );
            })
            .context("creating default route")?;
        tracing::info!(deployment_id, network_id = %network_id, "network ready");

        Ok(NetworkInstance {
            id: 0,
            deployment_id,
            network_id,
            security_group_id,
            internet_gateway_id: gateway_id,
            state: NetworkState::Available,
        })
    }
}
