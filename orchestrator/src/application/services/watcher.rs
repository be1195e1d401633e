//! File-system readiness watcher.
//!
//! Polls the storage provider at a fixed interval until the file system is
//! either attachable or can never become so. Once attachable, one mount
//! target is requested for every subnet of the deployment network, in a
//! single pass. Each run is owned by a [`WatchHandle`] that can cancel it and
//! yields the terminal [`WatchOutcome`].

use std::sync::Arc;
use std::time::Duration;

use outpost_common::{StorageInstance, StorageState};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{NetworkApi, NetworkRepository, StorageApi, StorageRepository};

/// How a watcher run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// One pass over the subnets was made.
    Attached { mount_targets: usize, failures: usize },
    /// The file system reached a state it cannot be mounted from.
    Unmountable { state: StorageState },
    /// No network is stored for the deployment, so there is nothing to attach to.
    NetworkMissing,
    /// A provider or store call needed to continue failed.
    Failed { reason: String },
    Cancelled,
    /// The task panicked or was aborted by the runtime.
    Aborted,
}

/// Owns one running watcher.
#[derive(Debug)]
pub struct WatchHandle {
    cancel: CancellationToken,
    task: JoinHandle<WatchOutcome>,
}

impl WatchHandle {
    /// Ask the watcher to stop at its next suspension point.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the watcher to end.
    pub async fn outcome(self) -> WatchOutcome {
        self.task.await.unwrap_or_else(|err| {
            tracing::error!(error = %err, "storage watcher did not complete");
            WatchOutcome::Aborted
        })
    }
}

/// Start watching `storage` on the current tokio runtime.
pub(crate) fn spawn<P, S>(
    provider: Arc<P>,
    store: Arc<S>,
    storage: StorageInstance,
    poll_interval: Duration,
) -> WatchHandle
where
    P: StorageApi + NetworkApi + 'static,
    S: StorageRepository + NetworkRepository + 'static,
{
    let cancel = CancellationToken::new();
    let task = tokio::spawn(watch(
        provider,
        store,
        storage,
        poll_interval,
        cancel.clone(),
    ));
    WatchHandle { cancel, task }
}

async fn watch<P, S>(
    provider: Arc<P>,
    store: Arc<S>,
    mut storage: StorageInstance,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> WatchOutcome
where
    P: StorageApi + NetworkApi,
    S: StorageRepository + NetworkRepository,
{
    tracing::info!(
        deployment_id = storage.deployment_id,
        file_system_id = %storage.file_system_id,
        interval_secs = poll_interval.as_secs(),
        "watching file system for mount targets"
    );
    let mut ticker = interval_at(Instant::now() + poll_interval, poll_interval);

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::info!(file_system_id = %storage.file_system_id, "storage watcher cancelled");
                return WatchOutcome::Cancelled;
            }
            _ = ticker.tick() => {}
        }

        let description = match provider.describe_file_system(&storage.file_system_id).await {
            Ok(description) => description,
            Err(err) => {
                tracing::error!(
                    file_system_id = %storage.file_system_id,
                    error = %err,
                    "describe file system failed; mount targets not created"
                );
                return WatchOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        if description.state != storage.state {
            storage.state = description.state;
            if let Err(err) = store.update_storage(&storage).await {
                tracing::warn!(
                    file_system_id = %storage.file_system_id,
                    state = %storage.state,
                    error = %err,
                    "failed to record file system state"
                );
            }
        }

        if storage.state.is_failed() {
            tracing::error!(
                file_system_id = %storage.file_system_id,
                state = %storage.state,
                "file system cannot be mounted"
            );
            return WatchOutcome::Unmountable {
                state: storage.state,
            };
        }
        if storage.state.is_busy() {
            tracing::info!(
                file_system_id = %storage.file_system_id,
                state = %storage.state,
                "file system busy, will try again"
            );
            continue;
        }

        let outcome = attach(provider.as_ref(), store.as_ref(), &storage).await;
        tracing::info!(file_system_id = %storage.file_system_id, ?outcome, "mount targets finished");
        return outcome;
    }
}

async fn attach<P, S>(provider: &P, store: &S, storage: &StorageInstance) -> WatchOutcome
where
    P: StorageApi + NetworkApi,
    S: NetworkRepository,
{
    let network = match store.find_network(storage.deployment_id).await {
        Ok(Some(network)) => network,
        Ok(None) => {
            tracing::error!(
                deployment_id = storage.deployment_id,
                "no network stored; cannot create mount targets"
            );
            return WatchOutcome::NetworkMissing;
        }
        Err(err) => {
            return WatchOutcome::Failed {
                reason: format!("looking up network: {err}"),
            };
        }
    };

    let subnets = match provider.describe_subnets(&network.network_id).await {
        Ok(subnets) => subnets,
        Err(err) => {
            tracing::error!(network_id = %network.network_id, error = %err, "describe subnets failed");
            return WatchOutcome::Failed {
                reason: format!("describing subnets: {err}"),
            };
        }
    };

    let mut mount_targets = 0;
    let mut failures = 0;
    for subnet_id in &subnets {
        match provider
            .create_mount_target(
                &storage.file_system_id,
                subnet_id,
                &network.security_group_id,
            )
            .await
        {
            Ok(state) => {
                mount_targets += 1;
                tracing::info!(subnet_id = %subnet_id, state = %state, "mount target in progress");
            }
            Err(err) => {
                failures += 1;
                tracing::error!(
                    file_system_id = %storage.file_system_id,
                    subnet_id = %subnet_id,
                    error = %err,
                    "create mount target failed"
                );
            }
        }
    }

    WatchOutcome::Attached {
        mount_targets,
        failures,
    }
}
