//! Shared file-system provisioning for a deployment.
//!
//! Creating the file system returns immediately; a background watcher is
//! started for every newly stored file system and requests mount targets
//! once the provider reports it attachable. At most one watcher runs per
//! deployment.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use outpost_common::{DeploymentId, StorageInstance};
use uuid::Uuid;

use crate::application::ports::{
    CreateFileSystem, Insertion, NetworkApi, NetworkRepository, PerformanceMode, StorageApi,
    StorageRepository, ThroughputMode,
};
use crate::application::services::watcher::{self, WatchHandle, WatchOutcome};
use crate::domain::error::{OrchestratorError, PersistenceFailure};

/// Creates, or returns the already-provisioned, file system of a deployment.
pub struct StorageProvisioner<P, S> {
    provider: Arc<P>,
    store: Arc<S>,
    poll_interval: Duration,
    watchers: Mutex<HashMap<DeploymentId, WatchHandle>>,
}

impl<P, S> StorageProvisioner<P, S>
where
    P: StorageApi + NetworkApi + 'static,
    S: StorageRepository + NetworkRepository + 'static,
{
    pub fn new(provider: Arc<P>, store: Arc<S>, poll_interval: Duration) -> Self {
        Self {
            provider,
            store,
            poll_interval,
            watchers: Mutex::new(HashMap::new()),
        }
    }

    /// Return the deployment's file system, creating it if none is stored.
    ///
    /// A watcher is started only when this call stored the row; an existing
    /// row is returned as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup, the create call, or the insert fails.
    pub async fn ensure_storage(&self, deployment_id: DeploymentId) -> Result<StorageInstance> {
        if let Some(existing) = self
            .store
            .find_storage(deployment_id)
            .await
            .context("looking up existing file system")?
        {
            tracing::info!(
                deployment_id,
                file_system_id = %existing.file_system_id,
                "existing file system found"
            );
            return Ok(existing);
        }

        let request = CreateFileSystem {
            creation_token: Uuid::new_v4().to_string(),
            performance_mode: PerformanceMode::GeneralPurpose,
            throughput_mode: ThroughputMode::Elastic,
            backup: false,
            encrypted: false,
        };
        let created = self
            .provider
            .create_file_system(&request)
            .await
            .inspect_err(|err| {
                tracing::error!(deployment_id, error = %err, "create file system failed");
            })
            .context("creating file system")?;

        if created.state.is_failed() {
            tracing::error!(
                deployment_id,
                file_system_id = %created.file_system_id,
                state = %created.state,
                "file system created in a failed state"
            );
        } else {
            tracing::info!(
                deployment_id,
                file_system_id = %created.file_system_id,
                state = %created.state,
                "file system created"
            );
        }

        let storage = StorageInstance {
            id: 0,
            deployment_id,
            file_system_id: created.file_system_id,
            resource_arn: created.arn,
            state: created.state,
        };
        let inserted = self
            .store
            .insert_storage(storage)
            .await
            .inspect_err(|err| {
                tracing::error!(deployment_id, error = %err, "failed to insert file system");
            })
            .context(PersistenceFailure {
                entity: "storage",
                deployment_id,
            })?;

        match inserted {
            Insertion::Inserted(row) => {
                self.start_watch(&row);
                Ok(row)
            }
            Insertion::Existing(row) => {
                tracing::warn!(
                    deployment_id,
                    file_system_id = %row.file_system_id,
                    "file system was stored concurrently; newly created file system is orphaned"
                );
                Ok(row)
            }
        }
    }

    /// Re-read the file system state from the provider and record it.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::StorageMissing`] if no row is stored, or
    /// an error if the describe or update fails.
    pub async fn refresh_state(&self, deployment_id: DeploymentId) -> Result<StorageInstance> {
        let mut storage = self
            .store
            .find_storage(deployment_id)
            .await
            .context("looking up file system")?
            .ok_or(OrchestratorError::StorageMissing)?;

        let description = self
            .provider
            .describe_file_system(&storage.file_system_id)
            .await
            .with_context(|| format!("describing file system {}", storage.file_system_id))?;

        if description.state != storage.state {
            tracing::info!(
                deployment_id,
                file_system_id = %storage.file_system_id,
                from = %storage.state,
                to = %description.state,
                "file system state changed"
            );
            storage.state = description.state;
            self.store
                .update_storage(&storage)
                .await
                .context(PersistenceFailure {
                    entity: "storage",
                    deployment_id,
                })?;
        }
        Ok(storage)
    }

    /// Number of watchers held, running or finished.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.lock_watchers().len()
    }

    /// Whether a watcher for the deployment is still running.
    #[must_use]
    pub fn is_watching(&self, deployment_id: DeploymentId) -> bool {
        self.lock_watchers()
            .get(&deployment_id)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Signal the deployment's watcher to stop. Returns `false` if none was
    /// registered.
    pub fn cancel_watch(&self, deployment_id: DeploymentId) -> bool {
        match self.lock_watchers().get(&deployment_id) {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for the deployment's watcher to end and return how it ended.
    /// Returns `None` if no watcher was registered. Finished watchers are
    /// dropped when the next watcher starts, so an outcome is only
    /// retrievable until then.
    pub async fn wait_for_watch(&self, deployment_id: DeploymentId) -> Option<WatchOutcome> {
        let handle = self.lock_watchers().remove(&deployment_id)?;
        Some(handle.outcome().await)
    }

    fn start_watch(&self, storage: &StorageInstance) {
        let mut watchers = self.lock_watchers();
        watchers.retain(|deployment_id, handle| {
            let finished = handle.is_finished();
            if finished {
                tracing::debug!(
                    deployment_id = *deployment_id,
                    "dropping finished storage watcher"
                );
            }
            !finished
        });
        if watchers.contains_key(&storage.deployment_id) {
            tracing::warn!(
                deployment_id = storage.deployment_id,
                "storage watcher already running"
            );
            return;
        }
        let handle = watcher::spawn(
            Arc::clone(&self.provider),
            Arc::clone(&self.store),
            storage.clone(),
            self.poll_interval,
        );
        watchers.insert(storage.deployment_id, handle);
    }

    fn lock_watchers(&self) -> std::sync::MutexGuard<'_, HashMap<DeploymentId, WatchHandle>> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<P, S> Drop for StorageProvisioner<P, S> {
    fn drop(&mut self) {
        let watchers = self
            .watchers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        for handle in watchers.values() {
            handle.cancel();
        }
    }
}
