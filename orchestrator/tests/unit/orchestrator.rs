//! End-to-end tests for the `Orchestrator` façade.

use std::sync::Arc;

use outpost::application::ports::{
    ClusterRepository, DeploymentRepository, NetworkRepository, StorageRepository,
};
use outpost::application::services::watcher::WatchOutcome;
use outpost::domain::ConfigError;
use outpost::infra::MemoryStore;
use outpost::{Orchestrator, OrchestratorError, is_client_correctable};
use outpost_common::{DeploymentStatus, StorageState};
use uuid::Uuid;

use crate::helpers::{FakeCloud, FlakyStore, config, flag, seed_deployment, two_container_spec};

fn orchestrator(
    cloud: &Arc<FakeCloud>,
    store: &Arc<MemoryStore>,
) -> Orchestrator<FakeCloud, MemoryStore> {
    Orchestrator::new(Arc::clone(cloud), Arc::clone(store), &config()).expect("valid config")
}

fn flaky_orchestrator(
    cloud: &Arc<FakeCloud>,
    store: &Arc<FlakyStore>,
) -> Orchestrator<FakeCloud, FlakyStore> {
    Orchestrator::new(Arc::clone(cloud), Arc::clone(store), &config()).expect("valid config")
}

fn sentinel(err: &anyhow::Error) -> Option<OrchestratorError> {
    OrchestratorError::find(err).cloned()
}

// ── Construction ─────────────────────────────────────────────────────────────

#[test]
fn rejects_zero_poll_interval() {
    let mut config = config();
    config.storage_poll_interval_secs = 0;

    let err = Orchestrator::new(FakeCloud::new(), Arc::new(MemoryStore::new()), &config)
        .err()
        .expect("config rejected");

    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::ZeroPollInterval)
    );
}

#[test]
fn rejects_unplannable_network() {
    let mut config = config();
    config.network_cidr = "10.0.0.0/30".to_string();

    let result = Orchestrator::new(FakeCloud::new(), Arc::new(MemoryStore::new()), &config);

    assert!(result.is_err());
}

// ── Initialisation ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn fresh_deployment_is_provisioned_and_idle() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&cloud, &store);
    let event_id = Uuid::new_v4();

    let deployment = orchestrator.create_deployment(event_id).await.unwrap();

    assert_eq!(deployment.event_id, event_id);
    assert_eq!(deployment.status, DeploymentStatus::Idle);
    assert_eq!(store.network_count().await, 1);
    assert_eq!(store.storage_count().await, 1);
    assert_eq!(store.cluster_count().await, 1);
    let storage = store.find_storage(deployment.id).await.unwrap().unwrap();
    assert_eq!(storage.state, StorageState::Creating);

    let outcome = orchestrator.storage().wait_for_watch(deployment.id).await;
    assert_eq!(
        outcome,
        Some(WatchOutcome::Attached {
            mount_targets: 6,
            failures: 0
        })
    );
    let network = store.find_network(deployment.id).await.unwrap().unwrap();
    let subnets = cloud.calls_to("create_subnet").len();
    let targets = cloud.calls_to("create_mount_target");
    assert_eq!(targets.len(), subnets);
    assert!(
        targets
            .iter()
            .all(|call| call.args[2] == network.security_group_id)
    );
}

#[tokio::test]
async fn provisioning_order_is_network_storage_cluster() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());

    orchestrator(&cloud, &store)
        .create_deployment(Uuid::new_v4())
        .await
        .unwrap();

    let ops: Vec<&str> = cloud.calls().iter().map(|call| call.op).collect();
    let position = |op: &str| ops.iter().position(|o| *o == op).expect("call made");
    assert!(position("create_route") < position("create_file_system"));
    assert!(position("create_file_system") < position("create_cluster"));
}

#[tokio::test]
async fn repeated_creation_reuses_everything() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&cloud, &store);
    let event_id = Uuid::new_v4();

    let first = orchestrator.create_deployment(event_id).await.unwrap();
    let second = orchestrator.create_deployment(event_id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(cloud.count("create_network"), 1);
    assert_eq!(cloud.count("create_file_system"), 1);
    assert_eq!(cloud.count("create_cluster"), 1);
    assert_eq!(store.cluster_count().await, 1);
}

#[tokio::test]
async fn unknown_deployment_cannot_be_initialised() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());

    let err = orchestrator(&cloud, &store)
        .initialize_deployment(404)
        .await
        .unwrap_err();

    assert_eq!(sentinel(&err), Some(OrchestratorError::DeploymentMissing));
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn network_failure_stops_before_storage() {
    let cloud = FakeCloud::new();
    cloud.fail("create_internet_gateway");
    let store = Arc::new(MemoryStore::new());
    let deployment = seed_deployment(store.as_ref(), DeploymentStatus::Preparing).await;

    let err = orchestrator(&cloud, &store)
        .initialize_deployment(deployment.id)
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("provisioning network"));
    assert_eq!(cloud.count("create_file_system"), 0);
    assert_eq!(cloud.count("create_cluster"), 0);
    let stored = store.find_deployment(deployment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Preparing);
}

#[tokio::test]
async fn storage_persistence_failure_aborts() {
    let cloud = FakeCloud::new();
    let store = FlakyStore::new();
    store.fail("insert_storage");
    let deployment = seed_deployment(store.as_ref(), DeploymentStatus::Preparing).await;

    let result = flaky_orchestrator(&cloud, &store)
        .initialize_deployment(deployment.id)
        .await;

    assert!(result.is_err());
    assert_eq!(cloud.count("create_cluster"), 0);
    let stored = store.find_deployment(deployment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Preparing);
}

#[tokio::test]
async fn cluster_persistence_failure_still_marks_idle() {
    let cloud = FakeCloud::new();
    let store = FlakyStore::new();
    store.fail("insert_cluster");
    let deployment = seed_deployment(store.as_ref(), DeploymentStatus::Preparing).await;

    flaky_orchestrator(&cloud, &store)
        .initialize_deployment(deployment.id)
        .await
        .unwrap();

    assert_eq!(cloud.count("create_cluster"), 1);
    assert_eq!(store.find_cluster(deployment.id).await.unwrap(), None);
    let stored = store.find_deployment(deployment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Idle);
}

#[tokio::test]
async fn cluster_provider_failure_aborts() {
    let cloud = FakeCloud::new();
    cloud.fail("create_cluster");
    let store = Arc::new(MemoryStore::new());
    let deployment = seed_deployment(store.as_ref(), DeploymentStatus::Preparing).await;

    let err = orchestrator(&cloud, &store)
        .initialize_deployment(deployment.id)
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("provisioning cluster"));
    let stored = store.find_deployment(deployment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Preparing);
}

#[tokio::test]
async fn status_update_failure_is_not_fatal() {
    let cloud = FakeCloud::new();
    let store = FlakyStore::new();
    let deployment = seed_deployment(store.as_ref(), DeploymentStatus::Preparing).await;
    store.fail("update_deployment_status");

    flaky_orchestrator(&cloud, &store)
        .initialize_deployment(deployment.id)
        .await
        .unwrap();

    let stored = store.find_deployment(deployment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Preparing);
    assert_eq!(store.inner.cluster_count().await, 1);
}

#[tokio::test]
async fn later_status_is_never_moved_back() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());
    let deployment = seed_deployment(store.as_ref(), DeploymentStatus::Live).await;

    orchestrator(&cloud, &store)
        .initialize_deployment(deployment.id)
        .await
        .unwrap();

    let stored = store.find_deployment(deployment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, DeploymentStatus::Live);
}

// ── Gating ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn operations_on_unknown_event_are_deployment_missing() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&cloud, &store);
    let event_id = Uuid::new_v4();
    let owner = Uuid::new_v4();

    let errors = [
        orchestrator
            .register_workload_definition(event_id, &two_container_spec())
            .await
            .unwrap_err(),
        orchestrator.workload_definition(event_id).await.unwrap_err(),
        orchestrator
            .start_instance(event_id, owner, &[])
            .await
            .unwrap_err(),
        orchestrator
            .refresh_instance(event_id, owner)
            .await
            .unwrap_err(),
        orchestrator.stop_instance(event_id, owner).await.unwrap_err(),
    ];

    for err in &errors {
        assert_eq!(sentinel(err), Some(OrchestratorError::DeploymentMissing));
        assert!(is_client_correctable(err));
    }
}

#[tokio::test]
async fn preparing_deployment_is_not_ready() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());
    let deployment = seed_deployment(store.as_ref(), DeploymentStatus::Preparing).await;
    let orchestrator = orchestrator(&cloud, &store);

    let err = orchestrator
        .start_instance(deployment.event_id, Uuid::new_v4(), &[])
        .await
        .unwrap_err();

    assert_eq!(
        sentinel(&err),
        Some(OrchestratorError::DeploymentNotReady {
            status: DeploymentStatus::Preparing
        })
    );
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn idle_deployment_without_network_reports_network_missing() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());
    let deployment = seed_deployment(store.as_ref(), DeploymentStatus::Idle).await;

    let err = orchestrator(&cloud, &store)
        .start_instance(deployment.event_id, Uuid::new_v4(), &[])
        .await
        .unwrap_err();

    assert_eq!(sentinel(&err), Some(OrchestratorError::NetworkMissing));
    assert_eq!(cloud.count("run_task"), 0);
}

// ── Workload lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn full_lifecycle_through_facade() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&cloud, &store);
    let event_id = Uuid::new_v4();
    let owner = Uuid::new_v4();
    orchestrator.create_deployment(event_id).await.unwrap();

    let definition = orchestrator
        .register_workload_definition(event_id, &two_container_spec())
        .await
        .unwrap();
    assert_eq!(
        orchestrator.workload_definition(event_id).await.unwrap(),
        definition
    );

    let flags = [flag("FLAG_ONE"), flag("FLAG_TWO")];
    let started = orchestrator
        .start_instance(event_id, owner, &flags)
        .await
        .unwrap();
    assert_eq!(started.definition_id, definition.id);

    let runs = cloud.runs();
    assert_eq!(runs[0].overrides.len(), 2);
    for container in &runs[0].overrides {
        let keys: Vec<&str> = container
            .environment
            .iter()
            .map(|kv| kv.name.as_str())
            .collect();
        assert_eq!(keys, ["FLAG_ONE", "FLAG_TWO"]);
    }

    cloud.attach_interface("eni-1", Some("198.51.100.4"));
    let refreshed = orchestrator.refresh_instance(event_id, owner).await.unwrap();
    assert_eq!(refreshed.public_ip.as_deref(), Some("198.51.100.4"));

    let stopped = orchestrator.stop_instance(event_id, owner).await.unwrap();
    assert!(stopped.stopped_at.is_some());
    assert_eq!(stopped.task_arn, started.task_arn);
}

#[tokio::test]
async fn refresh_before_registration_is_definition_missing() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&cloud, &store);
    let event_id = Uuid::new_v4();
    orchestrator.create_deployment(event_id).await.unwrap();

    let err = orchestrator
        .refresh_instance(event_id, Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(
        sentinel(&err),
        Some(OrchestratorError::WorkloadDefinitionMissing)
    );
}

#[tokio::test]
async fn stop_without_start_is_running_instance_missing() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());
    let orchestrator = orchestrator(&cloud, &store);
    let event_id = Uuid::new_v4();
    orchestrator.create_deployment(event_id).await.unwrap();
    orchestrator
        .register_workload_definition(event_id, &two_container_spec())
        .await
        .unwrap();

    let err = orchestrator
        .stop_instance(event_id, Uuid::new_v4())
        .await
        .unwrap_err();

    assert_eq!(
        sentinel(&err),
        Some(OrchestratorError::RunningInstanceMissing)
    );
    assert_eq!(cloud.count("stop_task"), 0);
}
