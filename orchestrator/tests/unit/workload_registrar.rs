//! Tests for `WorkloadRegistrar`.

use std::sync::Arc;

use outpost::application::ports::{LaunchType, NetworkMode, StorageRepository};
use outpost::application::services::workload::{RegistrationIdentity, WorkloadRegistrar};
use outpost::domain::{SHARED_VOLUME_NAME, WorkloadSpec};
use outpost::infra::MemoryStore;
use outpost::{OrchestratorError, is_client_correctable};
use outpost_common::{Deployment, DeploymentStatus, StorageInstance, StorageState};

use crate::helpers::{EXECUTION_ROLE, FakeCloud, config, seed_deployment, two_container_spec};

struct Fixture {
    cloud: Arc<FakeCloud>,
    store: Arc<MemoryStore>,
    deployment: Deployment,
    registrar: WorkloadRegistrar<FakeCloud, MemoryStore>,
}

async fn fixture(storage_state: Option<StorageState>) -> Fixture {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());
    let deployment = seed_deployment(store.as_ref(), DeploymentStatus::Idle).await;
    if let Some(state) = storage_state {
        store
            .insert_storage(StorageInstance {
                id: 0,
                deployment_id: deployment.id,
                file_system_id: "fs-shared".to_string(),
                resource_arn: "arn:fs/fs-shared".to_string(),
                state,
            })
            .await
            .unwrap();
    }
    let registrar = WorkloadRegistrar::new(
        Arc::clone(&cloud),
        Arc::clone(&store),
        RegistrationIdentity::from(&config()),
    );
    Fixture {
        cloud,
        store,
        deployment,
        registrar,
    }
}

#[tokio::test]
async fn registers_one_family_bound_to_storage() {
    let f = fixture(Some(StorageState::Available)).await;

    let definition = f
        .registrar
        .register(&f.deployment, &two_container_spec())
        .await
        .unwrap();

    let registrations = f.cloud.registrations();

    let request = &registrations[0];
    assert_eq!(request.family, definition.family.to_string());
    assert_eq!(request.containers.len(), 2);
    assert_eq!(request.cpu, "512");
    assert_eq!(request.memory, "1024");
    assert_eq!(request.network_mode, NetworkMode::Vpc);
    assert_eq!(request.launch_type, LaunchType::Fargate);
    assert_eq!(request.execution_role_arn, EXECUTION_ROLE);
    assert_eq!(request.task_role_arn, EXECUTION_ROLE);
    assert_eq!(request.volumes.len(), 1);
    assert_eq!(request.volumes[0].name, SHARED_VOLUME_NAME);
    assert_eq!(request.volumes[0].file_system_id, "fs-shared");

    let storage = f.store.find_storage(f.deployment.id).await.unwrap().unwrap();
    assert_eq!(definition.storage_id, storage.id);
    assert!(definition.arn.contains(&request.family));
}

#[tokio::test]
async fn containers_log_to_family_group() {
    let f = fixture(Some(StorageState::Available)).await;

    let definition = f
        .registrar
        .register(&f.deployment, &two_container_spec())
        .await
        .unwrap();

    let registrations = f.cloud.registrations();

    let request = &registrations[0];
    let family = definition.family.to_string();
    assert!(request.containers.iter().all(|c| c.log.group == family));
    assert_eq!(request.containers[0].log.stream_prefix, "knockbox/web:1.4");
    assert_eq!(request.containers[1].log.stream_prefix, "knockbox/sidecar:2.0");
    assert_eq!(request.containers[0].port_mappings[0].container_port, 8080);
    assert!(request.containers[1].port_mappings.is_empty());
}

#[tokio::test]
async fn second_registration_returns_stored_definition() {
    let f = fixture(Some(StorageState::Available)).await;

    let first = f
        .registrar
        .register(&f.deployment, &two_container_spec())
        .await
        .unwrap();
    let second = f
        .registrar
        .register(&f.deployment, &two_container_spec())
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(f.cloud.count("register_task_definition"), 1);
}

#[tokio::test]
async fn missing_storage_is_rejected_before_registration() {
    let f = fixture(None).await;

    let err = f
        .registrar
        .register(&f.deployment, &two_container_spec())
        .await
        .unwrap_err();

    assert_eq!(
        OrchestratorError::find(&err),
        Some(&OrchestratorError::StorageMissing)
    );
    assert_eq!(f.cloud.count("register_task_definition"), 0);
}

#[tokio::test]
async fn creating_storage_is_not_ready() {
    let f = fixture(Some(StorageState::Creating)).await;
    f.cloud.describe_file_systems_as(&[StorageState::Creating]);

    let err = f
        .registrar
        .register(&f.deployment, &two_container_spec())
        .await
        .unwrap_err();

    assert_eq!(
        OrchestratorError::find(&err),
        Some(&OrchestratorError::StorageNotReady {
            state: StorageState::Creating
        })
    );
    assert!(is_client_correctable(&err));
    assert_eq!(f.cloud.count("register_task_definition"), 0);
}

#[tokio::test]
async fn stale_storage_state_is_refreshed_first() {
    let f = fixture(Some(StorageState::Creating)).await;
    f.cloud.describe_file_systems_as(&[StorageState::Available]);

    f.registrar
        .register(&f.deployment, &two_container_spec())
        .await
        .unwrap();

    assert_eq!(f.cloud.calls_to("describe_file_system")[0].args, ["fs-shared"]);
    assert_eq!(
        f.store
            .find_storage(f.deployment.id)
            .await
            .unwrap()
            .unwrap()
            .state,
        StorageState::Available
    );
}

#[tokio::test]
async fn available_storage_is_not_described() {
    let f = fixture(Some(StorageState::Available)).await;

    f.registrar
        .register(&f.deployment, &two_container_spec())
        .await
        .unwrap();

    assert_eq!(f.cloud.count("describe_file_system"), 0);
}

#[tokio::test]
async fn empty_spec_is_rejected() {
    let f = fixture(Some(StorageState::Available)).await;
    let spec = WorkloadSpec {
        containers: Vec::new(),
        cpu: "256".to_string(),
        memory: "512".to_string(),
    };

    let err = f.registrar.register(&f.deployment, &spec).await.unwrap_err();

    assert_eq!(
        OrchestratorError::find(&err),
        Some(&OrchestratorError::EmptyWorkloadSpec)
    );
}

#[tokio::test]
async fn separate_task_role_is_used_when_configured() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());
    let deployment = seed_deployment(store.as_ref(), DeploymentStatus::Idle).await;
    store
        .insert_storage(StorageInstance {
            id: 0,
            deployment_id: deployment.id,
            file_system_id: "fs-shared".to_string(),
            resource_arn: "arn:fs/fs-shared".to_string(),
            state: StorageState::Available,
        })
        .await
        .unwrap();
    let mut config = config();
    config.task_role_arn = Some("arn:role/task".to_string());
    config.region = "eu-west-1".to_string();
    let registrar = WorkloadRegistrar::new(
        Arc::clone(&cloud),
        Arc::clone(&store),
        RegistrationIdentity::from(&config),
    );

    registrar
        .register(&deployment, &two_container_spec())
        .await
        .unwrap();

    let registrations = cloud.registrations();

    let request = &registrations[0];
    assert_eq!(request.execution_role_arn, EXECUTION_ROLE);
    assert_eq!(request.task_role_arn, "arn:role/task");
    assert!(request.containers.iter().all(|c| c.log.region == "eu-west-1"));
}

#[tokio::test]
async fn missing_definition_lookup_is_named() {
    let f = fixture(Some(StorageState::Available)).await;

    let err = f.registrar.definition(f.deployment.id).await.unwrap_err();

    assert_eq!(
        OrchestratorError::find(&err),
        Some(&OrchestratorError::WorkloadDefinitionMissing)
    );
}
