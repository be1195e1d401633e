//! Tests for `NetworkProvisioner`.

use std::sync::Arc;

use outpost::PersistenceFailure;
use outpost::application::ports::IngressRule;
use outpost::application::services::network::NetworkProvisioner;
use outpost::domain::NetworkLayout;
use outpost::infra::MemoryStore;
use outpost_common::NetworkState;

use crate::helpers::{FakeCloud, FlakyStore, config};

fn provisioner<S>(cloud: &Arc<FakeCloud>, store: &Arc<S>) -> NetworkProvisioner<FakeCloud, S>
where
    S: outpost::application::NetworkRepository,
{
    let layout = NetworkLayout::from_config(&config()).expect("default layout");
    NetworkProvisioner::new(Arc::clone(cloud), Arc::clone(store), layout)
}

#[tokio::test]
async fn builds_network_with_subnet_per_zone() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());

    let network = provisioner(&cloud, &store).ensure_network(1).await.unwrap();

    assert_eq!(cloud.calls_to("create_network")[0].args, ["10.0.0.0/16"]);
    assert_eq!(cloud.count("enable_dns_hostnames"), 1);
    let subnets: Vec<(String, String)> = cloud
        .calls_to("create_subnet")
        .into_iter()
        .map(|call| (call.args[1].clone(), call.args[2].clone()))
        .collect();
    assert_eq!(subnets.len(), 6);
    assert_eq!(subnets[0], ("use1-az1".to_string(), "10.0.0.0/20".to_string()));
    assert_eq!(subnets[5], ("use1-az6".to_string(), "10.0.80.0/20".to_string()));

    assert_eq!(network.network_id, "vpc-1");
    assert_eq!(network.security_group_id, "sg-vpc-1");
    assert_eq!(network.state, NetworkState::Available);
    assert_eq!(
        cloud.calls_to("attach_internet_gateway")[0].args,
        [network.internet_gateway_id.as_str(), "vpc-1"]
    );
}

#[tokio::test]
async fn opens_ingress_and_routes_through_gateway() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());

    let network = provisioner(&cloud, &store).ensure_network(1).await.unwrap();

    assert_eq!(cloud.calls_to("authorize_ingress")[0].args, ["sg-vpc-1"]);
    assert_eq!(cloud.ingress_rules(), [IngressRule::allow_all()]);
    assert_eq!(
        cloud.calls_to("create_route")[0].args,
        ["rtb-vpc-1", "0.0.0.0/0", network.internet_gateway_id.as_str()]
    );
}

#[tokio::test]
async fn second_ensure_returns_stored_network() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());
    let provisioner = provisioner(&cloud, &store);

    let first = provisioner.ensure_network(1).await.unwrap();
    let second = provisioner.ensure_network(1).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(cloud.count("create_network"), 1);
    assert_eq!(store.network_count().await, 1);
}

#[tokio::test]
async fn deployments_get_separate_networks() {
    let cloud = FakeCloud::new();
    let store = Arc::new(MemoryStore::new());
    let provisioner = provisioner(&cloud, &store);

    let first = provisioner.ensure_network(1).await.unwrap();
    let second = provisioner.ensure_network(2).await.unwrap();

    assert_ne!(first.network_id, second.network_id);
    assert_eq!(store.network_count().await, 2);
}

#[tokio::test]
async fn failed_subnet_aborts_without_storing() {
    let cloud = FakeCloud::new();
    cloud.fail("create_subnet");
    let store = Arc::new(MemoryStore::new());

    let err = provisioner(&cloud, &store)
        .ensure_network(1)
        .await
        .unwrap_err();

    assert!(format!("{err:#}").contains("creating subnet"));
    assert_eq!(cloud.count("create_subnet"), 1);
    assert_eq!(cloud.count("create_internet_gateway"), 0);
    assert_eq!(store.network_count().await, 0);
}

#[tokio::test]
async fn failed_route_aborts_without_storing() {
    let cloud = FakeCloud::new();
    cloud.fail("create_route");
    let store = Arc::new(MemoryStore::new());

    assert!(provisioner(&cloud, &store).ensure_network(1).await.is_err());
    assert_eq!(store.network_count().await, 0);
}

#[tokio::test]
async fn insert_failure_is_tagged_as_persistence() {
    let cloud = FakeCloud::new();
    let store = FlakyStore::new();
    store.fail("insert_network");

    let err = provisioner(&cloud, &store)
        .ensure_network(1)
        .await
        .unwrap_err();

    assert!(PersistenceFailure::is_cause_of(&err));
    assert_eq!(cloud.count("create_route"), 1);
}
