//! Application layer: port trait definitions and use-case orchestration.
//!
//! This module depends only on `crate::domain` and `outpost_common`, never
//! on `crate::infra`.

pub mod ports;
pub mod services;

pub use ports::{
    CloudProvider, ClusterRepository, ComputeApi, DeploymentRepository, Insertion, NetworkApi,
    NetworkRepository, Persistence, RunningInstanceRepository, StorageApi, StorageRepository,
    WorkloadDefinitionRepository,
};
