//! Application services: one module per provisioning or lifecycle component.
//!
//! Each service composes domain logic with port trait calls. Services import
//! only from `crate::domain` and `crate::application::ports`.

pub mod cluster;
pub mod deployment;
pub mod instance;
pub mod network;
pub mod storage;
pub mod watcher;
pub mod workload;
