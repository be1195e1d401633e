//! Outpost library: provisions per-event cloud infrastructure and manages
//! the lifecycle of the workload instances running inside it.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod application;
pub mod domain;
pub mod infra;

pub use application::services::deployment::Orchestrator;
pub use domain::error::{OrchestratorError, PersistenceFailure, is_client_correctable};
