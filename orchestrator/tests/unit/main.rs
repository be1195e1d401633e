//! Unit tests for the outpost orchestrator.
//!
//! These tests run against the in-memory store and a fake cloud provider, so
//! they need no network access.

mod network_provisioner;
mod orchestrator;
mod workload_registrar;
