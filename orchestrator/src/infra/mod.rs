//! Infrastructure layer: store implementations, configuration loading, and
//! tracing setup.

pub mod config;
pub mod memory;
pub mod telemetry;
pub mod valkey;

pub use memory::MemoryStore;
pub use valkey::ValkeyStore;
