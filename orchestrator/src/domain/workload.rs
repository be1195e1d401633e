//! Workload request types: the container specification a caller submits for
//! registration and the flags injected when an instance is started.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::OrchestratorError;

/// Name of the single shared-storage volume every workload definition gets.
/// Container mount points reference it through `VolumeMount::source`.
pub const SHARED_VOLUME_NAME: &str = "shared";

/// A workload to register: containers plus task-level resources.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub containers: Vec<ContainerSpec>,
    /// CPU units reserved for the whole task, e.g. `"256"`.
    pub cpu: String,
    /// Memory in MiB reserved for the whole task, e.g. `"512"`.
    pub memory: String,
}

impl WorkloadSpec {
    /// # Errors
    ///
    /// Returns [`OrchestratorError::EmptyWorkloadSpec`] when no containers
    /// are declared.
    pub fn validate(&self) -> Result<()> {
        if self.containers.is_empty() {
            return Err(OrchestratorError::EmptyWorkloadSpec.into());
        }
        Ok(())
    }
}

/// One container of a workload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image reference, e.g. `knockbox/web:1.4`.
    pub image: String,
    /// Whether the task stops when this container stops.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,
    #[serde(default, rename = "env")]
    pub environment: Vec<EnvVar>,
    #[serde(default)]
    pub ports: Vec<PortSpec>,
    #[serde(default)]
    pub volumes: Vec<VolumeMount>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EnvVar {
    pub key: String,
    pub value: String,
}

/// A port the container listens on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PortSpec {
    pub container_port: u16,
    /// Defaults to `container_port` on the provider side when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

impl PortSpec {
    /// TCP unless the declared protocol is exactly `udp`.
    #[must_use]
    pub fn transport(&self) -> TransportProtocol {
        match self.protocol.as_deref() {
            Some("udp") => TransportProtocol::Udp,
            _ => TransportProtocol::Tcp,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportProtocol {
    Tcp,
    Udp,
}

/// A volume mounted into a container.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VolumeMount {
    /// Mount path inside the container, e.g. `/mnt/shared`.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_only: Option<bool>,
    /// Name of the task volume to mount.
    pub source: String,
}

/// A flag handed to a running instance through its environment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventFlag {
    pub flag_id: Uuid,
    /// Environment variable the flag is exposed as.
    pub env_var: String,
}
