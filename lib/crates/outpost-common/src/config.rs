use serde::Deserialize;

/// Orchestrator configuration, loaded from `OUTPOST_*` environment variables.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Address block of every deployment network (default: 10.0.0.0/16)
    #[serde(default = "default_network_cidr")]
    pub network_cidr: String,

    /// Availability zone ids, one subnet is created in each (comma separated)
    #[serde(default = "default_availability_zones")]
    pub availability_zones: Vec<String>,

    /// Prefix length of each subnet carved out of `network_cidr` (default: 20)
    #[serde(default = "default_subnet_prefix_len")]
    pub subnet_prefix_len: u8,

    /// Region named in container log shipping options
    #[serde(default = "default_region")]
    pub region: String,

    /// Identity the compute service assumes to pull images and ship logs
    pub execution_role_arn: String,

    /// Identity handed to running containers (default: `execution_role_arn`)
    #[serde(default)]
    pub task_role_arn: Option<String>,

    /// Seconds between file-system readiness polls (default: 5)
    #[serde(default = "default_storage_poll_interval_secs")]
    pub storage_poll_interval_secs: u64,

    /// Valkey connection URL for the persisted store
    #[serde(default = "default_valkey_url")]
    pub valkey_url: String,

    /// ACL username for Valkey authentication
    #[serde(default)]
    pub valkey_user: Option<String>,

    /// ACL password for Valkey authentication
    #[serde(default)]
    pub valkey_password: Option<String>,
}

impl OrchestratorConfig {
    /// Defaults for everything except the execution identity.
    #[must_use]
    pub fn with_execution_role(execution_role_arn: impl Into<String>) -> Self {
        Self {
            network_cidr: default_network_cidr(),
            availability_zones: default_availability_zones(),
            subnet_prefix_len: default_subnet_prefix_len(),
            region: default_region(),
            execution_role_arn: execution_role_arn.into(),
            task_role_arn: None,
            storage_poll_interval_secs: default_storage_poll_interval_secs(),
            valkey_url: default_valkey_url(),
            valkey_user: None,
            valkey_password: None,
        }
    }

    /// Identity handed to running containers.
    #[must_use]
    pub fn task_role_arn(&self) -> &str {
        self.task_role_arn
            .as_deref()
            .unwrap_or(&self.execution_role_arn)
    }
}

fn default_network_cidr() -> String {
    "10.0.0.0/16".to_string()
}

fn default_availability_zones() -> Vec<String> {
    (1..=6).map(|n| format!("use1-az{n}")).collect()
}

fn default_subnet_prefix_len() -> u8 {
    20
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_storage_poll_interval_secs() -> u64 {
    5
}

fn default_valkey_url() -> String {
    "redis://valkey:6379".to_string()
}
