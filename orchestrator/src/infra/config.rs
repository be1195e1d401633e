//! Loads [`OrchestratorConfig`] from `OUTPOST_*` environment variables.

use anyhow::{Context, Result};
use outpost_common::OrchestratorConfig;

/// Prefix shared by every orchestrator environment variable.
pub const ENV_PREFIX: &str = "OUTPOST_";

/// Read the configuration from the process environment.
///
/// # Errors
///
/// Returns an error if `OUTPOST_EXECUTION_ROLE_ARN` is unset or a variable
/// does not parse.
pub fn load() -> Result<OrchestratorConfig> {
    let config: OrchestratorConfig = envy::prefixed(ENV_PREFIX)
        .from_env()
        .context("failed to load config from OUTPOST_* env vars (OUTPOST_EXECUTION_ROLE_ARN is required)")?;
    log_loaded(&config);
    Ok(config)
}

/// Read the configuration from explicit `(name, value)` pairs.
///
/// # Errors
///
/// Same as [`load`].
pub fn load_from<I>(vars: I) -> Result<OrchestratorConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let config: OrchestratorConfig = envy::prefixed(ENV_PREFIX)
        .from_iter(vars)
        .context("failed to parse OUTPOST_* configuration")?;
    log_loaded(&config);
    Ok(config)
}

fn log_loaded(config: &OrchestratorConfig) {
    tracing::info!(
        network_cidr = %config.network_cidr,
        zones = config.availability_zones.len(),
        region = %config.region,
        poll_interval_secs = config.storage_poll_interval_secs,
        valkey_url = %config.valkey_url,
        "configuration loaded"
    );
}
