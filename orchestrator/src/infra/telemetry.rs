use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber, filtered by `RUST_LOG` (default `info`).
///
/// Calling this more than once is harmless; later calls leave the first
/// subscriber in place.
pub fn init_tracing() {
    let installed = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()
        .is_ok();
    if installed {
        tracing::debug!("tracing initialised");
    }
}
