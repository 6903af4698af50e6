use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

/// Installs the JSON subscriber used by every Lambda binary. Honours
/// `RUST_LOG` and falls back to `info`.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if let Err(error) = fmt()
        .with_env_filter(filter)
        .json()
        .with_current_span(false)
        .try_init()
    {
        eprintln!("tracing init failed: {error}");
    }
}
