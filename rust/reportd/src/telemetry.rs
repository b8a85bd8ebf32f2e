use anyhow::{anyhow, Context};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Output goes to stderr; stdout carries
/// responses. `RUST_LOG` overrides the configured filter.
pub fn init(log_filter: &str) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_filter)
            .with_context(|| format!("invalid log filter '{}'", log_filter))?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow!("telemetry error: {e}"))
}
