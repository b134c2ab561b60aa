//! Log setup for the `imagetest` run.
//!
//! Logs always go to stderr; stdout carries only the run summary or the
//! printed workflow documents.

use anyhow::{Context, Result, bail};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use imagetest_core::config::GeneralConfig;

/// Install the global subscriber from `[general]`: `json` or `pretty` lines on stderr.
///
/// `RUST_LOG` wins over `general.log_level`. Fails if a subscriber is already set.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format.as_str() {
        "json" => registry.with(layer.json()).try_init(),
        "pretty" => registry.with(layer.pretty()).try_init(),
        other => bail!("unknown log format '{other}', expected 'json' or 'pretty'"),
    };
    installed.with_context(|| format!("failed to install {} log output", config.log_format))
}
