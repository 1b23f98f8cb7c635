//! Daemon diagnostics output.
//!
//! The agent ships the *watched* file's lines to the collector; its own
//! diagnostics go to stderr so they can never be mistaken for tailed
//! content when stdout is captured. `RUST_LOG` overrides
//! `[general].log_level` entirely.

use anyhow::Result;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use tailpost_core::config::GeneralConfig;

/// Crates whose per-frame chatter is held at `warn` unless `RUST_LOG` says otherwise.
const QUIET_TARGETS: &[&str] = &["tungstenite", "tokio_tungstenite"];

/// Install the global subscriber for `log_format` (`json` or `pretty`).
///
/// Call once, before the orchestrator is built.
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let fmt_layer = match config.log_format.as_str() {
        "json" => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        "pretty" => tracing_subscriber::fmt::layer()
            .pretty()
            .with_writer(std::io::stderr)
            .boxed(),
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                other
            ));
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| {
            anyhow::anyhow!(
                "failed to initialize {} log output: {}",
                config.log_format,
                e
            )
        })
}

fn default_directives(log_level: &str) -> String {
    let mut directives = log_level.to_owned();
    for target in QUIET_TARGETS {
        directives.push_str(&format!(",{target}=warn"));
    }
    directives
}
