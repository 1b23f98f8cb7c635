//! CLI argument definitions for tailpost-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use tailpost_core::config::TailpostConfig;

/// Tailpost log tailing agent.
///
/// Follows a single log file and forwards new lines as structured
/// events to a WebSocket collector.
#[derive(Parser, Debug)]
#[command(name = "tailpost-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to tailpost.toml configuration file.
    #[arg(short, long, default_value = "/etc/tailpost/tailpost.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the collector endpoint (ws:// or wss://).
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Override the file to follow.
    #[arg(long)]
    pub watch: Option<String>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Apply command-line overrides on top of the loaded configuration.
    ///
    /// The caller is expected to re-run `validate()` afterwards.
    pub fn apply_overrides(&self, config: &mut TailpostConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(endpoint) = &self.endpoint {
            config.transport.endpoint = endpoint.clone();
        }
        if let Some(path) = &self.watch {
            config.watch.path = path.clone();
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file = pid_file.clone();
        }
    }
}
