//! Agent orchestration -- assembly, lifecycle, and the main wait loop.
//!
//! The [`Orchestrator`] is the central coordinator of `tailpost-daemon`.
//! It validates configuration, builds the [`TailAgent`], owns the
//! collaborator registry and drives the heartbeat scheduler.
//!
//! # Run loop
//!
//! 1. Write PID file (if configured)
//! 2. Start the agent (watch registration failure aborts here)
//! 3. Spawn heartbeat scheduler and uptime updater
//! 4. Wait for SIGTERM/SIGINT *or* a fatal agent error
//! 5. Stop background tasks, stop the agent, remove PID file
//!
//! A fatal agent error (exhausted retries, tail I/O fault) makes `run`
//! return `Err`, which the binary turns into a non-zero exit code.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use tailpost_agent::{AgentConfig, AgentError, TailAgent, TailAgentBuilder};
use tailpost_core::config::TailpostConfig;
use tailpost_core::pipeline::{HealthStatus, Pipeline};
use tailpost_core::plugin::{CollaboratorRegistry, ContextPublisher, DynCollaborator};

use crate::heartbeat::{UptimeHeartbeat, spawn_heartbeat_scheduler};
use crate::metrics_server;

/// Interval for refreshing the uptime gauge.
const UPTIME_UPDATE_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on waiting for each daemon task after cancellation.
const TASK_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// The main daemon orchestrator.
pub struct Orchestrator {
    /// Loaded and validated configuration.
    config: TailpostConfig,
    /// The tail agent (the only pipeline this daemon runs).
    agent: TailAgent,
    /// Fatal errors reported by the agent's background tasks.
    fatal_rx: mpsc::Receiver<AgentError>,
    /// Collaborators invoked on every heartbeat tick.
    registry: CollaboratorRegistry,
    /// Cancels daemon-level background tasks.
    cancel: CancellationToken,
    /// Daemon start time (for uptime reporting).
    start_time: Instant,
}

impl Orchestrator {
    /// Load configuration from `config_path` and build the orchestrator.
    ///
    /// Environment overrides are applied before validation.
    pub async fn build(config_path: &Path) -> Result<Self> {
        let config = TailpostConfig::load(config_path)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load config: {}", e))?;
        Self::build_from_config(config)
    }

    /// Build from an already-loaded configuration.
    pub fn build_from_config(config: TailpostConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| anyhow::anyhow!("config validation failed: {}", e))?;

        if config.metrics.enabled {
            metrics_server::install_metrics_recorder(&config.metrics)?;
            record_build_info();
        }

        let agent_config = AgentConfig::from_core(&config)
            .map_err(|e| anyhow::anyhow!("invalid agent config: {}", e))?;
        let (agent, fatal_rx) = TailAgentBuilder::new()
            .config(agent_config)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build tail agent: {}", e))?;
        let fatal_rx =
            fatal_rx.ok_or_else(|| anyhow::anyhow!("tail agent did not provide a fatal channel"))?;

        let mut registry = CollaboratorRegistry::new();
        if config.heartbeat.enabled {
            registry.register(Box::new(UptimeHeartbeat::new(config.watch.path.clone())))?;
        }

        tracing::info!(
            watch = %config.watch.path,
            endpoint = %config.transport.endpoint,
            collaborators = registry.count(),
            "orchestrator initialized"
        );

        Ok(Self {
            config,
            agent,
            fatal_rx,
            registry,
            cancel: CancellationToken::new(),
            start_time: Instant::now(),
        })
    }

    /// Register an additional heartbeat collaborator.
    ///
    /// Must be called before [`run`](Self::run).
    pub fn register_collaborator(&mut self, collaborator: Box<dyn DynCollaborator>) -> Result<()> {
        self.registry.register(collaborator)?;
        Ok(())
    }

    /// Names of registered collaborators, in call order.
    pub fn collaborator_names(&self) -> Vec<&str> {
        self.registry.names()
    }

    /// Run until SIGTERM/SIGINT or a fatal agent error.
    pub async fn run(&mut self) -> Result<()> {
        self.run_until(wait_for_shutdown_signal()).await
    }

    /// Run until `shutdown` resolves or the agent reports a fatal error.
    ///
    /// `shutdown` yields the name of the trigger for logging.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = Result<&'static str>>,
    {
        let pid_file = self.pid_file();
        if let Some(path) = &pid_file {
            write_pid_file(path)?;
        }

        if let Err(e) = self.agent.start().await {
            tracing::error!(error = %e, "tail agent failed to start");
            if let Some(path) = &pid_file {
                remove_pid_file(path);
            }
            return Err(anyhow::anyhow!("failed to start tail agent: {}", e));
        }

        let mut tasks = Vec::new();

        if self.config.heartbeat.enabled && !self.registry.is_empty() {
            let registry = Arc::new(std::mem::take(&mut self.registry));
            let publisher: Arc<dyn ContextPublisher> = self.agent.publisher();
            tasks.push(spawn_heartbeat_scheduler(
                registry,
                publisher,
                Duration::from_secs(self.config.heartbeat.interval_secs),
                self.cancel.clone(),
            ));
        }

        if self.config.metrics.enabled {
            tasks.push(spawn_uptime_updater(self.start_time, self.cancel.clone()));
        }

        tracing::info!("tailpost-daemon running");
        let outcome = tokio::select! {
            signal = shutdown => signal.map(|name| {
                tracing::info!(signal = name, "shutdown signal received");
            }),
            fatal = self.fatal_rx.recv() => match fatal {
                Some(e) => {
                    tracing::error!(error = %e, "tail agent reported a fatal error");
                    Err(anyhow::anyhow!("tail agent failed: {}", e))
                }
                None => Err(anyhow::anyhow!("tail agent fatal channel closed")),
            },
        };

        self.cancel.cancel();
        for mut task in tasks {
            if tokio::time::timeout(TASK_SHUTDOWN_TIMEOUT, &mut task).await.is_err() {
                tracing::warn!("daemon task did not stop in time, aborting");
                task.abort();
            }
        }

        if let Err(e) = self.agent.stop().await {
            tracing::error!(error = %e, "failed to stop tail agent");
        }

        if let Some(path) = &pid_file {
            remove_pid_file(path);
        }

        tracing::info!(
            uptime_secs = self.start_time.elapsed().as_secs(),
            "tailpost-daemon shut down"
        );
        outcome
    }

    /// Current agent health.
    pub async fn health(&self) -> HealthStatus {
        self.agent.health_check().await
    }

    /// Get a reference to the loaded configuration.
    pub fn config(&self) -> &TailpostConfig {
        &self.config
    }

    /// Get a reference to the tail agent.
    pub fn agent(&self) -> &TailAgent {
        &self.agent
    }

    /// Configured PID file path; empty means disabled.
    fn pid_file(&self) -> Option<PathBuf> {
        let path = self.config.general.pid_file.trim();
        (!path.is_empty()).then(|| PathBuf::from(path))
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
///
/// Returns the name of the signal that triggered the shutdown.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for Ctrl+C.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to install Ctrl+C handler: {}", e))?;
    Ok("CTRL_C")
}

/// Write the current process PID to `path`.
///
/// The file is created atomically (`create_new`) so a second instance
/// pointed at the same path fails instead of overwriting it.
pub fn write_pid_file(path: &Path) -> Result<()> {
    use std::fs::{self, OpenOptions};
    use std::io::{ErrorKind, Write};

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            fs::DirBuilder::new()
                .mode(0o700)
                .recursive(true)
                .create(parent)?;
        }
        #[cfg(not(unix))]
        {
            fs::create_dir_all(parent)?;
        }
    }

    let pid = std::process::id();
    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            let existing = fs::read_to_string(path).unwrap_or_else(|_| "unknown".to_owned());
            return Err(anyhow::anyhow!(
                "PID file {} already exists with PID: {}. Is another instance running?",
                path.display(),
                existing.trim()
            ));
        }
        Err(e) => return Err(e.into()),
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    writeln!(file, "{}", pid)?;
    tracing::info!(pid = pid, path = %path.display(), "PID file written");
    Ok(())
}

/// Remove the PID file. Failure is logged, not returned.
pub fn remove_pid_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => tracing::info!(path = %path.display(), "PID file removed"),
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove PID file"),
    }
}

/// Record the build info gauge (always 1, version as label).
fn record_build_info() {
    use tailpost_core::metrics as m;
    metrics::gauge!(m::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Spawn a background task that periodically updates the uptime gauge.
fn spawn_uptime_updater(
    start_time: Instant,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    use tailpost_core::metrics as m;

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(UPTIME_UPDATE_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("uptime updater shutting down");
                    break;
                }
                _ = interval.tick() => {
                    #[allow(clippy::cast_precision_loss)]
                    metrics::gauge!(m::DAEMON_UPTIME_SECONDS)
                        .set(start_time.elapsed().as_secs() as f64);
                }
            }
        }
    })
}
