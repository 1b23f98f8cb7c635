//! Periodic heartbeat -- built-in collaborator and the tick scheduler.
//!
//! The scheduler owns nothing but an interval: on every tick it asks the
//! [`CollaboratorRegistry`] to call each collaborator with the agent's
//! publisher. A failing collaborator is logged and counted, never fatal.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tailpost_core::error::TailpostError;
use tailpost_core::metrics as m;
use tailpost_core::plugin::{Collaborator, CollaboratorRegistry, ContextPublisher};
use tokio_util::sync::CancellationToken;

/// Built-in collaborator that publishes a liveness line with uptime.
pub struct UptimeHeartbeat {
    started: Instant,
    label: String,
}

impl UptimeHeartbeat {
    /// Create a heartbeat collaborator; `label` identifies this agent
    /// instance (usually the watched path).
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            started: Instant::now(),
            label: label.into(),
        }
    }

    /// Render the heartbeat text for a given uptime.
    pub fn render(&self, uptime: Duration) -> String {
        format!(
            "heartbeat uptime={}s\nwatch={}\npid={}\nversion={}",
            uptime.as_secs(),
            self.label,
            std::process::id(),
            env!("CARGO_PKG_VERSION"),
        )
    }
}

impl Collaborator for UptimeHeartbeat {
    fn name(&self) -> &str {
        "uptime"
    }

    async fn on_heartbeat(&self, publisher: &dyn ContextPublisher) -> Result<(), TailpostError> {
        let text = self.render(self.started.elapsed());
        publisher.publish(&text).await?;
        Ok(())
    }
}

/// Spawn the heartbeat scheduler.
///
/// The first tick fires one full `interval` after start.
pub fn spawn_heartbeat_scheduler(
    registry: Arc<CollaboratorRegistry>,
    publisher: Arc<dyn ContextPublisher>,
    interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + interval;
        let mut ticker = tokio::time::interval_at(start, interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("heartbeat scheduler shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    // A publish blocked on a full queue must not outlive cancellation.
                    let report = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            tracing::debug!("heartbeat round abandoned on shutdown");
                            break;
                        }
                        report = registry.heartbeat_all(publisher.as_ref()) => report,
                    };
                    if !report.failures.is_empty() {
                        metrics::counter!(m::HEARTBEAT_FAILURES_TOTAL)
                            .increment(report.failures.len() as u64);
                    }
                    tracing::debug!(
                        succeeded = report.succeeded,
                        failed = report.failures.len(),
                        "heartbeat round completed"
                    );
                }
            }
        }
    })
}
