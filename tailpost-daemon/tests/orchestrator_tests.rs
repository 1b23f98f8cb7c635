//! Orchestrator integration tests.
//!
//! Tests the full flow: config -> agent build -> start -> heartbeat -> shutdown.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use tailpost_core::config::TailpostConfig;
use tailpost_core::event::LogEvent;
use tailpost_daemon::orchestrator::Orchestrator;

/// Collector stand-in that forwards every decoded event.
async fn spawn_collector() -> (String, mpsc::UnboundedReceiver<LogEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        if let Ok(event) = LogEvent::from_wire(&text) {
                            let _ = tx.send(event);
                        }
                    }
                }
            });
        }
    });

    (format!("ws://{addr}/ingest"), rx)
}

/// An endpoint on a port nothing listens on.
async fn refused_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("ws://{addr}/ingest")
}

/// Shutdown trigger that never fires.
fn never() -> std::future::Pending<anyhow::Result<&'static str>> {
    std::future::pending()
}

/// Build a config for a watch file, endpoint and PID file.
fn test_config(watch: &Path, endpoint: &str, pid_file: &Path, extra: &str) -> TailpostConfig {
    let toml_str = format!(
        r#"
[general]
log_level = "info"
pid_file = "{pid}"

[watch]
path = "{watch}"
start_position = "end"

[transport]
endpoint = "{endpoint}"
connect_timeout_secs = 1

[backoff]
initial_delay_ms = 10
max_delay_ms = 50

[metrics]
enabled = false
{extra}
"#,
        pid = pid_file.display(),
        watch = watch.display(),
    );
    TailpostConfig::parse(&toml_str).expect("failed to parse test config")
}

#[tokio::test]
async fn shutdown_future_stops_cleanly_and_removes_pid_file() {
    let (endpoint, _collector) = spawn_collector().await;
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("run").join("tailpost.pid");
    let config = test_config(&dir.path().join("app.log"), &endpoint, &pid_file, "");

    let mut orchestrator = Orchestrator::build_from_config(config).unwrap();

    let observed = pid_file.clone();
    let result = orchestrator
        .run_until(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            assert!(observed.exists(), "PID file should exist while running");
            Ok::<_, anyhow::Error>("test")
        })
        .await;

    assert!(result.is_ok(), "run_until failed: {result:?}");
    assert!(!pid_file.exists(), "PID file should be removed on shutdown");
    assert_eq!(orchestrator.agent().state_name(), "stopped");
    assert!(orchestrator.health().await.is_unhealthy());
}

#[tokio::test]
async fn heartbeat_context_reaches_collector() {
    let (endpoint, mut collector) = spawn_collector().await;
    let dir = tempfile::tempdir().unwrap();
    let watch = dir.path().join("app.log");
    let config = test_config(
        &watch,
        &endpoint,
        &dir.path().join("tailpost.pid"),
        "\n[heartbeat]\nenabled = true\ninterval_secs = 1\n",
    );

    let mut orchestrator = Orchestrator::build_from_config(config).unwrap();
    assert_eq!(orchestrator.collaborator_names(), vec!["uptime"]);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        orchestrator
            .run_until(async move {
                let _ = stop_rx.await;
                Ok::<_, anyhow::Error>("test")
            })
            .await
    });

    let event = tokio::time::timeout(Duration::from_secs(5), collector.recv())
        .await
        .expect("timed out waiting for heartbeat")
        .expect("collector closed");
    assert_eq!(event.metadata()["type"], "context");
    assert!(event.message().starts_with("heartbeat uptime="));
    assert!(event.metadata()["snapshot"].contains(&format!("watch={}", watch.display())));

    stop_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn exhausted_retries_fail_the_run() {
    let endpoint = refused_endpoint().await;
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("tailpost.pid");
    let mut config = test_config(&dir.path().join("app.log"), &endpoint, &pid_file, "");
    config.backoff.max_attempts = Some(0);

    let mut orchestrator = Orchestrator::build_from_config(config).unwrap();
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        orchestrator.run_until(never()),
    )
    .await
    .expect("run_until should return on a fatal agent error");

    let err = result.unwrap_err().to_string();
    assert!(err.contains("retries exhausted after 1 attempts"), "got: {err}");
    assert!(!pid_file.exists());
}

#[tokio::test]
async fn missing_watch_directory_fails_start_and_removes_pid_file() {
    let (endpoint, _collector) = spawn_collector().await;
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("tailpost.pid");
    let config = test_config(
        &dir.path().join("missing").join("app.log"),
        &endpoint,
        &pid_file,
        "",
    );

    let mut orchestrator = Orchestrator::build_from_config(config).unwrap();
    let result = orchestrator.run_until(never()).await;

    let err = result.unwrap_err().to_string();
    assert!(err.contains("failed to start tail agent"), "got: {err}");
    assert!(!pid_file.exists());
}

#[tokio::test]
async fn second_instance_with_same_pid_file_is_rejected() {
    let (endpoint, _collector) = spawn_collector().await;
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("tailpost.pid");
    std::fs::write(&pid_file, "4242\n").unwrap();
    let config = test_config(&dir.path().join("app.log"), &endpoint, &pid_file, "");

    let mut orchestrator = Orchestrator::build_from_config(config).unwrap();
    let err = orchestrator
        .run_until(never())
        .await
        .unwrap_err()
        .to_string();

    assert!(err.contains("already exists"), "got: {err}");
    // The other instance's file is left untouched.
    assert_eq!(std::fs::read_to_string(&pid_file).unwrap(), "4242\n");
    assert_eq!(orchestrator.agent().state_name(), "initialized");
}

#[tokio::test]
async fn shutdown_completes_while_heartbeat_is_blocked_on_full_queue() {
    let endpoint = refused_endpoint().await;
    let dir = tempfile::tempdir().unwrap();
    let pid_file = dir.path().join("tailpost.pid");
    let mut config = test_config(
        &dir.path().join("app.log"),
        &endpoint,
        &pid_file,
        "\n[heartbeat]\nenabled = true\ninterval_secs = 1\n",
    );
    config.transport.queue_capacity = 1;
    config.transport.overflow = "block".to_owned();

    let mut orchestrator = Orchestrator::build_from_config(config).unwrap();
    let result = tokio::time::timeout(
        Duration::from_secs(15),
        orchestrator.run_until(async {
            // The collector never accepts, so the second heartbeat blocks.
            tokio::time::sleep(Duration::from_millis(3500)).await;
            Ok::<_, anyhow::Error>("test")
        }),
    )
    .await
    .expect("shutdown hung behind a blocked heartbeat");

    assert!(result.is_ok(), "run_until failed: {result:?}");
    assert!(!pid_file.exists());
    assert_eq!(orchestrator.agent().state_name(), "stopped");
}
