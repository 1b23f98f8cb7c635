//! Configuration layering tests.
//!
//! Precedence: TOML file < environment variables < command-line flags.

use clap::Parser;

use tailpost_core::config::TailpostConfig;
use tailpost_daemon::cli::DaemonCli;
use tailpost_daemon::orchestrator::Orchestrator;

/// Sets an environment variable and restores the previous value on drop.
struct EnvGuard {
    key: &'static str,
    original: Option<String>,
}

impl EnvGuard {
    fn set(key: &'static str, value: &str) -> Self {
        let original = std::env::var(key).ok();
        // SAFETY: tests touching the environment run under serial_test.
        unsafe {
            std::env::set_var(key, value);
        }
        Self { key, original }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        // SAFETY: see EnvGuard::set.
        unsafe {
            match &self.original {
                Some(val) => std::env::set_var(self.key, val),
                None => std::env::remove_var(self.key),
            }
        }
    }
}

/// Same layering the binary performs before starting.
async fn load_layered(path: &std::path::Path, cli: &DaemonCli) -> TailpostConfig {
    let mut config = TailpostConfig::from_file(path).await.unwrap();
    config.apply_env_overrides();
    cli.apply_overrides(&mut config);
    config
}

fn write_config(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("tailpost.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
#[serial_test::serial]
async fn cli_flag_beats_env_which_beats_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[transport]
endpoint = "ws://from-file:9000/ingest"
"#,
    );

    let _env = EnvGuard::set("TAILPOST_TRANSPORT_ENDPOINT", "ws://from-env:9000/ingest");

    let cli = DaemonCli::parse_from(["tailpost-daemon"]);
    let config = load_layered(&path, &cli).await;
    assert_eq!(config.transport.endpoint, "ws://from-env:9000/ingest");

    let cli = DaemonCli::parse_from([
        "tailpost-daemon",
        "--endpoint",
        "ws://from-cli:9000/ingest",
    ]);
    let config = load_layered(&path, &cli).await;
    assert_eq!(config.transport.endpoint, "ws://from-cli:9000/ingest");
}

#[tokio::test]
#[serial_test::serial]
async fn env_can_disable_heartbeat() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[heartbeat]\nenabled = true\n");

    let _env = EnvGuard::set("TAILPOST_HEARTBEAT_ENABLED", "false");

    let config = load_layered(&path, &DaemonCli::parse_from(["tailpost-daemon"])).await;
    let orchestrator = Orchestrator::build_from_config(config).unwrap();
    assert!(orchestrator.collaborator_names().is_empty());
}

#[tokio::test]
#[serial_test::serial]
async fn invalid_cli_override_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "");

    let cli = DaemonCli::parse_from(["tailpost-daemon", "--endpoint", "http://collector"]);
    let config = load_layered(&path, &cli).await;
    assert!(config.validate().is_err());
    assert!(Orchestrator::build_from_config(config).is_err());
}

#[tokio::test]
#[serial_test::serial]
async fn missing_config_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = Orchestrator::build(&dir.path().join("absent.toml"))
        .await
        .err()
        .expect("missing file must fail");
    assert!(err.to_string().contains("failed to load config"));
}

#[tokio::test]
#[serial_test::serial]
async fn build_loads_and_validates_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[watch]
path = "/var/log/nginx/access.log"

[filter]
min_level = "WARN"
"#,
    );

    let orchestrator = Orchestrator::build(&path).await.unwrap();
    assert_eq!(orchestrator.config().watch.path, "/var/log/nginx/access.log");
    assert_eq!(orchestrator.config().filter.min_level.as_deref(), Some("WARN"));
    assert_eq!(orchestrator.agent().state_name(), "initialized");
}
