//! 설정 관리 -- tailpost.toml 파싱 및 런타임 설정
//!
//! [`TailpostConfig`]는 에이전트 전체 설정을 담는 최상위 구조체입니다.
//! 시작 시 한 번 로드되며 프로세스 수명 동안 읽기 전용입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`TAILPOST_WATCH_PATH=/var/log/app.log` 형식)
//! 3. 설정 파일 (`tailpost.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), tailpost_core::error::TailpostError> {
//! use tailpost_core::config::TailpostConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = TailpostConfig::load("tailpost.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = TailpostConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, TailpostError};
use crate::event::LogLevel;

/// Tailpost 통합 설정
///
/// `tailpost.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TailpostConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 파일 감시 설정
    #[serde(default)]
    pub watch: WatchConfig,
    /// 전송 계층 설정
    #[serde(default)]
    pub transport: TransportConfig,
    /// 재연결 백오프 설정
    #[serde(default)]
    pub backoff: BackoffConfig,
    /// 이벤트 필터 설정
    #[serde(default)]
    pub filter: FilterConfig,
    /// 주기 하트비트 설정
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    /// 메트릭 노출 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl TailpostConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TailpostError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TailpostError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TailpostError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TailpostError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, TailpostError> {
        toml::from_str(toml_str).map_err(|e| {
            TailpostError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TAILPOST_{SECTION}_{FIELD}`
    /// 예: `TAILPOST_TRANSPORT_ENDPOINT=ws://collector:9000/ingest`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "TAILPOST_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "TAILPOST_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pid_file, "TAILPOST_GENERAL_PID_FILE");

        // Watch
        override_string(&mut self.watch.path, "TAILPOST_WATCH_PATH");
        override_string(
            &mut self.watch.start_position,
            "TAILPOST_WATCH_START_POSITION",
        );
        override_string(&mut self.watch.watcher, "TAILPOST_WATCH_WATCHER");
        override_u64(
            &mut self.watch.poll_interval_ms,
            "TAILPOST_WATCH_POLL_INTERVAL_MS",
        );
        override_usize(
            &mut self.watch.max_line_length,
            "TAILPOST_WATCH_MAX_LINE_LENGTH",
        );

        // Transport
        override_string(&mut self.transport.endpoint, "TAILPOST_TRANSPORT_ENDPOINT");
        override_usize(
            &mut self.transport.queue_capacity,
            "TAILPOST_TRANSPORT_QUEUE_CAPACITY",
        );
        override_string(&mut self.transport.overflow, "TAILPOST_TRANSPORT_OVERFLOW");
        override_u64(
            &mut self.transport.connect_timeout_secs,
            "TAILPOST_TRANSPORT_CONNECT_TIMEOUT_SECS",
        );

        // Backoff
        override_u64(
            &mut self.backoff.initial_delay_ms,
            "TAILPOST_BACKOFF_INITIAL_DELAY_MS",
        );
        override_u64(&mut self.backoff.max_delay_ms, "TAILPOST_BACKOFF_MAX_DELAY_MS");
        override_f64(&mut self.backoff.multiplier, "TAILPOST_BACKOFF_MULTIPLIER");
        override_f64(
            &mut self.backoff.jitter_factor,
            "TAILPOST_BACKOFF_JITTER_FACTOR",
        );
        override_opt_u32(
            &mut self.backoff.max_attempts,
            "TAILPOST_BACKOFF_MAX_ATTEMPTS",
        );

        // Filter
        override_opt_string(&mut self.filter.min_level, "TAILPOST_FILTER_MIN_LEVEL");
        override_opt_string(
            &mut self.filter.source_pattern,
            "TAILPOST_FILTER_SOURCE_PATTERN",
        );
        override_opt_string(
            &mut self.filter.message_contains,
            "TAILPOST_FILTER_MESSAGE_CONTAINS",
        );

        // Heartbeat
        override_bool(&mut self.heartbeat.enabled, "TAILPOST_HEARTBEAT_ENABLED");
        override_u64(
            &mut self.heartbeat.interval_secs,
            "TAILPOST_HEARTBEAT_INTERVAL_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "TAILPOST_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "TAILPOST_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "TAILPOST_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TailpostError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.watch.path.is_empty() {
            return Err(invalid("watch.path", "must not be empty"));
        }

        let valid_positions = ["end", "beginning"];
        if !valid_positions.contains(&self.watch.start_position.as_str()) {
            return Err(invalid(
                "watch.start_position",
                format!("must be one of: {}", valid_positions.join(", ")),
            ));
        }

        let valid_watchers = ["native", "poll"];
        if !valid_watchers.contains(&self.watch.watcher.as_str()) {
            return Err(invalid(
                "watch.watcher",
                format!("must be one of: {}", valid_watchers.join(", ")),
            ));
        }

        if self.watch.poll_interval_ms == 0 {
            return Err(invalid("watch.poll_interval_ms", "must be greater than 0"));
        }

        if self.watch.max_line_length == 0 {
            return Err(invalid("watch.max_line_length", "must be greater than 0"));
        }

        if !(self.transport.endpoint.starts_with("ws://")
            || self.transport.endpoint.starts_with("wss://"))
        {
            return Err(invalid(
                "transport.endpoint",
                "must be a ws:// or wss:// URL",
            ));
        }

        if self.transport.queue_capacity == 0 {
            return Err(invalid("transport.queue_capacity", "must be greater than 0"));
        }

        let valid_overflow = ["block", "drop_oldest", "drop_newest"];
        if !valid_overflow.contains(&self.transport.overflow.as_str()) {
            return Err(invalid(
                "transport.overflow",
                format!("must be one of: {}", valid_overflow.join(", ")),
            ));
        }

        if self.transport.connect_timeout_secs == 0 {
            return Err(invalid(
                "transport.connect_timeout_secs",
                "must be greater than 0",
            ));
        }

        self.backoff.validate()?;

        if let Some(level) = &self.filter.min_level
            && LogLevel::from_str_loose(level).is_none()
        {
            return Err(invalid(
                "filter.min_level",
                "must be one of: TRACE, DEBUG, INFO, WARN, ERROR, FATAL",
            ));
        }

        if self.heartbeat.enabled && self.heartbeat.interval_secs == 0 {
            return Err(invalid("heartbeat.interval_secs", "must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> TailpostError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// PID 파일 경로 (빈 문자열이면 사용하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// 파일 감시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// 감시할 로그 파일 경로
    pub path: String,
    /// 시작 위치 (end, beginning)
    pub start_position: String,
    /// 감시 백엔드 (native, poll)
    pub watcher: String,
    /// poll 백엔드의 폴링 간격 (밀리초)
    pub poll_interval_ms: u64,
    /// 한 줄의 최대 길이 (바이트)
    pub max_line_length: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            path: "/var/log/app.log".to_owned(),
            start_position: "end".to_owned(),
            watcher: "native".to_owned(),
            poll_interval_ms: 1000,
            max_line_length: 64 * 1024, // 64KB
        }
    }
}

/// 전송 계층 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// 수집기 WebSocket URL
    pub endpoint: String,
    /// 내부 큐 최대 용량
    pub queue_capacity: usize,
    /// 큐가 가득 찼을 때의 정책 (block, drop_oldest, drop_newest)
    pub overflow: String,
    /// 연결 시도 타임아웃 (초)
    pub connect_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:9000/ingest".to_owned(),
            queue_capacity: 256,
            overflow: "block".to_owned(),
            connect_timeout_secs: 10,
        }
    }
}

/// 재연결 백오프 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// 첫 재시도 지연 (밀리초)
    pub initial_delay_ms: u64,
    /// 최대 지연 (밀리초)
    pub max_delay_ms: u64,
    /// 시도마다 곱해지는 배수
    pub multiplier: f64,
    /// 지터 비율 (0.0 ~ 1.0)
    pub jitter_factor: f64,
    /// 최대 재시도 횟수 (없으면 무제한)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter_factor: 0.1,
            max_attempts: None,
        }
    }
}

impl BackoffConfig {
    /// 백오프 파라미터 불변식을 검증합니다.
    pub fn validate(&self) -> Result<(), TailpostError> {
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(invalid(
                "backoff.initial_delay_ms",
                "must not exceed backoff.max_delay_ms",
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(invalid("backoff.multiplier", "must be a finite value >= 1.0"));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(invalid("backoff.jitter_factor", "must be within 0.0-1.0"));
        }
        Ok(())
    }
}

/// 이벤트 필터 설정
///
/// 설정된 조건만 적용되며, 모두 비어 있으면 모든 이벤트가 통과합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// 최소 심각도 (TRACE ~ FATAL)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_level: Option<String>,
    /// source 전체 일치 정규식
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_pattern: Option<String>,
    /// 메시지 부분 문자열 (대소문자 무시)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_contains: Option<String>,
}

/// 주기 하트비트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 호출 간격 (초)
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
        }
    }
}

/// 메트릭 노출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리슨 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_opt_string(target: &mut Option<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = if val.is_empty() { None } else { Some(val) };
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_opt_u32(target: &mut Option<u32>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        if val.is_empty() {
            *target = None;
            return;
        }
        match val.parse::<u32>() {
            Ok(parsed) => *target = Some(parsed),
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_f64(target: &mut f64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<f64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse f64 from env var, ignoring"
            ),
        }
    }
}
