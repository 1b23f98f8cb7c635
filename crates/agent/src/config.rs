//! 에이전트 설정
//!
//! [`AgentConfig`]는 core의 [`TailpostConfig`]에서 문자열 설정을 타입이 있는 값으로
//! 변환한 에이전트 전용 설정입니다.
//!
//! # 사용 예시
//! ```ignore
//! use tailpost_core::config::TailpostConfig;
//! use tailpost_agent::config::AgentConfig;
//!
//! let core_config = TailpostConfig::default();
//! let config = AgentConfig::from_core(&core_config)?;
//! ```

use std::path::PathBuf;
use std::time::Duration;

use tailpost_core::config::{FilterConfig, TailpostConfig};

use crate::backoff::BackoffPolicy;
use crate::error::AgentError;
use crate::filter::FilterChain;
use crate::queue::OverflowPolicy;
use crate::tailer::{StartPosition, TailerOptions, WatcherKind};

/// 에이전트 설정
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// tail 대상 파일
    pub watch_path: PathBuf,
    /// 시작 위치
    pub start_position: StartPosition,
    /// 감시 백엔드
    pub watcher: WatcherKind,
    /// poll 백엔드 간격
    pub poll_interval: Duration,
    /// 한 줄의 최대 길이 (바이트). 넘으면 조각으로 나누어 방출
    pub max_line_length: usize,
    /// 수집기 WebSocket URL (`ws://` 또는 `wss://`)
    pub endpoint: String,
    /// 필터와 전송 사이 큐 용량
    pub queue_capacity: usize,
    /// 큐가 가득 찼을 때 정책
    pub overflow: OverflowPolicy,
    /// 연결 타임아웃
    pub connect_timeout: Duration,
    /// 재연결 정책
    pub backoff: BackoffPolicy,
    /// 필터 설정
    pub filter: FilterConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            watch_path: PathBuf::from("/var/log/app.log"),
            start_position: StartPosition::End,
            watcher: WatcherKind::Native,
            poll_interval: Duration::from_secs(1),
            max_line_length: 64 * 1024,
            endpoint: "ws://127.0.0.1:9000/ingest".to_owned(),
            queue_capacity: 256,
            overflow: OverflowPolicy::Block,
            connect_timeout: Duration::from_secs(10),
            backoff: BackoffPolicy::default(),
            filter: FilterConfig::default(),
        }
    }
}

impl AgentConfig {
    /// core 설정에서 에이전트 설정을 생성합니다.
    pub fn from_core(core: &TailpostConfig) -> Result<Self, AgentError> {
        Ok(Self {
            watch_path: PathBuf::from(&core.watch.path),
            start_position: core.watch.start_position.parse()?,
            watcher: core.watch.watcher.parse()?,
            poll_interval: Duration::from_millis(core.watch.poll_interval_ms),
            max_line_length: core.watch.max_line_length,
            endpoint: core.transport.endpoint.clone(),
            queue_capacity: core.transport.queue_capacity,
            overflow: core.transport.overflow.parse()?,
            connect_timeout: Duration::from_secs(core.transport.connect_timeout_secs),
            backoff: BackoffPolicy::from_core(&core.backoff),
            filter: core.filter.clone(),
        })
    }

    /// tailer 옵션
    pub fn tailer_options(&self) -> TailerOptions {
        TailerOptions {
            start_position: self.start_position,
            watcher: self.watcher,
            poll_interval: self.poll_interval,
            max_line_length: self.max_line_length,
            ..TailerOptions::default()
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.watch_path.as_os_str().is_empty() {
            return Err(AgentError::Config {
                field: "watch.path".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.watch_path.file_name().is_none() {
            return Err(AgentError::Config {
                field: "watch.path".to_owned(),
                reason: format!("'{}' does not name a file", self.watch_path.display()),
            });
        }

        if self.poll_interval.is_zero() {
            return Err(AgentError::Config {
                field: "watch.poll_interval_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.max_line_length == 0 {
            return Err(AgentError::Config {
                field: "watch.max_line_length".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(AgentError::Config {
                field: "transport.endpoint".to_owned(),
                reason: format!("'{}' must start with ws:// or wss://", self.endpoint),
            });
        }

        if self.queue_capacity == 0 {
            return Err(AgentError::Config {
                field: "transport.queue_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.connect_timeout.is_zero() {
            return Err(AgentError::Config {
                field: "transport.connect_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        self.backoff.validate()?;

        // 레벨 이름과 정규식을 미리 컴파일해 시작 시점에 실패시킴
        FilterChain::from_config(&self.filter)?;

        Ok(())
    }
}

/// 에이전트 설정 빌더
#[derive(Default)]
pub struct AgentConfigBuilder {
    config: AgentConfig,
}

impl AgentConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// tail 대상 파일을 설정합니다.
    pub fn watch_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.watch_path = path.into();
        self
    }

    /// 시작 위치를 설정합니다.
    pub fn start_position(mut self, position: StartPosition) -> Self {
        self.config.start_position = position;
        self
    }

    /// 감시 백엔드를 설정합니다.
    pub fn watcher(mut self, kind: WatcherKind) -> Self {
        self.config.watcher = kind;
        self
    }

    /// poll 백엔드 간격을 설정합니다.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// 최대 라인 길이를 설정합니다.
    pub fn max_line_length(mut self, len: usize) -> Self {
        self.config.max_line_length = len;
        self
    }

    /// 수집기 URL을 설정합니다.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// 큐 용량을 설정합니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// 오버플로우 정책을 설정합니다.
    pub fn overflow(mut self, policy: OverflowPolicy) -> Self {
        self.config.overflow = policy;
        self
    }

    /// 연결 타임아웃을 설정합니다.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// 재연결 정책을 설정합니다.
    pub fn backoff(mut self, policy: BackoffPolicy) -> Self {
        self.config.backoff = policy;
        self
    }

    /// 필터 설정을 지정합니다.
    pub fn filter(mut self, filter: FilterConfig) -> Self {
        self.config.filter = filter;
        self
    }

    /// 설정을 검증하고 `AgentConfig`를 생성합니다.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        AgentConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_converts_values() {
        let mut core = TailpostConfig::default();
        core.watch.path = "/tmp/service.log".to_owned();
        core.watch.start_position = "beginning".to_owned();
        core.watch.watcher = "poll".to_owned();
        core.watch.poll_interval_ms = 250;
        core.transport.overflow = "drop_oldest".to_owned();
        core.transport.connect_timeout_secs = 3;
        core.backoff.max_attempts = Some(5);
        core.filter.min_level = Some("warn".to_owned());

        let config = AgentConfig::from_core(&core).unwrap();
        assert_eq!(config.watch_path, PathBuf::from("/tmp/service.log"));
        assert_eq!(config.start_position, StartPosition::Beginning);
        assert_eq!(config.watcher, WatcherKind::Poll);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.overflow, OverflowPolicy::DropOldest);
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.backoff.max_attempts, Some(5));
        assert_eq!(config.filter.min_level.as_deref(), Some("warn"));
        config.validate().unwrap();
    }

    #[test]
    fn from_core_rejects_unknown_enums() {
        let mut core = TailpostConfig::default();
        core.transport.overflow = "spill".to_owned();
        assert!(matches!(
            AgentConfig::from_core(&core),
            Err(AgentError::Config { .. })
        ));
    }

    #[test]
    fn tailer_options_follow_config() {
        let config = AgentConfigBuilder::new()
            .start_position(StartPosition::Beginning)
            .max_line_length(128)
            .build()
            .unwrap();
        let options = config.tailer_options();
        assert_eq!(options.start_position, StartPosition::Beginning);
        assert_eq!(options.max_line_length, 128);
    }

    #[test]
    fn builder_rejects_http_endpoint() {
        let err = AgentConfigBuilder::new()
            .endpoint("http://collector:9000")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("transport.endpoint"));
    }

    #[test]
    fn builder_accepts_wss_endpoint() {
        let config = AgentConfigBuilder::new()
            .endpoint("wss://collector.example.com/ingest")
            .build()
            .unwrap();
        assert_eq!(config.endpoint, "wss://collector.example.com/ingest");
    }

    #[test]
    fn builder_rejects_zero_queue() {
        assert!(AgentConfigBuilder::new().queue_capacity(0).build().is_err());
    }

    #[test]
    fn builder_rejects_directory_path() {
        assert!(AgentConfigBuilder::new().watch_path("/").build().is_err());
    }

    #[test]
    fn builder_rejects_invalid_backoff() {
        let policy = BackoffPolicy {
            jitter_factor: 1.5,
            ..BackoffPolicy::default()
        };
        assert!(AgentConfigBuilder::new().backoff(policy).build().is_err());
    }

    #[test]
    fn builder_rejects_bad_source_pattern() {
        let filter = FilterConfig {
            source_pattern: Some("(unclosed".to_owned()),
            ..FilterConfig::default()
        };
        let err = AgentConfigBuilder::new().filter(filter).build().unwrap_err();
        assert!(matches!(err, AgentError::Regex(_)));
    }
}
