//! 이벤트 필터 -- 심각도 / source 패턴 / 메시지 부분 문자열
//!
//! 세 종류의 술어는 서로 독립적이며 호출 순서대로 적용됩니다.
//! 어떤 단계도 이벤트를 수정하지 않고 통과 여부만 결정합니다.
//!
//! 두 가지 조합 방식을 제공합니다.
//!
//! - [`EventFilterExt`]: 임의의 `Iterator<Item = LogEvent>`에 붙는 정적 어댑터
//! - [`FilterChain`]: 설정에서 만들어지는 단계 목록 (enum, 동적 디스패치 없음)
//!
//! # 사용 예시
//! ```ignore
//! use tailpost_agent::filter::{EventFilterExt, SourcePattern};
//!
//! let kept: Vec<_> = events
//!     .into_iter()
//!     .min_severity(LogLevel::Warn)
//!     .source_pattern(SourcePattern::new(r".*/app\.log")?)
//!     .message_contains("disk")
//!     .collect();
//! ```

use regex::Regex;
use tailpost_core::config::FilterConfig;
use tailpost_core::event::{LogEvent, LogLevel};

use crate::error::AgentError;

/// source 전체 일치 정규식
///
/// 패턴은 `^(?:...)$`로 감싸 컴파일되므로 부분 일치는 통과하지 않습니다.
#[derive(Debug, Clone)]
pub struct SourcePattern {
    source: String,
    regex: Regex,
}

impl SourcePattern {
    /// 패턴을 컴파일합니다.
    pub fn new(pattern: &str) -> Result<Self, AgentError> {
        let regex = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self {
            source: pattern.to_owned(),
            regex,
        })
    }

    /// 원본 패턴 문자열
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// 문자열 전체가 패턴과 일치하는지 확인합니다.
    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// 단일 필터 단계
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// `level >= threshold`인 이벤트만 통과
    MinSeverity(LogLevel),
    /// source 가 패턴과 전체 일치하는 이벤트만 통과
    SourcePattern(SourcePattern),
    /// 메시지에 부분 문자열이 포함된 이벤트만 통과 (소문자로 보관)
    MessageContains(String),
}

impl EventFilter {
    /// 최소 심각도 필터
    pub fn min_severity(level: LogLevel) -> Self {
        Self::MinSeverity(level)
    }

    /// source 패턴 필터. 패턴이 잘못되면 에러를 반환합니다.
    pub fn source_pattern(pattern: &str) -> Result<Self, AgentError> {
        SourcePattern::new(pattern).map(Self::SourcePattern)
    }

    /// 대소문자 무시 부분 문자열 필터. 빈 문자열은 모든 이벤트를 통과시킵니다.
    pub fn message_contains(needle: &str) -> Self {
        Self::MessageContains(needle.to_lowercase())
    }

    /// 이벤트가 이 단계를 통과하는지 확인합니다.
    pub fn matches(&self, event: &LogEvent) -> bool {
        match self {
            Self::MinSeverity(threshold) => event.level() >= *threshold,
            Self::SourcePattern(pattern) => pattern.is_match(event.source()),
            Self::MessageContains(needle) => {
                needle.is_empty() || event.message().to_lowercase().contains(needle.as_str())
            }
        }
    }
}

/// 순서가 있는 필터 단계 목록
///
/// 단계가 없으면 모든 이벤트가 통과합니다.
#[derive(Debug, Clone, Default)]
pub struct FilterChain {
    stages: Vec<EventFilter>,
}

impl FilterChain {
    /// 빈 체인을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 단계를 뒤에 추가합니다.
    pub fn with(mut self, filter: EventFilter) -> Self {
        self.stages.push(filter);
        self
    }

    /// core 필터 설정에서 체인을 생성합니다.
    ///
    /// 거절이 싼 순서(심각도 → 부분 문자열 → 정규식)로 배치합니다.
    pub fn from_config(config: &FilterConfig) -> Result<Self, AgentError> {
        let mut chain = Self::new();
        if let Some(level) = &config.min_level {
            let level = LogLevel::from_str_loose(level).ok_or_else(|| AgentError::Config {
                field: "filter.min_level".to_owned(),
                reason: format!("unknown level '{level}'"),
            })?;
            chain = chain.with(EventFilter::min_severity(level));
        }
        if let Some(needle) = &config.message_contains {
            chain = chain.with(EventFilter::message_contains(needle));
        }
        if let Some(pattern) = &config.source_pattern {
            chain = chain.with(EventFilter::source_pattern(pattern)?);
        }
        Ok(chain)
    }

    /// 모든 단계를 통과하는지 확인합니다.
    pub fn matches(&self, event: &LogEvent) -> bool {
        self.stages.iter().all(|stage| stage.matches(event))
    }

    /// 단계 수
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// 단계가 없는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// 이벤트 이터레이터용 정적 필터 어댑터
pub trait EventFilterExt: Iterator<Item = LogEvent> + Sized {
    /// `level` 이상인 이벤트만 남깁니다.
    fn min_severity(self, level: LogLevel) -> Filtered<Self> {
        Filtered::new(self, EventFilter::min_severity(level))
    }

    /// source 가 패턴과 전체 일치하는 이벤트만 남깁니다.
    fn source_pattern(self, pattern: SourcePattern) -> Filtered<Self> {
        Filtered::new(self, EventFilter::SourcePattern(pattern))
    }

    /// 메시지에 `needle`이 포함된 이벤트만 남깁니다 (대소문자 무시).
    fn message_contains(self, needle: &str) -> Filtered<Self> {
        Filtered::new(self, EventFilter::message_contains(needle))
    }

    /// 체인 전체를 적용합니다.
    fn filter_chain(self, chain: &FilterChain) -> ChainFiltered<'_, Self> {
        ChainFiltered { inner: self, chain }
    }
}

impl<I: Iterator<Item = LogEvent>> EventFilterExt for I {}

/// 단일 단계 어댑터
#[derive(Debug, Clone)]
pub struct Filtered<I> {
    inner: I,
    filter: EventFilter,
}

impl<I> Filtered<I> {
    fn new(inner: I, filter: EventFilter) -> Self {
        Self { inner, filter }
    }
}

impl<I: Iterator<Item = LogEvent>> Iterator for Filtered<I> {
    type Item = LogEvent;

    fn next(&mut self) -> Option<LogEvent> {
        let filter = &self.filter;
        self.inner.by_ref().find(|event| filter.matches(event))
    }
}

/// 체인 어댑터
#[derive(Debug)]
pub struct ChainFiltered<'a, I> {
    inner: I,
    chain: &'a FilterChain,
}

impl<I: Iterator<Item = LogEvent>> Iterator for ChainFiltered<'_, I> {
    type Item = LogEvent;

    fn next(&mut self) -> Option<LogEvent> {
        let chain = self.chain;
        self.inner.by_ref().find(|event| chain.matches(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(level: LogLevel, source: &str, message: &str) -> LogEvent {
        LogEvent::new(level, source, message)
    }

    fn sample() -> Vec<LogEvent> {
        vec![
            event(LogLevel::Debug, "/var/log/app.log", "cache warm"),
            event(LogLevel::Warn, "/var/log/app.log", "Disk usage 91%"),
            event(LogLevel::Error, "/var/log/db.log", "disk full"),
            event(LogLevel::Fatal, "/var/log/app.log", "out of memory"),
            event(LogLevel::Error, "uptime", "DISK check failed"),
        ]
    }

    fn messages(events: impl Iterator<Item = LogEvent>) -> Vec<String> {
        events.map(|e| e.message().to_owned()).collect()
    }

    #[test]
    fn min_severity_keeps_at_or_above() {
        let kept = messages(sample().into_iter().min_severity(LogLevel::Error));
        assert_eq!(kept, vec!["disk full", "out of memory", "DISK check failed"]);
    }

    #[test]
    fn source_pattern_requires_full_match() {
        let pattern = SourcePattern::new(r".*/app\.log").unwrap();
        let kept: Vec<_> = sample().into_iter().source_pattern(pattern).collect();
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(|e| e.source() == "/var/log/app.log"));

        // 부분 일치는 거절
        let partial = SourcePattern::new("app").unwrap();
        assert!(!partial.is_match("/var/log/app.log"));
        assert!(partial.is_match("app"));
    }

    #[test]
    fn alternation_is_anchored_as_a_whole() {
        let pattern = SourcePattern::new("uptime|/var/log/db.log").unwrap();
        assert!(pattern.is_match("uptime"));
        assert!(pattern.is_match("/var/log/db.log"));
        assert!(!pattern.is_match("uptime-extra"));
        assert!(!pattern.is_match("x/var/log/db.log"));
    }

    #[test]
    fn message_contains_is_case_insensitive() {
        let kept = messages(sample().into_iter().message_contains("disk"));
        assert_eq!(kept, vec!["Disk usage 91%", "disk full", "DISK check failed"]);
    }

    #[test]
    fn empty_substring_matches_everything() {
        assert_eq!(sample().into_iter().message_contains("").count(), 5);
    }

    #[test]
    fn adapters_chain_in_call_order() {
        let kept = messages(
            sample()
                .into_iter()
                .min_severity(LogLevel::Warn)
                .source_pattern(SourcePattern::new(r".*\.log").unwrap())
                .message_contains("DISK"),
        );
        assert_eq!(kept, vec!["Disk usage 91%", "disk full"]);
    }

    #[test]
    fn filtering_preserves_order_and_identity() {
        let input = sample();
        let ids: Vec<_> = input.iter().map(|e| e.id().to_owned()).collect();
        let kept: Vec<_> = input.clone().into_iter().min_severity(LogLevel::Trace).collect();
        assert_eq!(kept, input);
        assert_eq!(kept.iter().map(|e| e.id()).collect::<Vec<_>>(), ids);
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let err = EventFilter::source_pattern("(unclosed").unwrap_err();
        assert!(matches!(err, AgentError::Regex(_)));
    }

    #[test]
    fn empty_chain_accepts_all() {
        let chain = FilterChain::new();
        assert!(chain.is_empty());
        assert_eq!(sample().into_iter().filter_chain(&chain).count(), 5);
    }

    #[test]
    fn chain_from_config() {
        let config = FilterConfig {
            min_level: Some("error".to_owned()),
            source_pattern: Some(r"/var/log/.*".to_owned()),
            message_contains: Some("Disk".to_owned()),
        };
        let chain = FilterChain::from_config(&config).unwrap();
        assert_eq!(chain.len(), 3);
        let kept = messages(sample().into_iter().filter_chain(&chain));
        assert_eq!(kept, vec!["disk full"]);
    }

    #[test]
    fn chain_from_config_rejects_unknown_level() {
        let config = FilterConfig {
            min_level: Some("LOUD".to_owned()),
            ..Default::default()
        };
        let err = FilterChain::from_config(&config).unwrap_err();
        assert!(matches!(err, AgentError::Config { .. }));
    }

    #[test]
    fn chain_from_default_config_is_empty() {
        let chain = FilterChain::from_config(&FilterConfig::default()).unwrap();
        assert!(chain.is_empty());
    }
}
