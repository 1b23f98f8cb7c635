//! 라인 파서 -- `[LEVEL] message` 관례를 `LogEvent`로 변환
//!
//! 지원하는 형식은 한 가지입니다. 줄 앞쪽(trim 후)이 `[`, 하나 이상의 단어 문자,
//! `]` 순서이면 괄호 안 토큰을 레벨로 해석합니다.
//!
//! | 입력                      | level | message          |
//! |---------------------------|-------|------------------|
//! | `[ERROR] disk full`       | ERROR | `disk full`      |
//! | `[warn]   slow query  `   | WARN  | `slow query`     |
//! | `[NOTICE] rotated`        | INFO  | `rotated`        |
//! | `plain text`              | INFO  | `plain text`     |
//! | `[] empty`                | INFO  | `[] empty`       |
//!
//! 파싱은 절대 실패하지 않습니다. 알 수 없는 레벨이나 형식은 INFO 로 처리합니다.

use tailpost_core::event::{LogEvent, LogLevel};

/// 한 줄의 원시 텍스트를 이벤트로 변환하는 파서
///
/// 상태가 없으므로 여러 태스크에서 공유해도 안전합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineParser;

impl LineParser {
    /// 새 파서를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    /// 원시 라인을 파싱합니다.
    ///
    /// 호출마다 새 UUID 와 현재 시각이 부여됩니다.
    pub fn parse(&self, raw: &str, source: &str) -> LogEvent {
        let line = raw.trim();
        let (level, message) = match split_level_prefix(line) {
            Some((token, rest)) => (
                LogLevel::from_str_loose(token).unwrap_or(LogLevel::Info),
                rest.trim(),
            ),
            None => (LogLevel::Info, line),
        };
        LogEvent::new(level, source, message)
    }
}

/// `[token]rest` 형태면 `(token, rest)`를 반환합니다.
fn split_level_prefix(line: &str) -> Option<(&str, &str)> {
    let inner = line.strip_prefix('[')?;
    let end = inner.find(']')?;
    let token = &inner[..end];
    if token.is_empty() || !token.chars().all(is_word_char) {
        return None;
    }
    Some((token, &inner[end + 1..]))
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
