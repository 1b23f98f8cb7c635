//! 이벤트 모델 -- 수집기에서 전송 계층까지 흐르는 기본 단위
//!
//! [`LogEvent`]는 한 줄의 로그(또는 외부 협력자가 발행한 컨텍스트 메시지)를
//! 표현하는 불변 레코드입니다. 생성 후에는 수정 API가 없으며,
//! 전송되거나 백프레셔로 드롭될 때까지만 존재합니다.
//!
//! # 와이어 형식
//! 전송 계층은 이벤트 하나를 JSON 객체 하나로 직렬화하여
//! WebSocket 텍스트 프레임 하나에 담습니다.
//!
//! ```text
//! {"id":"..","timestamp":"2024-01-15T12:00:00.123456Z","level":"ERROR",
//!  "source":"/var/log/app.log","message":"disk full","metadata":{}}
//! ```
//!
//! 여섯 개 필드는 항상 존재하며, `metadata`는 비어 있어도 `{}`로 직렬화됩니다.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- 메타데이터 키 상수 ---

/// 컨텍스트 메시지의 원문 전체를 담는 메타데이터 키
pub const METADATA_KEY_SNAPSHOT: &str = "snapshot";
/// 이벤트 종류를 담는 메타데이터 키
pub const METADATA_KEY_TYPE: &str = "type";
/// 발행기가 생성한 컨텍스트 이벤트의 `type` 값
pub const EVENT_TYPE_CONTEXT: &str = "context";

/// 로그 심각도
///
/// 선언 순서가 곧 심각도 순서입니다 (`Trace < Debug < Info < Warn < Error < Fatal`).
/// 최소 심각도 필터가 이 순서에 의존합니다.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// 가장 상세한 추적 로그
    Trace,
    /// 디버그 로그
    Debug,
    /// 일반 정보 (파싱 실패 시 기본값)
    #[default]
    Info,
    /// 경고
    Warn,
    /// 에러
    Error,
    /// 치명적 장애
    Fatal,
}

impl LogLevel {
    /// 모든 레벨 (심각도 오름차순)
    pub const ALL: [LogLevel; 6] = [
        Self::Trace,
        Self::Debug,
        Self::Info,
        Self::Warn,
        Self::Error,
        Self::Fatal,
    ];

    /// 문자열에서 레벨을 파싱합니다.
    ///
    /// 대소문자를 구분하지 않으며, 여섯 개 이름과 정확히 일치해야 합니다.
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TRACE" => Some(Self::Trace),
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARN" => Some(Self::Warn),
            "ERROR" => Some(Self::Error),
            "FATAL" => Some(Self::Fatal),
            _ => None,
        }
    }

    /// 와이어 형식에서 사용하는 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 구조화된 로그 이벤트
///
/// 라인 파서 또는 컨텍스트 발행기가 생성합니다.
/// 필드는 읽기 전용 접근자로만 노출됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    id: String,
    timestamp: DateTime<Utc>,
    level: LogLevel,
    source: String,
    message: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl LogEvent {
    /// 새 UUID v4 ID와 현재 시각으로 이벤트를 생성합니다.
    pub fn new(level: LogLevel, source: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), level, source, message)
    }

    /// 지정한 ID로 이벤트를 생성합니다. 타임스탬프는 현재 시각입니다.
    pub fn with_id(
        id: impl Into<String>,
        level: LogLevel,
        source: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            timestamp: Utc::now(),
            level,
            source: source.into(),
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    /// 타임스탬프를 교체한 이벤트를 반환합니다.
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 메타데이터 항목을 추가한 이벤트를 반환합니다.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 이벤트 고유 ID
    pub fn id(&self) -> &str {
        &self.id
    }

    /// 이벤트 생성 시각 (UTC)
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// 심각도
    pub fn level(&self) -> LogLevel {
        self.level
    }

    /// 원본 파일 경로 또는 논리적 생산자 이름
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 한 줄 메시지 (trim 완료)
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 부가 메타데이터 (비어 있을 수 있음)
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    /// 와이어 형식(JSON 한 객체)으로 직렬화합니다.
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// 와이어 형식에서 이벤트를 복원합니다.
    pub fn from_wire(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LogEvent[{}] level={} source={} message={}",
            self.id.get(..8).unwrap_or(&self.id),
            self.level,
            self.source,
            self.message,
        )
    }
}
