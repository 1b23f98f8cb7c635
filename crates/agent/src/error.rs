//! 에이전트 에러 타입
//!
//! [`AgentError`]는 tail/파싱/필터/전송 경로에서 발생하는 모든 에러를 표현합니다.
//! `From<AgentError> for TailpostError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.

use tailpost_core::error::{ConfigError, PipelineError, TailpostError};

/// 에이전트 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// 감시 등록 실패 (상위 디렉토리 watch 불가)
    #[error("watch error: {path}: {reason}")]
    Watch {
        /// 감시 대상 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// drain 중 파일 열기/읽기 실패
    #[error("tail error: {path}: {reason}")]
    Tail {
        /// 대상 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 최대 재시도 횟수 소진
    #[error("retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// 연속 실패한 총 시도 횟수
        attempts: u32,
        /// 마지막 실패 사유
        last_error: String,
    },

    /// 이벤트 직렬화 실패
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 큐가 닫힌 뒤 push 시도
    #[error("event queue closed")]
    QueueClosed,

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<AgentError> for TailpostError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Config { field, reason } => {
                TailpostError::Config(ConfigError::InvalidValue { field, reason })
            }
            AgentError::Regex(e) => TailpostError::Config(ConfigError::InvalidValue {
                field: "filter.source_pattern".to_owned(),
                reason: e.to_string(),
            }),
            AgentError::Watch { .. } => {
                TailpostError::Pipeline(PipelineError::InitFailed(err.to_string()))
            }
            AgentError::QueueClosed => TailpostError::Pipeline(PipelineError::NotRunning),
            other => TailpostError::Pipeline(PipelineError::Fatal(other.to_string())),
        }
    }
}
