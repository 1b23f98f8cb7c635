//! 에러 타입 -- 도메인별 에러 정의

/// Tailpost 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum TailpostError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 협력자(플러그인) 에러
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 처리 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,

    /// 복구 불가능한 실행 중 장애
    #[error("pipeline fatal: {0}")]
    Fatal(String),
}

/// 협력자 레지스트리 에러
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// 같은 이름이 이미 등록됨
    #[error("collaborator already registered: {name}")]
    AlreadyRegistered { name: String },

    /// 등록되지 않은 이름
    #[error("collaborator not found: {name}")]
    NotFound { name: String },

    /// 하트비트 콜백 실패
    #[error("collaborator '{name}' failed: {reason}")]
    CallbackFailed { name: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: TailpostError = ConfigError::InvalidValue {
            field: "watch.path".to_owned(),
            reason: "must not be empty".to_owned(),
        }
        .into();
        assert!(matches!(err, TailpostError::Config(_)));
        assert!(err.to_string().contains("watch.path"));
    }

    #[test]
    fn plugin_error_display() {
        let err = PluginError::CallbackFailed {
            name: "uptime".to_owned(),
            reason: "queue closed".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("uptime"));
        assert!(msg.contains("queue closed"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: TailpostError = io.into();
        assert!(matches!(err, TailpostError::Io(_)));
    }
}
