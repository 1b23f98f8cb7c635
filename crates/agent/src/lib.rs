#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`tailer`]: 파일 감시 상태 기계, 플랫폼 watcher, 라인 스트림
//! - [`parser`]: `[LEVEL] message` 라인 파서
//! - [`filter`]: 심각도 / source 패턴 / 메시지 부분 문자열 필터
//! - [`queue`]: 필터와 전송 사이 bounded 큐 (오버플로 정책)
//! - [`backoff`]: 지수 백오프 + 지터 정책
//! - [`transport`]: 재연결 전송 세션과 WebSocket 커넥터
//! - [`publisher`]: 협력자용 컨텍스트 발행기
//! - [`agent`]: 전체 오케스트레이션 (Pipeline trait 구현)
//! - [`config`]: 에이전트 설정 (core 설정 변환)
//! - [`error`]: 도메인 에러 타입

pub mod agent;
pub mod backoff;
pub mod config;
pub mod error;
pub mod filter;
pub mod parser;
pub mod publisher;
pub mod queue;

pub mod tailer;
pub mod transport;

// --- 주요 타입 re-export ---

// 에이전트
pub use agent::{AgentStats, TailAgent, TailAgentBuilder};

// 설정
pub use config::{AgentConfig, AgentConfigBuilder};

// 에러
pub use error::AgentError;

// 백오프
pub use backoff::BackoffPolicy;

// 파서
pub use parser::LineParser;

// 필터
pub use filter::{EventFilter, EventFilterExt, FilterChain, SourcePattern};

// 큐
pub use queue::{EventQueue, OverflowPolicy, PushOutcome};

// tail
pub use tailer::{FileTailer, StartPosition, TailStream, TailerOptions, TailerState, WatcherKind};

// 전송
pub use transport::{
    Connection, Connector, TransportError, TransportSession, TransportStats, WebSocketConnector,
};

// 발행기
pub use publisher::Publisher;
