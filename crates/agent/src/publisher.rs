//! 컨텍스트 발행기 -- 외부 협력자가 보낸 텍스트를 파일 이벤트와 같은 경로로 전달
//!
//! 발행된 이벤트는 다음 규칙을 따릅니다.
//! - `message`: 텍스트의 첫 줄 (trim)
//! - `metadata["snapshot"]`: 원문 전체
//! - `metadata["type"]`: `"context"`
//! - `id`: 발행기마다 1부터 단조 증가하는 카운터
//!
//! 동시 발행은 id 부여부터 큐 삽입까지 직렬화되므로 큐 안의 순서가 id 순서와 같습니다.
//!
//! 필터를 통과하지 못한 이벤트도 호출자에게는 반환되지만 큐에는 들어가지 않습니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tailpost_core::error::TailpostError;
use tailpost_core::event::{
    EVENT_TYPE_CONTEXT, LogEvent, LogLevel, METADATA_KEY_SNAPSHOT, METADATA_KEY_TYPE,
};
use tailpost_core::metrics as m;
use tailpost_core::pipeline::BoxFuture;
use tailpost_core::plugin::ContextPublisher;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::AgentError;
use crate::filter::FilterChain;
use crate::queue::{EventQueue, PushOutcome};

/// 기본 source 레이블
pub const DEFAULT_CONTEXT_SOURCE: &str = "context";

/// 필터/큐 경로에 연결된 [`ContextPublisher`] 구현
#[derive(Debug)]
pub struct Publisher {
    source: String,
    next_id: AtomicU64,
    /// id 부여와 큐 삽입을 한 단위로 묶음
    ordering: Mutex<()>,
    filters: Arc<FilterChain>,
    queue: Arc<EventQueue>,
}

impl Publisher {
    /// 새 발행기를 생성합니다.
    pub fn new(queue: Arc<EventQueue>, filters: Arc<FilterChain>) -> Self {
        Self {
            source: DEFAULT_CONTEXT_SOURCE.to_owned(),
            next_id: AtomicU64::new(1),
            ordering: Mutex::new(()),
            filters,
            queue,
        }
    }

    /// source 레이블을 바꿉니다.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// 발행 시 사용하는 source 레이블
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 텍스트로 컨텍스트 이벤트를 만듭니다 (큐에 넣지 않음).
    pub fn build_event(&self, text: &str) -> LogEvent {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let message = text.lines().next().unwrap_or("").trim();
        LogEvent::with_id(id.to_string(), LogLevel::Info, self.source.as_str(), message)
            .with_metadata(METADATA_KEY_SNAPSHOT, text)
            .with_metadata(METADATA_KEY_TYPE, EVENT_TYPE_CONTEXT)
    }

    /// 이벤트를 만들고 필터를 통과하면 큐에 넣습니다.
    pub async fn publish_event(&self, text: &str) -> Result<LogEvent, AgentError> {
        // 가득 찬 큐에서 대기하는 동안에도 잠금 유지
        let _turn = self.ordering.lock().await;
        let event = self.build_event(text);

        if !self.filters.matches(&event) {
            metrics::counter!(m::FILTER_EVENTS_REJECTED_TOTAL, m::LABEL_LEVEL => event.level().as_str())
                .increment(1);
            debug!(event_id = event.id(), "context event filtered out");
            return Ok(event);
        }

        match self.queue.push(event.clone()).await? {
            PushOutcome::Rejected => {
                debug!(event_id = event.id(), "context event dropped by full queue");
            }
            PushOutcome::Enqueued | PushOutcome::DisplacedOldest => {}
        }
        Ok(event)
    }
}

impl ContextPublisher for Publisher {
    fn publish<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<LogEvent, TailpostError>> {
        Box::pin(async move { self.publish_event(text).await.map_err(TailpostError::from) })
    }
}
