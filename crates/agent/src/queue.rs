//! 전송 대기 큐 -- 생산자(tail/발행기)와 소비자(전송 세션) 사이의 bounded 버퍼
//!
//! [`EventQueue`]는 파이프라인에서 유일하게 공유되는 가변 자원입니다.
//! 생산자는 여럿(파일 tail 경로, 컨텍스트 발행기)일 수 있고 소비자는
//! [`TransportSession`](crate::transport::TransportSession) 하나입니다.
//!
//! # 오버플로 정책
//! 큐가 가득 찬 경우:
//! - [`OverflowPolicy::Block`]: 자리가 날 때까지 생산자를 대기시킴 (기본값)
//! - [`OverflowPolicy::DropOldest`]: 가장 오래된 이벤트를 드롭하고 새 이벤트를 넣음
//! - [`OverflowPolicy::DropNewest`]: 새 이벤트를 거부
//!
//! 드롭은 [`EventQueue::dropped_count`]와 메트릭으로 관측됩니다.

use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tailpost_core::event::LogEvent;
use tailpost_core::metrics as m;
use tokio::sync::Notify;

use crate::error::AgentError;

/// 큐 오버플로 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// 생산자를 대기시킴 (백프레셔 전파)
    #[default]
    Block,
    /// 가장 오래된 이벤트를 드롭
    DropOldest,
    /// 새 이벤트를 드롭
    DropNewest,
}

impl OverflowPolicy {
    /// 설정 파일에서 사용하는 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::DropOldest => "drop_oldest",
            Self::DropNewest => "drop_newest",
        }
    }
}

impl fmt::Display for OverflowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverflowPolicy {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(Self::Block),
            "drop_oldest" => Ok(Self::DropOldest),
            "drop_newest" => Ok(Self::DropNewest),
            other => Err(AgentError::Config {
                field: "transport.overflow".to_owned(),
                reason: format!("unknown overflow policy '{other}'"),
            }),
        }
    }
}

/// push 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// 그대로 큐에 들어감
    Enqueued,
    /// 들어갔지만 가장 오래된 이벤트 하나가 밀려남
    DisplacedOldest,
    /// 큐가 가득 차 새 이벤트가 거부됨
    Rejected,
}

struct Inner {
    items: VecDeque<LogEvent>,
    closed: bool,
}

/// bounded 비동기 이벤트 큐
pub struct EventQueue {
    inner: Mutex<Inner>,
    capacity: usize,
    policy: OverflowPolicy,
    not_empty: Notify,
    not_full: Notify,
    dropped: AtomicU64,
    enqueued: AtomicU64,
}

impl EventQueue {
    /// 새 큐를 생성합니다. `capacity`는 최소 1로 보정됩니다.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity.min(10_000)),
                closed: false,
            }),
            capacity,
            policy,
            not_empty: Notify::new(),
            not_full: Notify::new(),
            dropped: AtomicU64::new(0),
            enqueued: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 이벤트를 넣습니다.
    ///
    /// `Block` 정책에서는 자리가 날 때까지 대기합니다.
    /// 큐가 닫혀 있으면 `QueueClosed`를 반환합니다.
    pub async fn push(&self, event: LogEvent) -> Result<PushOutcome, AgentError> {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if inner.closed {
                    return Err(AgentError::QueueClosed);
                }

                if inner.items.len() < self.capacity {
                    inner.items.push_back(event);
                    let depth = inner.items.len();
                    drop(inner);
                    self.record_enqueued(depth);
                    return Ok(PushOutcome::Enqueued);
                }

                match self.policy {
                    OverflowPolicy::DropOldest => {
                        inner.items.pop_front();
                        inner.items.push_back(event);
                        let depth = inner.items.len();
                        drop(inner);
                        self.record_dropped("drop_oldest", "queue full, dropped oldest event");
                        self.record_enqueued(depth);
                        return Ok(PushOutcome::DisplacedOldest);
                    }
                    OverflowPolicy::DropNewest => {
                        drop(inner);
                        self.record_dropped("drop_newest", "queue full, rejected new event");
                        return Ok(PushOutcome::Rejected);
                    }
                    OverflowPolicy::Block => {}
                }
            }

            tracing::trace!(capacity = self.capacity, "queue full, producer waiting");
            notified.await;
        }
    }

    /// 가장 오래된 이벤트를 꺼냅니다.
    ///
    /// 비어 있으면 대기합니다. 닫힌 뒤 남은 이벤트를 모두 꺼내면 `None`을 반환합니다.
    pub async fn pop(&self) -> Option<LogEvent> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.lock();
                if let Some(event) = inner.items.pop_front() {
                    let depth = inner.items.len();
                    drop(inner);
                    self.not_full.notify_one();
                    metrics::gauge!(m::QUEUE_DEPTH).set(depth as f64);
                    return Some(event);
                }
                if inner.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// 큐를 닫습니다. 대기 중인 생산자/소비자를 모두 깨웁니다.
    pub fn close(&self) {
        self.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// 닫혔는지 확인합니다.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// 현재 대기 중인 이벤트 수
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// 최대 용량
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 오버플로 정책
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// 지금까지 드롭된 이벤트 수
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// 지금까지 큐에 들어간 이벤트 수
    pub fn enqueued_count(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// 사용률을 0.0~1.0 범위로 반환합니다.
    pub fn utilization(&self) -> f64 {
        f64::from(u32::try_from(self.len()).unwrap_or(u32::MAX))
            / f64::from(u32::try_from(self.capacity).unwrap_or(u32::MAX))
    }

    fn record_enqueued(&self, depth: usize) {
        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.not_empty.notify_one();
        metrics::counter!(m::QUEUE_EVENTS_ENQUEUED_TOTAL).increment(1);
        metrics::gauge!(m::QUEUE_DEPTH).set(depth as f64);
    }

    fn record_dropped(&self, reason: &'static str, message: &'static str) {
        let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        metrics::counter!(m::QUEUE_EVENTS_DROPPED_TOTAL, m::LABEL_REASON => reason).increment(1);
        tracing::warn!(dropped, capacity = self.capacity, policy = reason, "{message}");
    }
}

impl fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("policy", &self.policy)
            .field("dropped", &self.dropped_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use tailpost_core::event::LogLevel;

    fn event(msg: &str) -> LogEvent {
        LogEvent::new(LogLevel::Info, "test", msg)
    }

    #[tokio::test]
    async fn push_and_pop_in_order() {
        let queue = EventQueue::new(10, OverflowPolicy::Block);
        for i in 0..3 {
            queue.push(event(&format!("e{i}"))).await.unwrap();
        }
        assert_eq!(queue.len(), 3);
        for i in 0..3 {
            assert_eq!(queue.pop().await.unwrap().message(), format!("e{i}"));
        }
        assert!(queue.is_empty());
        assert_eq!(queue.enqueued_count(), 3);
    }

    #[tokio::test]
    async fn drop_oldest_displaces_front() {
        let queue = EventQueue::new(2, OverflowPolicy::DropOldest);
        queue.push(event("a")).await.unwrap();
        queue.push(event("b")).await.unwrap();
        let outcome = queue.push(event("c")).await.unwrap();
        assert_eq!(outcome, PushOutcome::DisplacedOldest);
        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.pop().await.unwrap().message(), "b");
        assert_eq!(queue.pop().await.unwrap().message(), "c");
    }

    #[tokio::test]
    async fn drop_newest_rejects_incoming() {
        let queue = EventQueue::new(2, OverflowPolicy::DropNewest);
        queue.push(event("a")).await.unwrap();
        queue.push(event("b")).await.unwrap();
        let outcome = queue.push(event("c")).await.unwrap();
        assert_eq!(outcome, PushOutcome::Rejected);
        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pop().await.unwrap().message(), "a");
    }

    #[tokio::test]
    async fn block_waits_for_space() {
        let queue = Arc::new(EventQueue::new(1, OverflowPolicy::Block));
        queue.push(event("first")).await.unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(event("second")).await })
        };

        // 자리가 없으므로 생산자는 아직 완료되지 않아야 함
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.dropped_count(), 0);

        assert_eq!(queue.pop().await.unwrap().message(), "first");
        let outcome = producer.await.unwrap().unwrap();
        assert_eq!(outcome, PushOutcome::Enqueued);
        assert_eq!(queue.pop().await.unwrap().message(), "second");
    }

    #[tokio::test]
    async fn pop_waits_for_push() {
        let queue = Arc::new(EventQueue::new(4, OverflowPolicy::Block));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(event("late")).await.unwrap();
        let popped = consumer.await.unwrap().unwrap();
        assert_eq!(popped.message(), "late");
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let queue = EventQueue::new(4, OverflowPolicy::Block);
        queue.push(event("left")).await.unwrap();
        queue.close();
        assert!(queue.is_closed());
        assert!(matches!(
            queue.push(event("late")).await,
            Err(AgentError::QueueClosed)
        ));
        assert_eq!(queue.pop().await.unwrap().message(), "left");
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn close_wakes_blocked_consumer() {
        let queue = Arc::new(EventQueue::new(4, OverflowPolicy::Block));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();
        assert!(consumer.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_wakes_blocked_producer() {
        let queue = Arc::new(EventQueue::new(1, OverflowPolicy::Block));
        queue.push(event("full")).await.unwrap();
        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.push(event("blocked")).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();
        assert!(matches!(
            producer.await.unwrap(),
            Err(AgentError::QueueClosed)
        ));
    }

    #[test]
    fn utilization_calculation() {
        let queue = EventQueue::new(4, OverflowPolicy::Block);
        assert_eq!(queue.utilization(), 0.0);
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(async {
            queue.push(event("a")).await.unwrap();
            queue.push(event("b")).await.unwrap();
        });
        assert!((queue.utilization() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let queue = EventQueue::new(0, OverflowPolicy::DropNewest);
        assert_eq!(queue.capacity(), 1);
    }

    #[test]
    fn overflow_policy_parse() {
        assert_eq!("block".parse::<OverflowPolicy>().unwrap(), OverflowPolicy::Block);
        assert_eq!(
            "drop_oldest".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::DropOldest
        );
        assert_eq!(
            "drop_newest".parse::<OverflowPolicy>().unwrap(),
            OverflowPolicy::DropNewest
        );
        assert!("drop_random".parse::<OverflowPolicy>().is_err());
        assert_eq!(OverflowPolicy::default(), OverflowPolicy::Block);
        assert_eq!(OverflowPolicy::DropOldest.to_string(), "drop_oldest");
    }
}
