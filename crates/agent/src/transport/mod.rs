//! 전송 계층 -- 수집기와의 지속 연결, 재연결, 순서 보장 전송
//!
//! [`TransportSession`]은 큐에서 이벤트를 하나씩 꺼내 와이어 형식(JSON 한 객체)으로
//! 직렬화하고, 텍스트 프레임 하나로 보냅니다.
//!
//! # 재연결 규칙
//! - 연결/전송 실패 시 연결을 닫고 [`BackoffPolicy`] 지연만큼 기다린 뒤 재연결합니다.
//! - 연속 실패 횟수는 연결 성공 시 0으로 초기화됩니다.
//! - 전송에 실패한 이벤트는 보관했다가 재연결 후 가장 먼저 보냅니다 (유실/역순 없음).
//! - `max_attempts = M`이면 연속 M+1회 연결 실패 후 `RetriesExhausted`로 종료합니다.
//! - 직렬화 실패는 재시도하지 않고 즉시 치명적 에러로 종료합니다.
//! - 종료 요청은 이벤트 경계에서만 처리되며 프레임 중간에 끊지 않습니다.

mod websocket;

pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tailpost_core::event::LogEvent;
use tailpost_core::metrics as m;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::AgentError;
use crate::queue::EventQueue;

/// 단일 연결/전송 실패
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// 연결 수립 실패
    #[error("connect failed: {0}")]
    Connect(String),

    /// 프레임 전송 실패
    #[error("send failed: {0}")]
    Send(String),

    /// 상대가 연결을 닫음
    #[error("connection closed")]
    Closed,
}

/// 열린 연결
pub trait Connection: Send {
    /// 텍스트 프레임 하나를 보냅니다.
    fn send_text(&mut self, text: String) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// 연결을 닫습니다. 실패는 무시됩니다.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// 연결 생성기
pub trait Connector: Send + Sync {
    /// 생성되는 연결 타입
    type Conn: Connection;

    /// 수집기에 연결합니다.
    fn connect(&self) -> impl Future<Output = Result<Self::Conn, TransportError>> + Send;

    /// 대상 주소 (로그용)
    fn endpoint(&self) -> &str;
}

/// 세션 통계 (태스크 간 공유)
#[derive(Debug, Default)]
pub struct TransportStats {
    connected: AtomicBool,
    events_sent: AtomicU64,
    connect_attempts: AtomicU64,
    connect_failures: AtomicU64,
    reconnects: AtomicU64,
}

impl TransportStats {
    /// 현재 연결 여부
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// 전송 완료 이벤트 수
    pub fn events_sent(&self) -> u64 {
        self.events_sent.load(Ordering::Relaxed)
    }

    /// 연결 시도 수
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    /// 연결 실패 수
    pub fn connect_failures(&self) -> u64 {
        self.connect_failures.load(Ordering::Relaxed)
    }

    /// 연결 끊김 후 재연결 성공 수
    pub fn reconnects(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
        metrics::gauge!(m::TRANSPORT_CONNECTED).set(if connected { 1.0 } else { 0.0 });
    }
}

/// 재연결 전송 세션
pub struct TransportSession<C> {
    connector: C,
    policy: BackoffPolicy,
    stats: Arc<TransportStats>,
}

impl<C: Connector> TransportSession<C> {
    /// 새 세션을 생성합니다.
    pub fn new(connector: C, policy: BackoffPolicy) -> Self {
        Self {
            connector,
            policy,
            stats: Arc::new(TransportStats::default()),
        }
    }

    /// 공유 통계 핸들
    pub fn stats(&self) -> Arc<TransportStats> {
        Arc::clone(&self.stats)
    }

    /// 큐가 닫히거나 취소될 때까지 이벤트를 전송합니다.
    ///
    /// 정상 종료 시 `Ok(())`, 재시도 소진 또는 직렬화 실패 시 에러를 반환합니다.
    pub async fn run(
        self,
        queue: Arc<EventQueue>,
        cancel: CancellationToken,
    ) -> Result<(), AgentError> {
        let endpoint = self.connector.endpoint().to_owned();
        let mut pending: Option<LogEvent> = None;
        let mut failures: u32 = 0;
        let mut ever_connected = false;

        'session: loop {
            if cancel.is_cancelled() {
                break;
            }

            self.stats.connect_attempts.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::TRANSPORT_CONNECT_ATTEMPTS_TOTAL).increment(1);

            let connected = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.connector.connect() => result,
            };

            let mut conn = match connected {
                Ok(conn) => conn,
                Err(e) => {
                    failures = failures.saturating_add(1);
                    self.stats.connect_failures.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(m::TRANSPORT_CONNECT_FAILURES_TOTAL).increment(1);

                    if self.policy.is_exhausted(failures) {
                        error!(
                            endpoint = %endpoint,
                            attempts = failures,
                            error = %e,
                            "connect retries exhausted"
                        );
                        return Err(AgentError::RetriesExhausted {
                            attempts: failures,
                            last_error: e.to_string(),
                        });
                    }

                    let delay = self.policy.delay_for_attempt(failures - 1);
                    warn!(
                        endpoint = %endpoint,
                        attempt = failures,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "connect failed, backing off"
                    );
                    if !sleep_or_cancel(delay, &cancel).await {
                        break;
                    }
                    continue;
                }
            };

            if ever_connected {
                self.stats.reconnects.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::TRANSPORT_RECONNECTS_TOTAL).increment(1);
            }
            ever_connected = true;
            failures = 0;
            self.stats.set_connected(true);
            info!(endpoint = %endpoint, "connected to collector");

            loop {
                let event = match pending.take() {
                    Some(event) => event,
                    None => {
                        let next = tokio::select! {
                            biased;
                            _ = cancel.cancelled() => None,
                            next = queue.pop() => next,
                        };
                        match next {
                            Some(event) => event,
                            None => {
                                conn.close().await;
                                break 'session;
                            }
                        }
                    }
                };

                let text = match event.to_wire() {
                    Ok(text) => text,
                    Err(e) => {
                        error!(event_id = event.id(), error = %e, "event serialization failed");
                        conn.close().await;
                        self.stats.set_connected(false);
                        return Err(AgentError::Serialize(e));
                    }
                };

                match conn.send_text(text).await {
                    Ok(()) => {
                        self.stats.events_sent.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!(m::TRANSPORT_EVENTS_SENT_TOTAL).increment(1);
                    }
                    Err(e) => {
                        warn!(
                            endpoint = %endpoint,
                            event_id = event.id(),
                            error = %e,
                            "send failed, reconnecting"
                        );
                        pending = Some(event);
                        conn.close().await;
                        self.stats.set_connected(false);

                        let delay = self.policy.delay_for_attempt(0);
                        if !sleep_or_cancel(delay, &cancel).await {
                            break 'session;
                        }
                        continue 'session;
                    }
                }
            }
        }

        if let Some(event) = pending {
            debug!(event_id = event.id(), "session stopped with unsent event");
        }
        self.stats.set_connected(false);
        info!(endpoint = %endpoint, "transport session stopped");
        Ok(())
    }
}

/// 지연만큼 기다립니다. 취소되면 `false`를 반환합니다.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    metrics::histogram!(m::TRANSPORT_BACKOFF_DELAY_SECONDS).record(delay.as_secs_f64());
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
