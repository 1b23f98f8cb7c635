//! 에이전트 오케스트레이션 -- tail/파싱/필터/큐/전송의 전체 흐름을 관리합니다.
//!
//! [`TailAgent`]는 core의 [`Pipeline`] trait을 구현하여 `tailpost-daemon`에서
//! start/stop/health_check 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! FileTailer ─lines─▶ ingest(LineParser → FilterChain) ─▶ EventQueue ─▶ TransportSession ─▶ collector
//!                                                            ▲
//!                          Publisher (collaborators) ────────┘
//! ```
//!
//! 세 개의 백그라운드 태스크(tailer, ingest, session)는 하나의
//! [`CancellationToken`]을 공유합니다. 복구 불가 에러는 fatal 채널로 보고됩니다.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tailpost_core::error::{PipelineError, TailpostError};
use tailpost_core::metrics as m;
use tailpost_core::pipeline::{HealthStatus, Pipeline};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AgentConfig;
use crate::error::AgentError;
use crate::filter::FilterChain;
use crate::parser::LineParser;
use crate::publisher::Publisher;
use crate::queue::{EventQueue, PushOutcome};
use crate::tailer::{FileTailer, TailStream};
use crate::transport::{TransportSession, TransportStats, WebSocketConnector};

/// 정지 시 태스크 종료 대기 한도
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// 큐 사용률 경고 기준
const QUEUE_DEGRADED_UTILIZATION: f64 = 0.9;

/// 에이전트 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨 (재시작 불가)
    Stopped,
}

/// ingest 경로 카운터 (태스크 간 공유)
#[derive(Debug, Default)]
struct IngestCounters {
    lines_read: AtomicU64,
    events_filtered: AtomicU64,
    events_enqueued: AtomicU64,
    last_fatal: Mutex<Option<String>>,
}

impl IngestCounters {
    fn record_fatal(&self, err: &AgentError) {
        *self.last_fatal.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.to_string());
    }

    fn last_fatal(&self) -> Option<String> {
        self.last_fatal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// 에이전트 통계 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentStats {
    /// 파일에서 읽은 라인 수
    pub lines_read: u64,
    /// 필터에서 걸러진 이벤트 수
    pub events_filtered: u64,
    /// 큐에 들어간 이벤트 수 (발행기 포함)
    pub events_enqueued: u64,
    /// 큐 오버플로우로 버려진 이벤트 수
    pub events_dropped: u64,
    /// 수집기로 전송 완료된 이벤트 수
    pub events_sent: u64,
    /// 재연결 성공 수
    pub reconnects: u64,
    /// 현재 연결 여부
    pub connected: bool,
}

/// 파일 tail 에이전트
///
/// # 사용 예시
/// ```ignore
/// use tailpost_agent::{TailAgent, TailAgentBuilder};
///
/// let (mut agent, fatal_rx) = TailAgentBuilder::new()
///     .config(config)
///     .build()?;
///
/// agent.start().await?;
/// ```
pub struct TailAgent {
    config: AgentConfig,
    state: AgentState,
    filters: Arc<FilterChain>,
    queue: Arc<EventQueue>,
    publisher: Arc<Publisher>,
    counters: Arc<IngestCounters>,
    transport_stats: Option<Arc<TransportStats>>,
    fatal_tx: mpsc::Sender<AgentError>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl TailAgent {
    /// 현재 상태 이름
    pub fn state_name(&self) -> &str {
        match self.state {
            AgentState::Initialized => "initialized",
            AgentState::Running => "running",
            AgentState::Stopped => "stopped",
        }
    }

    /// 에이전트 설정
    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// 컨텍스트 발행기 핸들
    pub fn publisher(&self) -> Arc<Publisher> {
        Arc::clone(&self.publisher)
    }

    /// 큐 사용률 (0.0 ~ 1.0)
    pub fn queue_utilization(&self) -> f64 {
        self.queue.utilization()
    }

    /// 통계 스냅샷
    pub fn stats(&self) -> AgentStats {
        let transport = self.transport_stats.as_deref();
        AgentStats {
            lines_read: self.counters.lines_read.load(Ordering::Relaxed),
            events_filtered: self.counters.events_filtered.load(Ordering::Relaxed),
            events_enqueued: self.counters.events_enqueued.load(Ordering::Relaxed),
            events_dropped: self.queue.dropped_count(),
            events_sent: transport.map_or(0, TransportStats::events_sent),
            reconnects: transport.map_or(0, TransportStats::reconnects),
            connected: transport.is_some_and(TransportStats::is_connected),
        }
    }
}

impl Pipeline for TailAgent {
    async fn start(&mut self) -> Result<(), TailpostError> {
        match self.state {
            AgentState::Running => return Err(PipelineError::AlreadyRunning.into()),
            AgentState::Stopped => {
                return Err(PipelineError::InitFailed(
                    "agent cannot be restarted after stop".to_owned(),
                )
                .into());
            }
            AgentState::Initialized => {}
        }

        tracing::info!(
            path = %self.config.watch_path.display(),
            endpoint = %self.config.endpoint,
            "starting tail agent"
        );

        // 1. 감시 등록 (실패 시 아무 태스크도 띄우지 않음)
        let tailer =
            FileTailer::new(self.config.watch_path.clone(), self.config.tailer_options()).await?;
        let (stream, tailer_task) = tailer.spawn(self.cancel.clone())?;
        self.tasks.push(tailer_task);

        // 2. ingest: 파싱 → 필터 → 큐
        let ingest = Ingest {
            source: self.config.watch_path.display().to_string(),
            parser: LineParser::new(),
            filters: Arc::clone(&self.filters),
            queue: Arc::clone(&self.queue),
            counters: Arc::clone(&self.counters),
            fatal_tx: self.fatal_tx.clone(),
        };
        self.tasks
            .push(tokio::spawn(ingest.run(stream, self.cancel.clone())));

        // 3. 전송 세션
        let connector =
            WebSocketConnector::new(self.config.endpoint.clone(), self.config.connect_timeout);
        let session = TransportSession::new(connector, self.config.backoff.clone());
        self.transport_stats = Some(session.stats());

        let queue = Arc::clone(&self.queue);
        let cancel = self.cancel.clone();
        let counters = Arc::clone(&self.counters);
        let fatal_tx = self.fatal_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            if let Err(e) = session.run(queue, cancel).await {
                tracing::error!(error = %e, "transport session failed");
                report_fatal(&counters, &fatal_tx, e).await;
            }
        }));

        self.state = AgentState::Running;
        tracing::info!("tail agent started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), TailpostError> {
        if self.state != AgentState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        tracing::info!("stopping tail agent");

        // 취소 후 큐를 닫아 대기 중인 생산자를 깨움
        self.cancel.cancel();
        self.queue.close();

        for mut task in self.tasks.drain(..) {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut task).await.is_err() {
                tracing::warn!("background task did not stop in time, aborting");
                task.abort();
            }
        }

        let remaining = self.queue.len();
        if remaining > 0 {
            tracing::info!(count = remaining, "discarding unsent events");
        }

        self.state = AgentState::Stopped;
        tracing::info!("tail agent stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            AgentState::Running => {
                if let Some(reason) = self.counters.last_fatal() {
                    return HealthStatus::Unhealthy(reason);
                }
                let connected = self
                    .transport_stats
                    .as_deref()
                    .is_some_and(TransportStats::is_connected);
                if !connected {
                    return HealthStatus::Degraded("collector disconnected".to_owned());
                }
                let utilization = self.queue.utilization();
                if utilization > QUEUE_DEGRADED_UTILIZATION {
                    return HealthStatus::Degraded(format!(
                        "queue utilization high: {:.1}%",
                        utilization * 100.0
                    ));
                }
                HealthStatus::Healthy
            }
            AgentState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            AgentState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// ingest 태스크 상태
struct Ingest {
    source: String,
    parser: LineParser,
    filters: Arc<FilterChain>,
    queue: Arc<EventQueue>,
    counters: Arc<IngestCounters>,
    fatal_tx: mpsc::Sender<AgentError>,
}

impl Ingest {
    async fn run(self, mut stream: TailStream, cancel: CancellationToken) {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = stream.next() => item,
            };

            let line = match item {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    tracing::error!(source = %self.source, error = %e, "tail stream failed");
                    report_fatal(&self.counters, &self.fatal_tx, e).await;
                    break;
                }
                None => break,
            };

            self.counters.lines_read.fetch_add(1, Ordering::Relaxed);
            let event = self.parser.parse(&line, &self.source);
            metrics::counter!(m::TAIL_EVENTS_PARSED_TOTAL, m::LABEL_LEVEL => event.level().as_str())
                .increment(1);

            if !self.filters.matches(&event) {
                self.counters.events_filtered.fetch_add(1, Ordering::Relaxed);
                metrics::counter!(m::FILTER_EVENTS_REJECTED_TOTAL, m::LABEL_LEVEL => event.level().as_str())
                    .increment(1);
                continue;
            }

            match self.queue.push(event).await {
                Ok(PushOutcome::Enqueued | PushOutcome::DisplacedOldest) => {
                    self.counters.events_enqueued.fetch_add(1, Ordering::Relaxed);
                }
                Ok(PushOutcome::Rejected) => {}
                Err(AgentError::QueueClosed) => break,
                Err(e) => {
                    report_fatal(&self.counters, &self.fatal_tx, e).await;
                    break;
                }
            }
        }
        tracing::debug!(source = %self.source, "ingest task stopped");
    }
}

async fn report_fatal(
    counters: &IngestCounters,
    fatal_tx: &mpsc::Sender<AgentError>,
    err: AgentError,
) {
    counters.record_fatal(&err);
    if fatal_tx.send(err).await.is_err() {
        tracing::debug!("fatal receiver dropped");
    }
}

/// 에이전트 빌더
pub struct TailAgentBuilder {
    config: AgentConfig,
    fatal_tx: Option<mpsc::Sender<AgentError>>,
    context_source: Option<String>,
}

impl TailAgentBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: AgentConfig::default(),
            fatal_tx: None,
            context_source: None,
        }
    }

    /// 에이전트 설정을 지정합니다.
    pub fn config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    /// 외부 fatal 에러 전송 채널을 설정합니다.
    ///
    /// 설정하지 않으면 빌더가 새 채널을 생성합니다.
    pub fn fatal_sender(mut self, tx: mpsc::Sender<AgentError>) -> Self {
        self.fatal_tx = Some(tx);
        self
    }

    /// 발행기 이벤트의 source 레이블을 지정합니다 (기본값 `"context"`).
    pub fn context_source(mut self, source: impl Into<String>) -> Self {
        self.context_source = Some(source.into());
        self
    }

    /// 에이전트를 빌드합니다.
    ///
    /// # Returns
    /// - `TailAgent`: 에이전트 인스턴스
    /// - `Option<mpsc::Receiver<AgentError>>`: fatal 에러 수신 채널
    ///   (외부 fatal_sender를 설정한 경우 None)
    pub fn build(self) -> Result<(TailAgent, Option<mpsc::Receiver<AgentError>>), AgentError> {
        self.config.validate()?;

        let filters = Arc::new(FilterChain::from_config(&self.config.filter)?);
        let queue = Arc::new(EventQueue::new(
            self.config.queue_capacity,
            self.config.overflow,
        ));

        let mut publisher = Publisher::new(Arc::clone(&queue), Arc::clone(&filters));
        if let Some(source) = self.context_source {
            publisher = publisher.with_source(source);
        }

        let (fatal_tx, fatal_rx) = match self.fatal_tx {
            Some(tx) => (tx, None),
            None => {
                let (tx, rx) = mpsc::channel(4);
                (tx, Some(rx))
            }
        };

        let agent = TailAgent {
            config: self.config,
            state: AgentState::Initialized,
            filters,
            queue,
            publisher: Arc::new(publisher),
            counters: Arc::new(IngestCounters::default()),
            transport_stats: None,
            fatal_tx,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        };

        Ok((agent, fatal_rx))
    }
}

impl Default for TailAgentBuilder {
    fn default() -> Self {
        Self::new()
    }
}
