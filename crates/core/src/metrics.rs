//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `tailpost_`
//! - 단계명: `tail_`, `filter_`, `queue_`, `transport_`, `heartbeat_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(tailpost_core::metrics::TAIL_LINES_READ_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 심각도 레이블 키 (TRACE ~ FATAL)
pub const LABEL_LEVEL: &str = "level";

/// 드롭 사유 레이블 키 (drop_oldest, drop_newest, closed)
pub const LABEL_REASON: &str = "reason";

/// 감시 백엔드 레이블 키 (inotify, fsevents, poll ...)
pub const LABEL_BACKEND: &str = "backend";

// ─── Tail 메트릭 ────────────────────────────────────────────────────

/// Tail: 파일에서 읽은 라인 수 (counter)
pub const TAIL_LINES_READ_TOTAL: &str = "tailpost_tail_lines_read_total";

/// Tail: 파일 truncate 감지 횟수 (counter)
pub const TAIL_TRUNCATIONS_TOTAL: &str = "tailpost_tail_truncations_total";

/// Tail: 파싱된 이벤트 수 (counter, label: level)
pub const TAIL_EVENTS_PARSED_TOTAL: &str = "tailpost_tail_events_parsed_total";

// ─── Filter 메트릭 ──────────────────────────────────────────────────

/// Filter: 필터에서 제외된 이벤트 수 (counter)
pub const FILTER_EVENTS_REJECTED_TOTAL: &str = "tailpost_filter_events_rejected_total";

// ─── Queue 메트릭 ───────────────────────────────────────────────────

/// Queue: 큐에 들어간 이벤트 수 (counter)
pub const QUEUE_EVENTS_ENQUEUED_TOTAL: &str = "tailpost_queue_events_enqueued_total";

/// Queue: 오버플로로 드롭된 이벤트 수 (counter, label: reason)
pub const QUEUE_EVENTS_DROPPED_TOTAL: &str = "tailpost_queue_events_dropped_total";

/// Queue: 현재 큐 깊이 (gauge)
pub const QUEUE_DEPTH: &str = "tailpost_queue_depth";

// ─── Transport 메트릭 ───────────────────────────────────────────────

/// Transport: 전송 완료된 이벤트 수 (counter)
pub const TRANSPORT_EVENTS_SENT_TOTAL: &str = "tailpost_transport_events_sent_total";

/// Transport: 연결 시도 수 (counter)
pub const TRANSPORT_CONNECT_ATTEMPTS_TOTAL: &str = "tailpost_transport_connect_attempts_total";

/// Transport: 연결 실패 수 (counter)
pub const TRANSPORT_CONNECT_FAILURES_TOTAL: &str = "tailpost_transport_connect_failures_total";

/// Transport: 연결 끊김 후 재연결 성공 수 (counter)
pub const TRANSPORT_RECONNECTS_TOTAL: &str = "tailpost_transport_reconnects_total";

/// Transport: 현재 연결 여부 (gauge, 0 또는 1)
pub const TRANSPORT_CONNECTED: &str = "tailpost_transport_connected";

/// Transport: 백오프 대기 시간 (histogram, 초)
pub const TRANSPORT_BACKOFF_DELAY_SECONDS: &str = "tailpost_transport_backoff_delay_seconds";

// ─── Heartbeat 메트릭 ───────────────────────────────────────────────

/// Heartbeat: 협력자 콜백 실패 수 (counter)
pub const HEARTBEAT_FAILURES_TOTAL: &str = "tailpost_heartbeat_failures_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 프로세스 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "tailpost_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "tailpost_build_info";

// ─── 히스토그램 버킷 ────────────────────────────────────────────────

/// 백오프 지연 히스토그램 버킷 (초)
///
/// 기본 정책(1s 시작, 30s 상한)을 덮도록 100ms ~ 60s 범위로 구성합니다.
pub const BACKOFF_DELAY_BUCKETS: [f64; 9] = [0.1, 0.25, 0.5, 1.0, 2.0, 4.0, 8.0, 16.0, 60.0];

/// 모든 메트릭의 설명을 등록합니다.
///
/// 레코더 설치 직후 한 번 호출합니다. 레코더가 없으면 아무 동작도 하지 않습니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Tail
    describe_counter!(
        TAIL_LINES_READ_TOTAL,
        "Total number of complete lines read from the watched file"
    );
    describe_counter!(
        TAIL_TRUNCATIONS_TOTAL,
        "Number of times the watched file shrank below the read cursor"
    );
    describe_counter!(
        TAIL_EVENTS_PARSED_TOTAL,
        "Events produced by the line parser, by level"
    );

    // Filter
    describe_counter!(
        FILTER_EVENTS_REJECTED_TOTAL,
        "Events rejected by the filter chain"
    );

    // Queue
    describe_counter!(
        QUEUE_EVENTS_ENQUEUED_TOTAL,
        "Events accepted into the outbound queue"
    );
    describe_counter!(
        QUEUE_EVENTS_DROPPED_TOTAL,
        "Events dropped by the outbound queue overflow policy"
    );
    describe_gauge!(QUEUE_DEPTH, "Current number of events waiting to be sent");

    // Transport
    describe_counter!(
        TRANSPORT_EVENTS_SENT_TOTAL,
        "Events written to the collector connection"
    );
    describe_counter!(
        TRANSPORT_CONNECT_ATTEMPTS_TOTAL,
        "Connection attempts made to the collector"
    );
    describe_counter!(
        TRANSPORT_CONNECT_FAILURES_TOTAL,
        "Connection attempts that failed"
    );
    describe_counter!(
        TRANSPORT_RECONNECTS_TOTAL,
        "Successful reconnects after a lost connection"
    );
    describe_gauge!(
        TRANSPORT_CONNECTED,
        "Whether the collector connection is currently open (1) or not (0)"
    );
    describe_histogram!(
        TRANSPORT_BACKOFF_DELAY_SECONDS,
        "Backoff delay slept before a reconnect attempt, in seconds"
    );

    // Heartbeat
    describe_counter!(
        HEARTBEAT_FAILURES_TOTAL,
        "Collaborator heartbeat callbacks that returned an error"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Daemon uptime in seconds");
    describe_gauge!(DAEMON_BUILD_INFO, "Build information (always 1)");
}
