//! 파일 tail -- 감시 상태 기계와 라인 스트림
//!
//! [`FileTailer`]는 파일 하나의 읽기 커서를 소유하고, 상위 디렉토리 변경 알림을
//! 받을 때마다 커서 이후에 추가된 완전한 줄을 내보냅니다.
//!
//! # 상태 전이
//! ```text
//! Idle ──spawn──▶ Watching ──notify──▶ Draining ──▶ Watching ...
//!                    │                    │
//!                    └──── cancel / I/O fault ────▶ Stopped
//! ```
//!
//! # drain 규칙
//! - 파일이 교체됨 (unix inode 변경): 로테이션으로 판단하고 새 파일을 처음부터 읽음
//! - `len < cursor`: truncate 로 판단하고 커서를 현재 길이로 옮김 (아무것도 내보내지 않음)
//! - `len == cursor`: 변화 없음
//! - 파일 없음: 에러가 아님. 커서를 0으로 두고 같은 이름의 파일이 다시 생기길 기다림
//! - 그 외: 커서부터 청크 단위로 읽어 `\n`으로 끝나는 줄만 내보내고 커서를 마지막 종결자 뒤로 이동
//!
//! 종결자가 없는 꼬리는 다음 drain 까지 보류합니다. `max_line_length`보다 긴 줄은
//! 그 길이 단위 조각으로 나누어 내보내므로 한 번에 메모리에 올라가는 양은
//! 청크 크기를 넘지 않습니다. 열기/읽기 실패(파일 없음 제외)는 스트림을 `Err`로 끝냅니다.
//!
//! 커서는 tail 태스크 안에서만 변경됩니다.

mod lines;
mod watcher;

pub use lines::{LineSplit, split_lines};
pub use watcher::{NotifyWatcher, PlatformFileWatcher, WatcherKind, create_watcher, watch_dir};

use std::ffi::OsString;
use std::fmt;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::BytesMut;
use tailpost_core::metrics as m;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AgentError;

/// 라인 스트림 채널 기본 용량
const DEFAULT_LINE_CHANNEL_CAPACITY: usize = 1024;

/// drain 한 번의 기본 읽기 단위 (바이트)
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// 시작 위치
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartPosition {
    /// 기존 내용은 건너뛰고 이후 추가분만 읽음
    #[default]
    End,
    /// 파일 처음부터 읽음
    Beginning,
}

impl FromStr for StartPosition {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "end" => Ok(Self::End),
            "beginning" => Ok(Self::Beginning),
            other => Err(AgentError::Config {
                field: "watch.start_position".to_owned(),
                reason: format!("unknown start position '{other}', expected end or beginning"),
            }),
        }
    }
}

/// tail 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    /// 생성 직후
    Idle,
    /// 알림 대기 중
    Watching,
    /// 새 내용을 읽는 중
    Draining,
    /// 종료됨 (재시작 불가)
    Stopped,
}

impl fmt::Display for TailerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Watching => write!(f, "watching"),
            Self::Draining => write!(f, "draining"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// tail 옵션
#[derive(Debug, Clone)]
pub struct TailerOptions {
    /// 시작 위치
    pub start_position: StartPosition,
    /// 감시 백엔드
    pub watcher: WatcherKind,
    /// poll 백엔드 간격
    pub poll_interval: Duration,
    /// 한 줄의 최대 길이 (바이트). 넘으면 조각으로 나누어 방출
    pub max_line_length: usize,
    /// 라인 스트림 채널 용량
    pub channel_capacity: usize,
}

impl Default for TailerOptions {
    fn default() -> Self {
        Self {
            start_position: StartPosition::End,
            watcher: WatcherKind::Native,
            poll_interval: Duration::from_secs(1),
            max_line_length: 64 * 1024,
            channel_capacity: DEFAULT_LINE_CHANNEL_CAPACITY,
        }
    }
}

/// 파일 하나를 tail 하는 상태 기계
#[derive(Debug)]
pub struct FileTailer {
    path: PathBuf,
    file_name: OsString,
    cursor: u64,
    file_id: Option<u64>,
    state: TailerState,
    options: TailerOptions,
}

impl FileTailer {
    /// 새 tailer 를 생성합니다.
    ///
    /// 커서는 시작 위치에 따라 파일 끝(없으면 0) 또는 0으로 설정됩니다.
    pub async fn new(path: impl Into<PathBuf>, options: TailerOptions) -> Result<Self, AgentError> {
        let path = path.into();
        let (len, file_id) = match tokio::fs::metadata(&path).await {
            Ok(meta) => (meta.len(), file_identity(&meta)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => (0, None),
            Err(e) => {
                return Err(AgentError::Tail {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        };
        let cursor = match options.start_position {
            StartPosition::Beginning => 0,
            StartPosition::End => len,
        };
        let mut tailer = Self::with_cursor(path, cursor, options)?;
        tailer.file_id = file_id;
        Ok(tailer)
    }

    /// 커서를 직접 지정하여 생성합니다.
    pub fn with_cursor(
        path: impl Into<PathBuf>,
        cursor: u64,
        options: TailerOptions,
    ) -> Result<Self, AgentError> {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_os_string())
            .ok_or_else(|| AgentError::Config {
                field: "watch.path".to_owned(),
                reason: format!("'{}' does not name a file", path.display()),
            })?;
        Ok(Self {
            path,
            file_name,
            cursor,
            file_id: None,
            state: TailerState::Idle,
            options,
        })
    }

    /// 대상 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 현재 커서 (바이트 오프셋)
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// 현재 상태
    pub fn state(&self) -> TailerState {
        self.state
    }

    /// 커서 이후의 완전한 줄을 최대 한 청크만큼 읽고 커서를 전진시킵니다.
    ///
    /// 빈 벡터는 더 읽을 완전한 줄이 없다는 뜻입니다. 한 번에 메모리에 올리는
    /// 양은 [`read_chunk_size`](Self::read_chunk_size)로 제한됩니다.
    /// 파일이 사라진 경우(로테이션 중)는 에러가 아니며 커서를 0으로 되돌립니다.
    pub async fn drain_chunk(&mut self) -> Result<Vec<String>, AgentError> {
        let previous = self.state;
        self.state = TailerState::Draining;
        let result = self.read_chunk().await;
        self.state = previous;
        result
    }

    /// drain 한 번에 읽는 최대 바이트 수
    pub fn read_chunk_size(&self) -> usize {
        READ_CHUNK_SIZE.max(self.options.max_line_length.saturating_add(1))
    }

    async fn read_chunk(&mut self) -> Result<Vec<String>, AgentError> {
        let mut file = match tokio::fs::File::open(&self.path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if self.cursor != 0 {
                    debug!(path = %self.path.display(), "watched file missing, resetting cursor");
                    self.cursor = 0;
                }
                self.file_id = None;
                return Ok(Vec::new());
            }
            Err(e) => return Err(self.tail_error(e)),
        };

        let meta = file.metadata().await.map_err(|e| self.tail_error(e))?;
        let len = meta.len();

        let file_id = file_identity(&meta);
        if self.file_id.is_some() && file_id != self.file_id {
            info!(path = %self.path.display(), "file replaced, reading new file from start");
            self.cursor = 0;
        }
        self.file_id = file_id;

        if len < self.cursor {
            warn!(
                path = %self.path.display(),
                cursor = self.cursor,
                len,
                "file truncated, moving cursor to current length"
            );
            metrics::counter!(m::TAIL_TRUNCATIONS_TOTAL).increment(1);
            self.cursor = len;
            return Ok(Vec::new());
        }
        if len == self.cursor {
            return Ok(Vec::new());
        }

        file.seek(SeekFrom::Start(self.cursor))
            .await
            .map_err(|e| self.tail_error(e))?;

        let chunk = self.read_chunk_size();
        let to_read = (len - self.cursor).min(chunk as u64);
        let mut buf = BytesMut::with_capacity(usize::try_from(to_read).unwrap_or(chunk));
        let mut reader = (&mut file).take(to_read);
        loop {
            let n = reader
                .read_buf(&mut buf)
                .await
                .map_err(|e| self.tail_error(e))?;
            if n == 0 {
                break;
            }
        }

        let split = split_lines(&buf, self.options.max_line_length);
        self.cursor += split.consumed as u64;
        metrics::counter!(m::TAIL_LINES_READ_TOTAL).increment(split.lines.len() as u64);
        Ok(split.lines)
    }

    fn tail_error(&self, e: std::io::Error) -> AgentError {
        AgentError::Tail {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        }
    }

    /// 감시를 등록하고 tail 태스크를 시작합니다.
    ///
    /// 등록 실패는 즉시 에러로 반환됩니다. 반환된 스트림은 `cancel` 또는
    /// I/O 장애(마지막 `Err` 항목)로 종료됩니다.
    pub fn spawn(
        mut self,
        cancel: CancellationToken,
    ) -> Result<(TailStream, JoinHandle<()>), AgentError> {
        let (signal_tx, signal_rx) = mpsc::channel(1);
        let mut watcher = create_watcher(
            self.options.watcher,
            self.options.poll_interval,
            self.file_name.clone(),
            signal_tx,
        )?;
        let dir = watch_dir(&self.path);
        watcher.watch(&dir).map_err(|e| match e {
            AgentError::Watch { reason, .. } => AgentError::Watch {
                path: dir.display().to_string(),
                reason,
            },
            other => other,
        })?;

        info!(
            path = %self.path.display(),
            dir = %dir.display(),
            backend = watcher.backend_name(),
            cursor = self.cursor,
            "watching file"
        );

        let (line_tx, line_rx) = mpsc::channel(self.options.channel_capacity.max(1));
        self.state = TailerState::Watching;
        let handle = tokio::spawn(async move {
            self.run(watcher, dir, signal_rx, line_tx, cancel).await;
        });
        Ok((TailStream { rx: line_rx }, handle))
    }

    async fn run(
        mut self,
        mut watcher: Box<dyn PlatformFileWatcher>,
        dir: PathBuf,
        mut signals: mpsc::Receiver<()>,
        lines: mpsc::Sender<Result<String, AgentError>>,
        cancel: CancellationToken,
    ) {
        // 시작 시점에 이미 쌓인 내용 (beginning 이거나 커서 지정 시)
        let mut keep_running = self.drain_and_emit(&lines, &cancel).await;

        while keep_running {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                signal = signals.recv() => {
                    keep_running = match signal {
                        Some(()) => self.drain_and_emit(&lines, &cancel).await,
                        None => false,
                    };
                }
            }
        }

        if let Err(e) = watcher.unwatch(&dir) {
            debug!(error = %e, "unwatch failed during shutdown");
        }
        drop(watcher);
        self.state = TailerState::Stopped;
        info!(path = %self.path.display(), cursor = self.cursor, "tailer stopped");
    }

    /// 더 읽을 줄이 없을 때까지 청크 단위로 drain 하며 스트림으로 보냅니다.
    /// 계속 실행할지 여부를 반환합니다.
    async fn drain_and_emit(
        &mut self,
        lines: &mpsc::Sender<Result<String, AgentError>>,
        cancel: &CancellationToken,
    ) -> bool {
        loop {
            let batch = match self.drain_chunk().await {
                Ok(batch) if batch.is_empty() => return true,
                Ok(batch) => batch,
                Err(e) => {
                    warn!(error = %e, "tail drain failed, ending stream");
                    let _ = lines.send(Err(e)).await;
                    return false;
                }
            };
            for line in batch {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return false,
                    sent = lines.send(Ok(line)) => {
                        if sent.is_err() {
                            // 소비자가 스트림을 버림
                            return false;
                        }
                    }
                }
            }
        }
    }
}

/// 같은 경로의 파일이 교체되었는지 판별하는 식별자
#[cfg(unix)]
fn file_identity(meta: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn file_identity(_meta: &std::fs::Metadata) -> Option<u64> {
    None
}

/// tail 라인 스트림
///
/// 정상 종료 시 `None`, I/O 장애 시 마지막 항목으로 `Err`를 내보냅니다.
#[derive(Debug)]
pub struct TailStream {
    rx: mpsc::Receiver<Result<String, AgentError>>,
}

impl TailStream {
    /// 다음 줄을 기다립니다.
    pub async fn next(&mut self) -> Option<Result<String, AgentError>> {
        self.rx.recv().await
    }
}

impl futures_util::stream::Stream for TailStream {
    type Item = Result<String, AgentError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
