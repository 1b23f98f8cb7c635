//! 플랫폼 파일 감시 -- `notify` 백엔드를 tokio 채널로 연결
//!
//! OS 콜백은 `notify` 내부 스레드에서 호출됩니다. 콜백은 대상 파일 이름이
//! 포함된 이벤트만 골라 용량 1짜리 채널에 신호를 넣습니다. 채널이 이미
//! 차 있으면 drain 이 예약된 상태이므로 신호를 버려도 누락이 없습니다.
//!
//! 백엔드:
//! - `native`: inotify (Linux), FSEvents (macOS), ReadDirectoryChangesW (Windows)
//! - `poll`: 주기적 stat (NFS 등 알림이 불안정한 파일 시스템용)

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use notify::{Config, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::error::AgentError;

/// 감시 백엔드 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WatcherKind {
    /// OS 변경 알림
    #[default]
    Native,
    /// 주기적 폴링
    Poll,
}

impl FromStr for WatcherKind {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "native" => Ok(Self::Native),
            "poll" => Ok(Self::Poll),
            other => Err(AgentError::Config {
                field: "watch.watcher".to_owned(),
                reason: format!("unknown watcher '{other}', expected native or poll"),
            }),
        }
    }
}

impl fmt::Display for WatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Poll => f.write_str("poll"),
        }
    }
}

/// 디렉토리 단위 변경 감시 인터페이스
///
/// 등록 해제는 `unwatch` 또는 drop 시점에 이루어집니다.
pub trait PlatformFileWatcher: Send {
    /// 디렉토리 감시를 등록합니다 (비재귀).
    fn watch(&mut self, dir: &Path) -> Result<(), AgentError>;

    /// 디렉토리 감시를 해제합니다.
    fn unwatch(&mut self, dir: &Path) -> Result<(), AgentError>;

    /// 사용 중인 백엔드 이름 (inotify, FSEvents, poll ...)
    fn backend_name(&self) -> &'static str;
}

/// `notify` 기반 감시자
pub struct NotifyWatcher<W> {
    inner: W,
    backend: &'static str,
}

impl<W: Watcher + Send> PlatformFileWatcher for NotifyWatcher<W> {
    fn watch(&mut self, dir: &Path) -> Result<(), AgentError> {
        self.inner
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| AgentError::Watch {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })
    }

    fn unwatch(&mut self, dir: &Path) -> Result<(), AgentError> {
        self.inner.unwatch(dir).map_err(|e| AgentError::Watch {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })
    }

    fn backend_name(&self) -> &'static str {
        self.backend
    }
}

/// 감시자를 생성합니다.
///
/// `target_name`과 파일 이름이 같은 경로가 포함된 이벤트가 오면 `signals`에
/// 신호를 보냅니다.
pub fn create_watcher(
    kind: WatcherKind,
    poll_interval: Duration,
    target_name: OsString,
    signals: mpsc::Sender<()>,
) -> Result<Box<dyn PlatformFileWatcher>, AgentError> {
    let handler = move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if is_relevant(&event, &target_name) {
                // 가득 찬 경우는 이미 drain 이 예약된 상태
                let _ = signals.try_send(());
            }
        }
        Err(e) => tracing::warn!(error = %e, "file watcher backend error"),
    };

    let init_err = |e: notify::Error| AgentError::Watch {
        path: String::new(),
        reason: format!("watcher initialization failed: {e}"),
    };

    match kind {
        WatcherKind::Native => {
            let inner = RecommendedWatcher::new(handler, Config::default()).map_err(init_err)?;
            Ok(Box::new(NotifyWatcher {
                inner,
                backend: native_backend_name(),
            }))
        }
        WatcherKind::Poll => {
            let config = Config::default().with_poll_interval(poll_interval);
            let inner = PollWatcher::new(handler, config).map_err(init_err)?;
            Ok(Box::new(NotifyWatcher {
                inner,
                backend: "poll",
            }))
        }
    }
}

/// 감시 대상 디렉토리 (상대 경로의 부모가 비어 있으면 현재 디렉토리)
pub fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn is_relevant(event: &Event, target_name: &OsString) -> bool {
    if matches!(event.kind, EventKind::Access(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(target_name.as_os_str()))
}

fn native_backend_name() -> &'static str {
    #[cfg(target_os = "linux")]
    {
        "inotify"
    }
    #[cfg(target_os = "macos")]
    {
        "FSEvents"
    }
    #[cfg(target_os = "windows")]
    {
        "ReadDirectoryChangesW"
    }
    #[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
    {
        "native"
    }
}
