//! 협력자 레지스트리 -- 주기 콜백 훅과 컨텍스트 발행 인터페이스
//!
//! 에이전트 코어는 스케줄러를 직접 구현하지 않습니다. 대신 두 개의 경계를
//! 노출합니다.
//!
//! - [`ContextPublisher`]: 외부 컴포넌트가 텍스트를 이벤트로 발행하는 입구
//! - [`Collaborator`]: 주기 스케줄러가 매 틱마다 호출하는 콜백
//!
//! [`CollaboratorRegistry`]는 전역 상태 없이 오케스트레이터 하나가 소유하는
//! 명시적 목록입니다.
//!
//! # 호출 흐름
//! ```text
//! scheduler tick → registry.heartbeat_all(publisher) → collaborator.on_heartbeat(publisher)
//!                                                         → publisher.publish(text) → filter → queue
//! ```

use std::future::Future;

use crate::error::{PluginError, TailpostError};
use crate::event::LogEvent;
use crate::pipeline::BoxFuture;

// ─── ContextPublisher ───────────────────────────────────────────────

/// 컨텍스트 메시지 발행 인터페이스
///
/// 구현체는 `text`의 첫 줄을 메시지로, 원문 전체를 `metadata["snapshot"]`으로
/// 담은 이벤트를 만들어 파일 tail 이벤트와 같은 필터/전송 경로에 넣습니다.
pub trait ContextPublisher: Send + Sync {
    /// 텍스트를 이벤트로 변환하여 발행하고, 생성된 이벤트를 반환합니다.
    fn publish<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<LogEvent, TailpostError>>;
}

// ─── Collaborator ───────────────────────────────────────────────────

/// 주기 스케줄러가 호출하는 협력자
///
/// # 구현 예시
/// ```ignore
/// struct Uptime;
///
/// impl Collaborator for Uptime {
///     fn name(&self) -> &str { "uptime" }
///
///     async fn on_heartbeat(&self, publisher: &dyn ContextPublisher) -> Result<(), TailpostError> {
///         publisher.publish("heartbeat").await?;
///         Ok(())
///     }
/// }
/// ```
pub trait Collaborator: Send + Sync {
    /// 협력자 고유 이름
    fn name(&self) -> &str;

    /// 스케줄러 틱마다 호출됩니다.
    fn on_heartbeat(
        &self,
        publisher: &dyn ContextPublisher,
    ) -> impl Future<Output = Result<(), TailpostError>> + Send;
}

/// dyn-compatible 협력자 trait
///
/// `Collaborator`는 RPITIT를 사용하므로 `dyn Collaborator`가 불가합니다.
/// 레지스트리는 이 trait으로 `Vec<Box<dyn DynCollaborator>>`를 보관합니다.
pub trait DynCollaborator: Send + Sync {
    /// 협력자 고유 이름
    fn name(&self) -> &str;

    /// 스케줄러 틱마다 호출됩니다.
    fn on_heartbeat<'a>(
        &'a self,
        publisher: &'a dyn ContextPublisher,
    ) -> BoxFuture<'a, Result<(), TailpostError>>;
}

impl<T: Collaborator> DynCollaborator for T {
    fn name(&self) -> &str {
        Collaborator::name(self)
    }

    fn on_heartbeat<'a>(
        &'a self,
        publisher: &'a dyn ContextPublisher,
    ) -> BoxFuture<'a, Result<(), TailpostError>> {
        Box::pin(Collaborator::on_heartbeat(self, publisher))
    }
}

// ─── CollaboratorRegistry ───────────────────────────────────────────

/// 한 번의 하트비트 라운드 결과
#[derive(Debug, Default)]
pub struct HeartbeatReport {
    /// 성공한 협력자 수
    pub succeeded: usize,
    /// 실패한 협력자 이름과 사유
    pub failures: Vec<PluginError>,
}

/// 협력자 레지스트리
///
/// 등록 순서대로 호출하며, 한 협력자의 실패가 나머지 호출을 막지 않습니다.
pub struct CollaboratorRegistry {
    collaborators: Vec<Box<dyn DynCollaborator>>,
}

impl CollaboratorRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self {
            collaborators: Vec::new(),
        }
    }

    /// 협력자를 등록합니다.
    ///
    /// 같은 이름이 이미 있으면 에러를 반환합니다.
    pub fn register(&mut self, collaborator: Box<dyn DynCollaborator>) -> Result<(), TailpostError> {
        let name = collaborator.name().to_owned();
        if self.collaborators.iter().any(|c| c.name() == name) {
            return Err(PluginError::AlreadyRegistered { name }.into());
        }
        tracing::debug!(collaborator = %name, "collaborator registered");
        self.collaborators.push(collaborator);
        Ok(())
    }

    /// 협력자를 해제하고 소유권을 반환합니다.
    pub fn unregister(&mut self, name: &str) -> Result<Box<dyn DynCollaborator>, TailpostError> {
        match self.collaborators.iter().position(|c| c.name() == name) {
            Some(idx) => Ok(self.collaborators.remove(idx)),
            None => Err(PluginError::NotFound {
                name: name.to_owned(),
            }
            .into()),
        }
    }

    /// 등록된 협력자 이름 목록 (등록 순서)
    pub fn names(&self) -> Vec<&str> {
        self.collaborators.iter().map(|c| c.name()).collect()
    }

    /// 등록된 협력자 수
    pub fn count(&self) -> usize {
        self.collaborators.len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.collaborators.is_empty()
    }

    /// 모든 협력자의 하트비트 콜백을 등록 순서대로 호출합니다.
    pub async fn heartbeat_all(&self, publisher: &dyn ContextPublisher) -> HeartbeatReport {
        let mut report = HeartbeatReport::default();
        for collaborator in &self.collaborators {
            match collaborator.on_heartbeat(publisher).await {
                Ok(()) => report.succeeded += 1,
                Err(e) => {
                    tracing::warn!(
                        collaborator = collaborator.name(),
                        error = %e,
                        "collaborator heartbeat failed"
                    );
                    report.failures.push(PluginError::CallbackFailed {
                        name: collaborator.name().to_owned(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        report
    }
}

impl Default for CollaboratorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::error::PipelineError;
    use crate::event::LogLevel;

    /// 발행된 텍스트를 기록하는 테스트용 발행기
    #[derive(Default)]
    struct RecordingPublisher {
        published: Mutex<Vec<String>>,
    }

    impl ContextPublisher for RecordingPublisher {
        fn publish<'a>(
            &'a self,
            text: &'a str,
        ) -> BoxFuture<'a, Result<LogEvent, TailpostError>> {
            Box::pin(async move {
                self.published.lock().unwrap().push(text.to_owned());
                Ok(LogEvent::new(LogLevel::Info, "test", text))
            })
        }
    }

    struct MockCollaborator {
        name: String,
        fail: bool,
    }

    impl MockCollaborator {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_owned(),
                fail: false,
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    impl Collaborator for MockCollaborator {
        fn name(&self) -> &str {
            &self.name
        }

        async fn on_heartbeat(&self, publisher: &dyn ContextPublisher) -> Result<(), TailpostError> {
            if self.fail {
                return Err(PipelineError::ChannelSend("queue closed".to_owned()).into());
            }
            publisher.publish(&format!("tick from {}", self.name)).await?;
            Ok(())
        }
    }

    #[test]
    fn register_and_list() {
        let mut registry = CollaboratorRegistry::new();
        assert!(registry.is_empty());
        registry
            .register(Box::new(MockCollaborator::new("uptime")))
            .unwrap();
        registry
            .register(Box::new(MockCollaborator::new("snapshot")))
            .unwrap();
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.names(), vec!["uptime", "snapshot"]);
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let mut registry = CollaboratorRegistry::new();
        registry
            .register(Box::new(MockCollaborator::new("uptime")))
            .unwrap();
        let err = registry
            .register(Box::new(MockCollaborator::new("uptime")))
            .unwrap_err();
        assert!(matches!(
            err,
            TailpostError::Plugin(PluginError::AlreadyRegistered { .. })
        ));
    }

    #[test]
    fn unregister_returns_ownership() {
        let mut registry = CollaboratorRegistry::new();
        registry
            .register(Box::new(MockCollaborator::new("uptime")))
            .unwrap();
        let removed = registry.unregister("uptime").unwrap();
        assert_eq!(removed.name(), "uptime");
        assert!(registry.is_empty());
        assert!(registry.unregister("uptime").is_err());
    }

    #[tokio::test]
    async fn heartbeat_all_invokes_in_order() {
        let mut registry = CollaboratorRegistry::new();
        registry.register(Box::new(MockCollaborator::new("a"))).unwrap();
        registry.register(Box::new(MockCollaborator::new("b"))).unwrap();

        let publisher = RecordingPublisher::default();
        let report = registry.heartbeat_all(&publisher).await;

        assert_eq!(report.succeeded, 2);
        assert!(report.failures.is_empty());
        assert_eq!(
            *publisher.published.lock().unwrap(),
            vec!["tick from a".to_owned(), "tick from b".to_owned()]
        );
    }

    #[tokio::test]
    async fn failing_collaborator_does_not_block_others() {
        let mut registry = CollaboratorRegistry::new();
        registry
            .register(Box::new(MockCollaborator::new("broken").failing()))
            .unwrap();
        registry.register(Box::new(MockCollaborator::new("ok"))).unwrap();

        let publisher = RecordingPublisher::default();
        let report = registry.heartbeat_all(&publisher).await;

        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].to_string().contains("broken"));
        assert_eq!(publisher.published.lock().unwrap().len(), 1);
    }
}
