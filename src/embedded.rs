use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::agent::resolver::{InjectionResolver, ViewerSurface};
use crate::agent::viewer::ViewerSession;
use crate::config::InterceptorConfig;
use crate::coordinator::{self, service::CoordinatorHandle};
use crate::host::link::LocalHost;
use crate::utils::fetcher::ByteSource;
use crate::utils::source_cache::ContextId;

/// Coordinator and page agents living in one process, wired through a
/// [`LocalHost`]. Must be created inside a tokio runtime.
pub struct EmbeddedInterceptor {
    config: InterceptorConfig,
    host: Arc<LocalHost>,
    handle: CoordinatorHandle,
    task: JoinHandle<()>,
}

impl EmbeddedInterceptor {
    pub fn start(config: InterceptorConfig, source: Arc<dyn ByteSource>) -> Self {
        let host = Arc::new(LocalHost::new());
        let (handle, task) = coordinator::spawn_with(&config, source, host.clone());
        Self {
            config,
            host,
            handle,
            task,
        }
    }

    /// Where the host event bus feeds events.
    pub fn handle(&self) -> &CoordinatorHandle {
        &self.handle
    }

    pub fn host(&self) -> &LocalHost {
        &self.host
    }

    /// Agent for a fresh page load in `context_id`, already subscribed to
    /// pushes for that context.
    pub fn page_agent<S: ViewerSurface>(
        &self,
        context_id: ContextId,
        page_url: &str,
        surface: S,
    ) -> InjectionResolver<S> {
        InjectionResolver::new(
            context_id,
            page_url,
            self.config.viewer_route(),
            self.handle.clone(),
            self.host.attach(context_id),
            surface,
        )
        .with_confirm_wait(self.config.confirm_wait)
    }

    pub fn viewer_session(&self, context_id: ContextId) -> ViewerSession {
        ViewerSession::new(context_id, self.config.viewer_route(), self.handle.clone())
    }

    /// Simulates the coordinator going away under live agents.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

impl Drop for EmbeddedInterceptor {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::resolver::{InjectionTrigger, ResolveOutcome};
    use crate::agent::viewer::ViewerState;
    use crate::host::types::{HostEvent, NavigationEvent, ResponseEvent};
    use crate::utils::classifier::ResponseHeader;
    use crate::utils::fetcher::tests::{pdf_response, ScriptedSource};
    use std::time::Duration;
    use tokio::time::Instant;

    #[derive(Default)]
    struct Overlay {
        shown: Option<String>,
    }

    impl ViewerSurface for Overlay {
        fn install(&mut self, viewer_url: &str) {
            self.shown = Some(viewer_url.to_string());
        }

        fn remove(&mut self) {
            self.shown = None;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn page_load_to_rendered_bytes() {
        let interceptor = EmbeddedInterceptor::start(
            InterceptorConfig::default(),
            ScriptedSource::new(vec![pdf_response(b"%PDF-1.7 doc")]),
        );
        let events = interceptor.handle();
        events
            .dispatch(HostEvent::NavigationStarted(NavigationEvent {
                context_id: 1,
                url: "https://site/doc.pdf".to_string(),
                frame_depth: 0,
            }))
            .await
            .unwrap();
        events
            .dispatch(HostEvent::ResponseReceived(ResponseEvent {
                context_id: 1,
                url: "https://site/doc.pdf".to_string(),
                frame_depth: 0,
                response_headers: vec![ResponseHeader::new("Content-Type", "application/pdf")],
            }))
            .await
            .unwrap();

        let mut agent = interceptor.page_agent(1, "https://site/doc.pdf", Overlay::default());
        let outcome = agent.start().await;
        assert_eq!(
            outcome,
            ResolveOutcome::Injected {
                source: "https://site/doc.pdf".to_string(),
                trigger: InjectionTrigger::Confirmed,
            }
        );

        let viewer_url = agent.surface().shown.clone().unwrap();
        match interceptor.viewer_session(1).load(&viewer_url).await {
            ViewerState::Ready(fetched) => assert_eq!(fetched.bytes, b"%PDF-1.7 doc"),
            other => panic!("unexpected state: {:?}", other),
        }

        agent.teardown();
        assert_eq!(agent.surface().shown, None);
    }

    #[tokio::test(start_paused = true)]
    async fn configured_wait_is_honored() {
        let config = InterceptorConfig {
            confirm_wait: Duration::from_millis(120),
            ..InterceptorConfig::default()
        };
        let interceptor = EmbeddedInterceptor::start(config, ScriptedSource::new(vec![]));

        let mut agent = interceptor.page_agent(2, "https://site/unknown.pdf", Overlay::default());
        let started = Instant::now();
        let outcome = agent.start().await;

        assert!(matches!(
            outcome,
            ResolveOutcome::Injected {
                trigger: InjectionTrigger::HeuristicTimeout,
                ..
            }
        ));
        let waited = started.elapsed();
        assert!(waited >= Duration::from_millis(120), "{:?}", waited);
        assert!(waited < Duration::from_millis(500), "{:?}", waited);
    }

    #[tokio::test]
    async fn agents_degrade_when_coordinator_is_gone() {
        let interceptor = EmbeddedInterceptor::start(
            InterceptorConfig::default(),
            ScriptedSource::new(vec![]),
        );
        let mut agent = interceptor.page_agent(3, "https://site/doc.pdf", Overlay::default());
        interceptor.shutdown();

        assert_eq!(
            agent.start().await,
            ResolveOutcome::Injected {
                source: "https://site/doc.pdf".to_string(),
                trigger: InjectionTrigger::HeuristicOnly,
            }
        );
    }
}
