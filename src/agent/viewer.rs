use tracing::{error, info, warn};

use crate::coordinator::service::{CoordinatorHandle, LinkError};
use crate::utils::classifier::looks_like_pdf;
use crate::utils::fetcher::{FetchError, FetchedPdf};
use crate::utils::source_cache::ContextId;
use crate::utils::viewer_route::ViewerRoute;

/// What the viewer shows instead of a document when loading failed. Always
/// offers a way forward: retry, or leave for the original address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorAffordance {
    pub title: String,
    pub message: String,
    pub can_retry: bool,
    pub open_original: Option<String>,
}

impl ErrorAffordance {
    pub fn for_fetch_error(source: Option<&str>, error: &FetchError) -> Self {
        match error {
            FetchError::Disabled => Self {
                title: "PDF viewer is turned off".to_string(),
                message: "Turn the viewer back on to display this document here.".to_string(),
                can_retry: false,
                open_original: source.map(str::to_string),
            },
            FetchError::NoSourceAvailable => Self {
                title: "No PDF to show".to_string(),
                message: "The viewer was opened without a document address.".to_string(),
                can_retry: false,
                open_original: None,
            },
            other => Self {
                title: "Error Loading PDF".to_string(),
                message: format!("Unable to load the PDF file. {}", other),
                can_retry: true,
                open_original: source.map(str::to_string),
            },
        }
    }

    pub fn for_link_error(source: Option<&str>, error: &LinkError) -> Self {
        Self {
            title: "Error Loading PDF".to_string(),
            message: format!("{}. Reload the page to try again.", error),
            can_retry: true,
            open_original: source.map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerState {
    Ready(FetchedPdf),
    Failed(ErrorAffordance),
}

/// The viewer page's side of the protocol: find out which document it was
/// opened for and obtain its bytes through the coordinator.
pub struct ViewerSession {
    context_id: ContextId,
    route: ViewerRoute,
    link: CoordinatorHandle,
}

impl ViewerSession {
    pub fn new(context_id: ContextId, route: ViewerRoute, link: CoordinatorHandle) -> Self {
        Self {
            context_id,
            route,
            link,
        }
    }

    /// `src` parameter of the viewer address, else whatever the coordinator
    /// knows about this context.
    pub async fn source(&self, viewer_url: &str) -> Result<Option<String>, LinkError> {
        if let Some(src) = self.route.source_from(viewer_url) {
            return Ok(Some(src));
        }
        self.link
            .resolve_source(self.context_id, Some(viewer_url.to_string()))
            .await
            .map(|resolved| resolved.filter(|url| !self.route.owns(url)))
    }

    pub async fn load(&self, viewer_url: &str) -> ViewerState {
        let source = match self.source(viewer_url).await {
            Ok(source) => source,
            Err(e) => {
                error!("Viewer could not resolve its source: {}", e);
                return ViewerState::Failed(ErrorAffordance::for_link_error(None, &e));
            }
        };

        info!("Loading PDF from: {}", source.as_deref().unwrap_or("<none>"));

        match self.link.request_fetch(source.clone()).await {
            Ok(Ok(fetched)) => {
                if !looks_like_pdf(&fetched.bytes) {
                    warn!(
                        "Body of {} does not start with a PDF header ({} bytes, content-type {:?})",
                        source.as_deref().unwrap_or_default(),
                        fetched.bytes.len(),
                        fetched.content_type
                    );
                }
                ViewerState::Ready(fetched)
            }
            Ok(Err(e)) => {
                error!("Failed to load PDF: {}", e);
                ViewerState::Failed(ErrorAffordance::for_fetch_error(source.as_deref(), &e))
            }
            Err(e) => ViewerState::Failed(ErrorAffordance::for_link_error(source.as_deref(), &e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::detection::Coordinator;
    use crate::coordinator::enablement::EnablementSwitch;
    use crate::coordinator::service;
    use crate::host::link::LocalHost;
    use crate::host::types::{HostEvent, NavigationEvent};
    use crate::utils::fetcher::tests::{pdf_response, ScriptedSource};
    use crate::utils::fetcher::{ByteFetcher, RawResponse, RetryPolicy};
    use std::sync::Arc;

    const VIEWER: &str = "chrome-extension://viewer/viewer.html";

    fn session(script: Vec<Result<RawResponse, FetchError>>) -> ViewerSession {
        let coordinator = Coordinator::new(
            ViewerRoute::new(VIEWER),
            EnablementSwitch::new("ruleset_1"),
            ByteFetcher::new(ScriptedSource::new(script), RetryPolicy::default()),
            Arc::new(LocalHost::new()),
        );
        let (handle, _task) = service::spawn(coordinator);
        ViewerSession::new(1, ViewerRoute::new(VIEWER), handle)
    }

    #[tokio::test]
    async fn loads_bytes_for_src_parameter() {
        let session = session(vec![pdf_response(b"%PDF-1.3 hello")]);
        let viewer_url = ViewerRoute::new(VIEWER).viewer_url_for("https://site/doc.pdf");

        match session.load(&viewer_url).await {
            ViewerState::Ready(fetched) => {
                assert_eq!(fetched.bytes, b"%PDF-1.3 hello");
                assert_eq!(fetched.content_type, "application/pdf");
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test]
    async fn falls_back_to_cached_source() {
        let session = session(vec![pdf_response(b"%PDF-cached")]);
        session
            .link
            .dispatch(HostEvent::NavigationCommitted(NavigationEvent {
                context_id: 1,
                url: "https://site/cached.pdf".to_string(),
                frame_depth: 0,
            }))
            .await
            .unwrap();

        assert_eq!(
            session.source(VIEWER).await.unwrap().as_deref(),
            Some("https://site/cached.pdf")
        );
        assert!(matches!(session.load(VIEWER).await, ViewerState::Ready(_)));
    }

    #[tokio::test]
    async fn missing_source_shows_affordance_not_blank() {
        let session = session(vec![]);

        match session.load(VIEWER).await {
            ViewerState::Failed(affordance) => {
                assert_eq!(affordance.title, "No PDF to show");
                assert!(!affordance.can_retry);
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_fetch_offers_retry_and_escape() {
        let session = session(vec![
            Err(FetchError::Network("reset".to_string())),
            Err(FetchError::Network("reset".to_string())),
            Err(FetchError::Network("reset".to_string())),
        ]);
        let viewer_url = ViewerRoute::new(VIEWER).viewer_url_for("https://site/doc.pdf");

        match session.load(&viewer_url).await {
            ViewerState::Failed(affordance) => {
                assert_eq!(affordance.title, "Error Loading PDF");
                assert!(affordance.can_retry);
                assert_eq!(
                    affordance.open_original.as_deref(),
                    Some("https://site/doc.pdf")
                );
            }
            other => panic!("unexpected state: {:?}", other),
        }
    }

    #[test]
    fn disabled_is_not_described_as_a_failure() {
        let affordance =
            ErrorAffordance::for_fetch_error(Some("https://site/doc.pdf"), &FetchError::Disabled);
        assert!(!affordance.message.contains("Unable"));
        assert!(!affordance.can_retry);
        assert_eq!(
            affordance.open_original.as_deref(),
            Some("https://site/doc.pdf")
        );
    }
}
