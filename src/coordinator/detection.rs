use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use super::enablement::EnablementSwitch;
use crate::host::link::HostLink;
use crate::host::types::{
    AgentPush, DownloadEvent, HostEvent, NavigationEvent, ResponseEvent, ShouldInjectReply,
};
use crate::utils::classifier::{classify_headers, classify_url, is_pdf_media_type};
use crate::utils::fetcher::{ByteFetcher, FetchError, FetchOutcome};
use crate::utils::source_cache::{ContextId, SourceCache};
use crate::utils::viewer_route::ViewerRoute;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Confidence {
    Heuristic,
    Confirmed,
}

/// One piece of evidence that something is a PDF. Consumed once, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionSignal {
    HeaderConfirmed { context_id: ContextId, url: String },
    NavigationHeuristic { context_id: ContextId, url: String },
    UrlPatternMatch { url: String },
}

impl DetectionSignal {
    pub fn confidence(&self) -> Confidence {
        match self {
            DetectionSignal::HeaderConfirmed { .. } => Confidence::Confirmed,
            DetectionSignal::NavigationHeuristic { .. } | DetectionSignal::UrlPatternMatch { .. } => {
                Confidence::Heuristic
            }
        }
    }

    pub fn url(&self) -> &str {
        match self {
            DetectionSignal::HeaderConfirmed { url, .. }
            | DetectionSignal::NavigationHeuristic { url, .. }
            | DetectionSignal::UrlPatternMatch { url } => url,
        }
    }
}

/// Per-context detection state. A destroyed context simply has no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionPhase {
    #[default]
    Unknown,
    Suspected,
    Confirmed,
}

/// Long-lived owner of detection state, the source cache and the enablement
/// switch. All mutation goes through `&mut self`, so the single task that
/// owns the coordinator serializes every transition.
pub struct Coordinator {
    cache: SourceCache,
    phases: HashMap<ContextId, DetectionPhase>,
    switch: EnablementSwitch,
    route: ViewerRoute,
    fetcher: ByteFetcher,
    host: Arc<dyn HostLink>,
}

impl Coordinator {
    pub fn new(
        route: ViewerRoute,
        switch: EnablementSwitch,
        fetcher: ByteFetcher,
        host: Arc<dyn HostLink>,
    ) -> Self {
        Self {
            cache: SourceCache::new(),
            phases: HashMap::new(),
            switch,
            route,
            fetcher,
            host,
        }
    }

    /// Mirrors the initial enablement state into the host.
    pub fn start(&self) {
        self.switch.announce(self.host.as_ref());
    }

    pub fn is_enabled(&self) -> bool {
        self.switch.is_enabled()
    }

    pub fn phase(&self, context_id: ContextId) -> DetectionPhase {
        self.phases.get(&context_id).copied().unwrap_or_default()
    }

    pub fn source(&self, context_id: ContextId) -> Option<&str> {
        self.cache.get(context_id)
    }

    pub fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::NavigationStarted(ev) | HostEvent::NavigationCommitted(ev) => {
                self.on_navigation(&ev);
            }
            HostEvent::ResponseReceived(ev) => {
                self.on_response(&ev);
            }
            HostEvent::ContextDestroyed { context_id } => self.on_context_destroyed(context_id),
            HostEvent::ToggleClicked => {
                self.toggle();
            }
            HostEvent::DownloadStarted(ev) => {
                self.on_download(&ev);
            }
            HostEvent::TabCompleted(ev) => {
                self.on_tab_completed(&ev);
            }
        }
    }

    pub fn on_navigation(&mut self, event: &NavigationEvent) -> DetectionPhase {
        if event.frame_depth != 0 {
            debug!("Ignoring sub-frame navigation to {}", event.url);
            return self.phase(event.context_id);
        }
        if !self.switch.is_enabled() || !self.is_pdf_address(&event.url) {
            return self.phase(event.context_id);
        }

        self.apply(DetectionSignal::NavigationHeuristic {
            context_id: event.context_id,
            url: event.url.clone(),
        })
        .unwrap_or_default()
    }

    pub fn on_response(&mut self, event: &ResponseEvent) -> DetectionPhase {
        if event.frame_depth != 0 {
            debug!("Ignoring sub-frame response from {}", event.url);
            return self.phase(event.context_id);
        }
        if !self.switch.is_enabled()
            || self.route.owns(&event.url)
            || !classify_headers(&event.response_headers)
        {
            return self.phase(event.context_id);
        }

        let phase = self
            .apply(DetectionSignal::HeaderConfirmed {
                context_id: event.context_id,
                url: event.url.clone(),
            })
            .unwrap_or_default();

        let delivered = self.host.notify_agent(
            event.context_id,
            AgentPush::PdfDetected {
                url: event.url.clone(),
            },
        );
        if !delivered {
            debug!("No page agent listening on context {}", event.context_id);
        }

        phase
    }

    /// Load-complete safety net for PDFs the blocking rules let through:
    /// record the source and send the context to the viewer.
    pub fn on_tab_completed(&mut self, event: &NavigationEvent) -> bool {
        if event.frame_depth != 0
            || !self.switch.is_enabled()
            || !self.is_pdf_address(&event.url)
        {
            return false;
        }

        self.apply(DetectionSignal::NavigationHeuristic {
            context_id: event.context_id,
            url: event.url.clone(),
        });
        let viewer_url = self.route.viewer_url_for(&event.url);
        info!("Redirecting context {} to viewer", event.context_id);
        self.host.redirect_context(event.context_id, &viewer_url);
        true
    }

    /// Turns a PDF download into a viewer tab. Returns true when the host was
    /// told to cancel the download.
    pub fn on_download(&mut self, event: &DownloadEvent) -> bool {
        if !self.switch.is_enabled() {
            return false;
        }

        let mime = event.mime.trim();
        let by_mime = is_pdf_media_type(mime);
        let by_url = (mime.is_empty() || mime.eq_ignore_ascii_case("application/octet-stream"))
            && self.is_pdf_address(&event.url);
        if !by_mime && !by_url {
            return false;
        }

        self.apply(DetectionSignal::UrlPatternMatch {
            url: event.url.clone(),
        });
        let viewer_url = self.route.viewer_url_for(&event.url);
        info!(
            "Intercepting PDF download {} ({})",
            event.download_id, event.url
        );
        self.host
            .open_viewer_for_download(event.download_id, &viewer_url);
        true
    }

    pub fn on_context_destroyed(&mut self, context_id: ContextId) {
        let removed = self.cache.remove(context_id);
        self.phases.remove(&context_id);
        if let Some(url) = removed {
            debug!("Context {} destroyed, forgot {}", context_id, url);
        }
    }

    pub fn toggle(&mut self) -> bool {
        self.switch.toggle(self.host.as_ref())
    }

    /// Cached source for the context, else the fallback. A fallback that is a
    /// viewer address resolves to the document it was opened for.
    pub fn resolve_source(&self, context_id: ContextId, fallback: Option<&str>) -> Option<String> {
        if let Some(url) = self.cache.get(context_id) {
            return Some(url.to_string());
        }
        fallback.map(|f| self.route.source_from(f).unwrap_or_else(|| f.to_string()))
    }

    pub fn should_inject(&self, context_id: ContextId, fallback: Option<&str>) -> ShouldInjectReply {
        if !self.switch.is_enabled() {
            return ShouldInjectReply {
                should_inject: false,
                extension_enabled: false,
                pdf_url: None,
            };
        }

        let cached = self.cache.get(context_id);
        ShouldInjectReply {
            should_inject: cached.is_some(),
            extension_enabled: true,
            pdf_url: cached.or(fallback).map(str::to_string),
        }
    }

    /// Enablement is checked now; the returned future performs the network
    /// work and can run detached from the coordinator.
    pub fn request_fetch(&self, url: Option<String>) -> BoxFuture<'static, FetchOutcome> {
        if !self.switch.is_enabled() {
            debug!("Fetch refused, interception disabled");
            return Box::pin(async { Err(FetchError::Disabled) });
        }

        let fetcher = self.fetcher.clone();
        Box::pin(async move { fetcher.fetch(url.as_deref()).await })
    }

    fn is_pdf_address(&self, url: &str) -> bool {
        !self.route.owns(url) && classify_url(url)
    }

    /// Last signal wins, for the cached URL and for the phase alike.
    fn apply(&mut self, signal: DetectionSignal) -> Option<DetectionPhase> {
        let (context_id, phase) = match &signal {
            DetectionSignal::HeaderConfirmed { context_id, .. } => {
                (*context_id, DetectionPhase::Confirmed)
            }
            DetectionSignal::NavigationHeuristic { context_id, .. } => {
                (*context_id, DetectionPhase::Suspected)
            }
            DetectionSignal::UrlPatternMatch { url } => {
                debug!("Context-free PDF match for {}", url);
                return None;
            }
        };

        let previous = self.phase(context_id);
        self.cache.put(context_id, signal.url());
        self.phases.insert(context_id, phase);
        info!(
            "Context {}: {:?} -> {:?} ({:?} signal for {})",
            context_id,
            previous,
            phase,
            signal.confidence(),
            signal.url()
        );
        Some(phase)
    }
}
