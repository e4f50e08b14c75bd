use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::coordinator::service::{CoordinatorHandle, LinkError};
use crate::host::types::AgentPush;
use crate::utils::classifier::classify_url;
use crate::utils::source_cache::ContextId;
use crate::utils::viewer_route::ViewerRoute;

pub const DEFAULT_CONFIRM_WAIT: Duration = Duration::from_millis(500);

/// The page-side presentation of the viewer. The overlay strategy is assumed:
/// `install` covers and hides the raw page, `remove` takes every injected
/// artifact away again.
pub trait ViewerSurface {
    fn install(&mut self, viewer_url: &str);
    fn remove(&mut self);
    /// Hands a print request to the installed viewer.
    fn forward_print(&mut self) {}
}

/// Ctrl+P, or Cmd+P on macOS.
pub fn is_print_shortcut(key: &str, ctrl: bool, meta: bool) -> bool {
    (ctrl || meta) && key.eq_ignore_ascii_case("p")
}

/// What finally justified the injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectionTrigger {
    /// The coordinator already held a record for this context.
    Confirmed,
    /// A `pdfDetected` push arrived.
    Pushed,
    /// The confirmation window closed without news; the local URL heuristic won.
    HeuristicTimeout,
    /// The coordinator could not be reached and the URL looked like a PDF.
    HeuristicOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Disabled,
    NotPdf,
    AlreadyInjected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveOutcome {
    Injected {
        source: String,
        trigger: InjectionTrigger,
    },
    Skipped(SkipReason),
}

#[derive(Debug, Default)]
struct InjectionState {
    already_injected: bool,
    /// Viewer currently on the page; cleared by teardown.
    installed: bool,
    /// Why the last decision left the page alone.
    skipped: Option<SkipReason>,
    /// Deadline of the armed confirmation wait, if any.
    pending_wait: Option<Instant>,
}

/// Per-page-load arbiter between the local URL heuristic and the
/// coordinator's confirmation. Installs the viewer at most once.
pub struct InjectionResolver<S: ViewerSurface> {
    load_id: Uuid,
    context_id: ContextId,
    page_url: String,
    route: ViewerRoute,
    link: CoordinatorHandle,
    pushes: mpsc::UnboundedReceiver<AgentPush>,
    surface: S,
    confirm_wait: Duration,
    state: InjectionState,
}

impl<S: ViewerSurface> InjectionResolver<S> {
    pub fn new(
        context_id: ContextId,
        page_url: impl Into<String>,
        route: ViewerRoute,
        link: CoordinatorHandle,
        pushes: mpsc::UnboundedReceiver<AgentPush>,
        surface: S,
    ) -> Self {
        Self {
            load_id: Uuid::new_v4(),
            context_id,
            page_url: page_url.into(),
            route,
            link,
            pushes,
            surface,
            confirm_wait: DEFAULT_CONFIRM_WAIT,
            state: InjectionState::default(),
        }
    }

    pub fn with_confirm_wait(mut self, wait: Duration) -> Self {
        self.confirm_wait = wait;
        self
    }

    pub fn is_injected(&self) -> bool {
        self.state.already_injected
    }

    pub fn is_waiting(&self) -> bool {
        self.state.pending_wait.is_some()
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// URL-shape verdict for the page itself. The viewer page never counts.
    pub fn heuristic(&self) -> bool {
        !self.route.owns(&self.page_url) && classify_url(&self.page_url)
    }

    /// Runs the startup protocol: heuristic, coordinator query, and the
    /// bounded confirmation wait when only the heuristic speaks for a PDF.
    pub async fn start(&mut self) -> ResolveOutcome {
        let heuristic = self.heuristic();
        debug!(
            "[{}] page {} heuristic={}",
            self.load_id, self.page_url, heuristic
        );

        match self
            .link
            .should_inject(self.context_id, Some(self.page_url.clone()))
            .await
        {
            Ok(reply) if !reply.extension_enabled => {
                info!("[{}] interception disabled, leaving page alone", self.load_id);
                self.skip(SkipReason::Disabled)
            }
            Ok(reply) if reply.should_inject => {
                let source = reply.pdf_url.unwrap_or_else(|| self.page_url.clone());
                self.inject(source, InjectionTrigger::Confirmed)
            }
            Ok(_) if heuristic => self.await_confirmation().await,
            Ok(_) => self.skip(SkipReason::NotPdf),
            Err(LinkError::MessagingUnavailable) if heuristic => {
                warn!(
                    "[{}] coordinator unreachable, trusting URL heuristic",
                    self.load_id
                );
                let source = self.page_url.clone();
                self.inject(source, InjectionTrigger::HeuristicOnly)
            }
            Err(e) => {
                debug!("[{}] {}", self.load_id, e);
                self.skip(SkipReason::NotPdf)
            }
        }
    }

    /// A push confirms the page unless the last decision found interception
    /// disabled. After injection it is a no-op.
    pub fn handle_push(&mut self, push: AgentPush) -> ResolveOutcome {
        match push {
            AgentPush::PdfDetected { url } => {
                if self.state.skipped == Some(SkipReason::Disabled) {
                    debug!("[{}] push for {} ignored, interception disabled", self.load_id, url);
                    return ResolveOutcome::Skipped(SkipReason::Disabled);
                }
                self.inject(url, InjectionTrigger::Pushed)
            }
        }
    }

    /// Consumes late pushes until the coordinator side closes the channel.
    /// A queued push may predate a toggle, so enablement is asked again
    /// before acting on it.
    pub async fn listen(&mut self) {
        while let Some(push) = self.pushes.recv().await {
            if !self.state.already_injected {
                self.refresh_enablement().await;
            }
            self.handle_push(push);
        }
    }

    /// Keyboard hook installed with the viewer. Returns true when the
    /// shortcut was forwarded and should not reach the raw page.
    pub fn on_key(&mut self, key: &str, ctrl: bool, meta: bool) -> bool {
        if !self.state.installed || !is_print_shortcut(key, ctrl, meta) {
            return false;
        }
        debug!("[{}] forwarding print shortcut to viewer", self.load_id);
        self.surface.forward_print();
        true
    }

    /// Page is going away (navigation or back/forward). Removes everything we
    /// added so a restored snapshot does not come back with a stale viewer.
    pub fn teardown(&mut self) {
        self.state.pending_wait = None;
        if std::mem::take(&mut self.state.installed) {
            info!("[{}] removing injected viewer", self.load_id);
            self.surface.remove();
        }
    }

    async fn refresh_enablement(&mut self) {
        match self.link.should_inject(self.context_id, None).await {
            Ok(reply) if !reply.extension_enabled => {
                self.state.skipped = Some(SkipReason::Disabled);
            }
            Ok(_) => {
                if self.state.skipped == Some(SkipReason::Disabled) {
                    self.state.skipped = None;
                }
            }
            // Nobody left to say otherwise; the push stands
            Err(e) => debug!("[{}] {}", self.load_id, e),
        }
    }

    fn skip(&mut self, reason: SkipReason) -> ResolveOutcome {
        self.state.pending_wait = None;
        self.state.skipped = Some(reason);
        ResolveOutcome::Skipped(reason)
    }

    async fn await_confirmation(&mut self) -> ResolveOutcome {
        let deadline = Instant::now() + self.confirm_wait;
        self.state.pending_wait = Some(deadline);
        debug!(
            "[{}] waiting up to {:?} for confirmation",
            self.load_id, self.confirm_wait
        );

        loop {
            match tokio::time::timeout_at(deadline, self.pushes.recv()).await {
                Ok(Some(push)) => {
                    let outcome = self.handle_push(push);
                    if self.state.already_injected {
                        return outcome;
                    }
                }
                Ok(None) => {
                    // Nobody will push any more; sit out the window anyway
                    tokio::time::sleep_until(deadline).await;
                    break;
                }
                Err(_) => break,
            }
        }

        // Last look before degrading to the heuristic
        match self
            .link
            .should_inject(self.context_id, Some(self.page_url.clone()))
            .await
        {
            Ok(reply) if !reply.extension_enabled => {
                info!("[{}] interception disabled during wait", self.load_id);
                self.skip(SkipReason::Disabled)
            }
            Ok(reply) if reply.should_inject => {
                let source = reply.pdf_url.unwrap_or_else(|| self.page_url.clone());
                self.inject(source, InjectionTrigger::Confirmed)
            }
            _ => {
                let source = self.page_url.clone();
                self.inject(source, InjectionTrigger::HeuristicTimeout)
            }
        }
    }

    /// The only place the viewer is ever installed.
    fn inject(&mut self, source: String, trigger: InjectionTrigger) -> ResolveOutcome {
        if std::mem::replace(&mut self.state.already_injected, true) {
            debug!("[{}] already injected, ignoring {:?}", self.load_id, trigger);
            return ResolveOutcome::Skipped(SkipReason::AlreadyInjected);
        }
        self.state.pending_wait = None;
        self.state.skipped = None;
        self.state.installed = true;

        let viewer_url = self.route.viewer_url_for(&source);
        info!(
            "[{}] injecting viewer for {} ({:?})",
            self.load_id, source, trigger
        );
        self.surface.install(&viewer_url);
        ResolveOutcome::Injected { source, trigger }
    }
}
