use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::detection::Coordinator;
use crate::host::types::{
    AgentRequest, FetchPdfReply, HostEvent, PdfUrlReply, ShouldInjectReply,
};
use crate::utils::fetcher::FetchOutcome;
use crate::utils::source_cache::ContextId;

const COMMAND_BUFFER: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The coordinator is gone, e.g. the owning extension was reloaded under
    /// a still-running page agent.
    #[error("Coordinator messaging unavailable")]
    MessagingUnavailable,
    #[error("Could not encode reply: {0}")]
    ReplyEncoding(String),
}

enum Command {
    Event(HostEvent),
    ResolveSource {
        context_id: ContextId,
        fallback: Option<String>,
        reply: oneshot::Sender<Option<String>>,
    },
    ShouldInject {
        context_id: ContextId,
        fallback: Option<String>,
        reply: oneshot::Sender<ShouldInjectReply>,
    },
    Fetch {
        url: Option<String>,
        reply: oneshot::Sender<FetchOutcome>,
    },
}

/// Call-and-reply channel into the coordinator task. Cheap to clone; one per
/// page agent.
#[derive(Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::Sender<Command>,
}

impl CoordinatorHandle {
    pub async fn dispatch(&self, event: HostEvent) -> Result<(), LinkError> {
        self.tx
            .send(Command::Event(event))
            .await
            .map_err(|_| LinkError::MessagingUnavailable)
    }

    pub async fn resolve_source(
        &self,
        context_id: ContextId,
        fallback: Option<String>,
    ) -> Result<Option<String>, LinkError> {
        self.call(|reply| Command::ResolveSource {
            context_id,
            fallback,
            reply,
        })
        .await
    }

    pub async fn should_inject(
        &self,
        context_id: ContextId,
        fallback: Option<String>,
    ) -> Result<ShouldInjectReply, LinkError> {
        self.call(|reply| Command::ShouldInject {
            context_id,
            fallback,
            reply,
        })
        .await
    }

    pub async fn request_fetch(&self, url: Option<String>) -> Result<FetchOutcome, LinkError> {
        self.call(|reply| Command::Fetch { url, reply }).await
    }

    /// Answers a framed agent request with its JSON reply body.
    pub async fn answer(
        &self,
        context_id: ContextId,
        request: AgentRequest,
    ) -> Result<Value, LinkError> {
        match request {
            AgentRequest::GetPdfUrl { url } => {
                let pdf_url = self.resolve_source(context_id, url).await?;
                encode_reply(PdfUrlReply { pdf_url })
            }
            AgentRequest::ShouldInjectPdf { url } => {
                encode_reply(self.should_inject(context_id, url).await?)
            }
            AgentRequest::FetchPdf { url } => {
                let reply: FetchPdfReply = self.request_fetch(url).await?.into();
                encode_reply(reply)
            }
        }
    }

    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, LinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| LinkError::MessagingUnavailable)?;
        reply_rx.await.map_err(|_| LinkError::MessagingUnavailable)
    }
}

fn encode_reply<T: Serialize>(reply: T) -> Result<Value, LinkError> {
    serde_json::to_value(reply).map_err(|e| {
        error!("Failed to serialize agent reply: {}", e);
        LinkError::ReplyEncoding(e.to_string())
    })
}

/// Moves the coordinator onto its own task. The task ends once every handle
/// has been dropped.
pub fn spawn(coordinator: Coordinator) -> (CoordinatorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    let task = tokio::spawn(run(coordinator, rx));
    (CoordinatorHandle { tx }, task)
}

async fn run(mut coordinator: Coordinator, mut rx: mpsc::Receiver<Command>) {
    coordinator.start();
    info!("Coordinator started");

    while let Some(command) = rx.recv().await {
        match command {
            Command::Event(event) => {
                debug!("Host event: {:?}", event);
                coordinator.handle_event(event);
            }
            Command::ResolveSource {
                context_id,
                fallback,
                reply,
            } => {
                let _ = reply.send(coordinator.resolve_source(context_id, fallback.as_deref()));
            }
            Command::ShouldInject {
                context_id,
                fallback,
                reply,
            } => {
                let _ = reply.send(coordinator.should_inject(context_id, fallback.as_deref()));
            }
            Command::Fetch { url, reply } => {
                // Enablement is decided here; the transfer itself must not
                // hold up event processing.
                let job = coordinator.request_fetch(url);
                tokio::spawn(async move {
                    let _ = reply.send(job.await);
                });
            }
        }
    }

    info!("Coordinator stopped");
}
