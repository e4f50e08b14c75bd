use serde::{Deserialize, Serialize};

use crate::utils::classifier::ResponseHeader;
use crate::utils::fetcher::{FetchError, FetchOutcome};
use crate::utils::source_cache::ContextId;

/// Navigation start/commit notification. Only `frameDepth == 0` (the
/// top-level document) is ever acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEvent {
    pub context_id: ContextId,
    pub url: String,
    #[serde(default)]
    pub frame_depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEvent {
    pub context_id: ContextId,
    pub url: String,
    #[serde(default)]
    pub frame_depth: u32,
    #[serde(default)]
    pub response_headers: Vec<ResponseHeader>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadEvent {
    pub download_id: u64,
    pub url: String,
    #[serde(default)]
    pub mime: String,
}

/// Lifecycle and detection events pushed by the host event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum HostEvent {
    NavigationStarted(NavigationEvent),
    NavigationCommitted(NavigationEvent),
    ResponseReceived(ResponseEvent),
    ContextDestroyed { context_id: ContextId },
    ToggleClicked,
    DownloadStarted(DownloadEvent),
    TabCompleted(NavigationEvent),
}

/// Requests a page agent (or the viewer) sends to the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AgentRequest {
    GetPdfUrl {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    ShouldInjectPdf {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
    FetchPdf {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },
}

/// Agent request as framed by the host: the reply must echo `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentFrame {
    pub id: serde_json::Value,
    pub context_id: ContextId,
    pub request: AgentRequest,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Event(HostEvent),
    Agent(AgentFrame),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfUrlReply {
    pub pdf_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShouldInjectReply {
    pub should_inject: bool,
    pub extension_enabled: bool,
    pub pdf_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchPdfReply {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

impl FetchPdfReply {
    pub fn failure(error: &FetchError) -> Self {
        Self {
            success: false,
            data: None,
            content_type: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind().to_string()),
        }
    }
}

impl From<FetchOutcome> for FetchPdfReply {
    fn from(outcome: FetchOutcome) -> Self {
        match outcome {
            Ok(fetched) => Self {
                success: true,
                data: Some(fetched.bytes),
                content_type: Some(fetched.content_type),
                error: None,
                error_kind: None,
            },
            Err(e) => Self::failure(&e),
        }
    }
}

/// Unsolicited coordinator -> agent notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum AgentPush {
    PdfDetected { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub text: String,
    pub color: String,
}

/// Everything the coordinator asks the host to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum HostCommand {
    Response {
        id: serde_json::Value,
        result: serde_json::Value,
    },
    Push {
        context_id: ContextId,
        message: AgentPush,
    },
    SetRulesets {
        enable: Vec<String>,
        disable: Vec<String>,
    },
    SetBadge(Badge),
    RedirectTab {
        context_id: ContextId,
        url: String,
    },
    OpenViewer {
        download_id: u64,
        url: String,
    },
}
