//! PDF interception coordinator.
//!
//! A long-lived [`coordinator`] decides from navigation, response-header and
//! tab-lifecycle events which browsing contexts hold a PDF, and answers the
//! per-page [`agent`]s that replace the page with a viewer at most once.
//! The [`host`] module carries the JSON-lines protocol spoken with the
//! browser; [`utils`] holds the classifier, source cache and byte fetcher.

pub mod agent;
pub mod config;
pub mod coordinator;
pub mod embedded;
pub mod host;
pub mod utils;

pub use agent::resolver::{InjectionResolver, InjectionTrigger, ResolveOutcome, ViewerSurface};
pub use agent::viewer::{ErrorAffordance, ViewerSession, ViewerState};
pub use config::InterceptorConfig;
pub use coordinator::detection::{Coordinator, DetectionPhase, DetectionSignal};
pub use coordinator::service::{CoordinatorHandle, LinkError};
pub use embedded::EmbeddedInterceptor;
pub use utils::classifier::{classify_headers, classify_url, ResponseHeader};
pub use utils::fetcher::{ByteFetcher, FetchError, FetchOutcome, FetchedPdf, RetryPolicy};
