use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{header, Client};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_millis(200);

const LOCAL_FILE_SCHEME: &str = "file";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP error {status}")]
    Http { status: u16 },

    #[error("No PDF source available")]
    NoSourceAvailable,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Failed after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: Box<FetchError> },

    #[error("PDF interception is disabled")]
    Disabled,
}

impl FetchError {
    /// Stable machine-readable tag carried next to the human message.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Http { .. } => "http",
            FetchError::NoSourceAvailable => "no-source",
            FetchError::InvalidUrl(_) => "invalid-url",
            FetchError::Exhausted { .. } => "exhausted",
            FetchError::Disabled => "disabled",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Network(_) | FetchError::Http { .. })
    }
}

/// Successful read: the exact body plus its content-type ("" when absent).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedPdf {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

pub type FetchOutcome = Result<FetchedPdf, FetchError>;

/// Raw response of a single read attempt.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

/// One network (or local) read of a whole resource. Implementations must not
/// retry on their own.
pub trait ByteSource: Send + Sync {
    fn read<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<RawResponse, FetchError>>;
}

/// Reads `http(s)` through a cookie-carrying reqwest client and `file:` from
/// the local disk.
pub struct HttpByteSource {
    client: Client,
}

impl HttpByteSource {
    pub fn new() -> Result<Self, FetchError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| FetchError::Network(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    async fn read_remote(&self, url: &Url) -> Result<RawResponse, FetchError> {
        let response = self
            .client
            .get(url.as_str())
            .header(header::ACCEPT, "application/pdf,*/*")
            .send()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|ct| ct.to_string());

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Network(format!("Failed to read response body: {}", e)))?;

        Ok(RawResponse {
            status,
            content_type,
            body: body.to_vec(),
        })
    }

    async fn read_local(&self, url: &Url) -> Result<RawResponse, FetchError> {
        let path = url
            .to_file_path()
            .map_err(|_| FetchError::InvalidUrl(url.to_string()))?;
        let body = tokio::fs::read(&path)
            .await
            .map_err(|e| FetchError::Network(format!("{}: {}", path.display(), e)))?;

        Ok(RawResponse {
            status: 200,
            content_type: None,
            body,
        })
    }
}

impl ByteSource for HttpByteSource {
    fn read<'a>(&'a self, url: &'a Url) -> BoxFuture<'a, Result<RawResponse, FetchError>> {
        Box::pin(async move {
            if url.scheme() == LOCAL_FILE_SCHEME {
                self.read_local(url).await
            } else {
                self.read_remote(url).await
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }
}

impl RetryPolicy {
    /// Linear backoff: attempt 1 waits one step, attempt 2 two steps.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff_step
            .checked_mul(attempt)
            .unwrap_or(Duration::MAX)
    }
}

/// Bounded-retry byte fetcher. Every call re-reads the resource; nothing is
/// cached between calls.
#[derive(Clone)]
pub struct ByteFetcher {
    source: Arc<dyn ByteSource>,
    policy: RetryPolicy,
}

impl ByteFetcher {
    pub fn new(source: Arc<dyn ByteSource>, policy: RetryPolicy) -> Self {
        Self { source, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub async fn fetch(&self, url: Option<&str>) -> FetchOutcome {
        let raw_url = match url.map(str::trim).filter(|u| !u.is_empty()) {
            Some(u) => u,
            None => return Err(FetchError::NoSourceAvailable),
        };
        let url = Url::parse(raw_url).map_err(|_| FetchError::InvalidUrl(raw_url.to_string()))?;

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            debug!("Fetching {} (attempt {}/{})", url, attempt, max_attempts);

            let error = match self.source.read(&url).await {
                Ok(response) if (200..300).contains(&response.status) => {
                    info!(
                        "Fetched {} bytes from {} on attempt {}",
                        response.body.len(),
                        url,
                        attempt
                    );
                    return Ok(FetchedPdf {
                        bytes: response.body,
                        content_type: response.content_type.unwrap_or_default(),
                    });
                }
                Ok(response) => FetchError::Http {
                    status: response.status,
                },
                Err(e) => e,
            };

            warn!("Fetch attempt {} for {} failed: {}", attempt, url, error);

            // Retrying a local read or a structural failure will not change anything
            if url.scheme() == LOCAL_FILE_SCHEME
                || !error.is_transient()
                || attempt >= max_attempts
            {
                return Err(FetchError::Exhausted {
                    attempts: attempt,
                    last: Box::new(error),
                });
            }

            tokio::time::sleep(self.policy.delay_after(attempt)).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Plays back a fixed list of attempt results and counts reads.
    pub(crate) struct ScriptedSource {
        script: Mutex<VecDeque<Result<RawResponse, FetchError>>>,
        read_count: Mutex<u32>,
    }

    impl ScriptedSource {
        pub(crate) fn new(script: Vec<Result<RawResponse, FetchError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                read_count: Mutex::new(0),
            })
        }

        pub(crate) fn reads(&self) -> u32 {
            *self.read_count.lock().unwrap()
        }
    }

    impl ByteSource for ScriptedSource {
        fn read<'a>(&'a self, _url: &'a Url) -> BoxFuture<'a, Result<RawResponse, FetchError>> {
            *self.read_count.lock().unwrap() += 1;
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::Network("script exhausted".to_string())));
            Box::pin(async move { next })
        }
    }

    pub(crate) fn pdf_response(body: &[u8]) -> Result<RawResponse, FetchError> {
        Ok(RawResponse {
            status: 200,
            content_type: Some("application/pdf".to_string()),
            body: body.to_vec(),
        })
    }

    fn fetcher(source: Arc<ScriptedSource>) -> ByteFetcher {
        ByteFetcher::new(source, RetryPolicy::default())
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_third_attempt_after_linear_backoff() {
        let source = ScriptedSource::new(vec![
            Err(FetchError::Network("connection reset".to_string())),
            Ok(RawResponse {
                status: 503,
                content_type: None,
                body: Vec::new(),
            }),
            pdf_response(b"%PDF-1.4 body"),
        ]);
        let fetcher = fetcher(source.clone());

        let started = Instant::now();
        let fetched = fetcher.fetch(Some("https://site/doc.pdf")).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(fetched.bytes, b"%PDF-1.4 body");
        assert_eq!(fetched.content_type, "application/pdf");
        assert_eq!(source.reads(), 3);
        assert!(elapsed >= Duration::from_millis(600), "{:?}", elapsed);
        assert!(elapsed < Duration::from_millis(650), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn local_file_failure_is_not_retried() {
        let source = ScriptedSource::new(vec![Err(FetchError::Network(
            "permission denied".to_string(),
        ))]);
        let fetcher = fetcher(source.clone());

        let started = Instant::now();
        let error = fetcher
            .fetch(Some("file:///tmp/missing.pdf"))
            .await
            .unwrap_err();

        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(source.reads(), 1);
        match error {
            FetchError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 1);
                assert_eq!(*last, FetchError::Network("permission denied".to_string()));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_three_attempts_with_last_error() {
        let source = ScriptedSource::new(vec![
            Err(FetchError::Network("timeout".to_string())),
            Err(FetchError::Network("timeout".to_string())),
            Ok(RawResponse {
                status: 404,
                content_type: Some("text/html".to_string()),
                body: b"not found".to_vec(),
            }),
            pdf_response(b"%PDF-never-read"),
        ]);
        let fetcher = fetcher(source.clone());

        let error = fetcher
            .fetch(Some("https://site/gone.pdf"))
            .await
            .unwrap_err();

        assert_eq!(source.reads(), 3);
        assert_eq!(error.kind(), "exhausted");
        assert_eq!(
            error,
            FetchError::Exhausted {
                attempts: 3,
                last: Box::new(FetchError::Http { status: 404 }),
            }
        );
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_step: Duration::from_millis(u64::MAX),
        };
        assert_eq!(policy.delay_after(2), Duration::MAX);
        assert_eq!(
            RetryPolicy::default().delay_after(2),
            Duration::from_millis(400)
        );
    }

    #[tokio::test]
    async fn missing_url_fails_without_reading() {
        let source = ScriptedSource::new(vec![pdf_response(b"%PDF-")]);
        let fetcher = fetcher(source.clone());

        assert_eq!(
            fetcher.fetch(None).await.unwrap_err(),
            FetchError::NoSourceAvailable
        );
        assert_eq!(
            fetcher.fetch(Some("  ")).await.unwrap_err(),
            FetchError::NoSourceAvailable
        );
        assert_eq!(source.reads(), 0);
    }

    #[tokio::test]
    async fn bytes_are_preserved_exactly() {
        let body: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let source = ScriptedSource::new(vec![Ok(RawResponse {
            status: 200,
            content_type: None,
            body: body.clone(),
        })]);

        let fetched = fetcher(source)
            .fetch(Some("https://site/binary.pdf"))
            .await
            .unwrap();

        assert_eq!(fetched.bytes.len(), 4096);
        assert_eq!(fetched.bytes, body);
        assert_eq!(fetched.content_type, "");
    }

    #[tokio::test]
    async fn reads_local_files_from_disk() {
        let path = std::env::temp_dir().join(format!("pdf-interceptor-{}.pdf", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"%PDF-1.7 local").await.unwrap();
        let url = Url::from_file_path(&path).unwrap();

        let fetcher = ByteFetcher::new(Arc::new(HttpByteSource::new().unwrap()), RetryPolicy::default());
        let fetched = fetcher.fetch(Some(url.as_str())).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(fetched.bytes, b"%PDF-1.7 local");
        assert_eq!(fetched.content_type, "");
    }
}
