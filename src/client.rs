//! Report client: sends one rendered prompt to the generate-content endpoint
//! and returns the generated text.
//!
//! Transport failures (connection errors, timeouts, non-2xx statuses) are
//! retried with exponential backoff. A 2xx response whose payload does not
//! have the expected shape is an invalid response and is never retried.
//!
//! The credential travels as the `key` query parameter. Transport errors are
//! stripped of their URL before they are rendered, so it never reaches logs
//! or the output table.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::ReportError;

pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TIMEOUT_SEC: u64 = 120;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;

/// Error bodies are cut to this many characters before being kept.
const MAX_ERROR_BODY_CHARS: usize = 500;

/// Request body: `{ "contents": [ { "parts": [ { "text": <prompt> } ] } ] }`.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    contents: Vec<RequestContent>,
}

#[derive(Debug, Clone, Serialize)]
struct RequestContent {
    parts: Vec<RequestPart>,
}

#[derive(Debug, Clone, Serialize)]
struct RequestPart {
    text: String,
}

impl GenerateRequest {
    pub fn new(prompt: &str) -> Self {
        Self {
            contents: vec![RequestContent {
                parts: vec![RequestPart {
                    text: prompt.to_owned(),
                }],
            }],
        }
    }

    /// The prompt text carried by this request.
    pub fn prompt(&self) -> &str {
        self.contents
            .first()
            .and_then(|c| c.parts.first())
            .map_or("", |p| p.text.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

/// A failure to get a 2xx response at all. Always retryable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(String),
}

impl TransportError {
    fn from_reqwest(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Request(err.to_string())
        }
    }
}

/// Per-candidate generation failure; rendered into the output table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerateError {
    #[error("API key is missing")]
    MissingCredential,

    #[error("API request failed after {attempts} attempt(s): {last}")]
    TransportExhausted { attempts: u32, last: TransportError },

    #[error("the API response was invalid: {detail}")]
    InvalidResponse { detail: String },

    #[error("an unexpected error occurred: {0}")]
    Unexpected(String),
}

/// One POST to the generate-content endpoint. Returns the body of a 2xx
/// response; anything else is a [`TransportError`].
pub trait Transport: Send + Sync {
    fn send(&self, request: &GenerateRequest, credential: &str) -> Result<String, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &GenerateRequest, credential: &str) -> Result<String, TransportError> {
        (**self).send(request, credential)
    }
}

/// Attempt budget and backoff base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    /// Wait before the retry that follows attempt `attempt_index` (0-based):
    /// `base_delay * 2^attempt_index`.
    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt_index))
    }
}

/// Blocking HTTP transport for the generate-content API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: Url,
}

impl HttpTransport {
    /// `{base_url}/v1beta/models/{model}:generateContent`, with a per-attempt timeout.
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, ReportError> {
        let invalid = |detail: String| ReportError::InvalidApiBaseUrl {
            url: base_url.to_owned(),
            detail,
        };

        let mut endpoint = Url::parse(base_url).map_err(|e| invalid(e.to_string()))?;
        let method = format!("{model}:generateContent");
        endpoint
            .path_segments_mut()
            .map_err(|()| invalid("URL cannot be used as a base".to_owned()))?
            .pop_if_empty()
            .extend(["v1beta", "models", method.as_str()]);

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ReportError::HttpClientBuild {
                detail: e.to_string(),
            })?;

        Ok(Self { client, endpoint })
    }

    /// Endpoint without the credential.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    fn url_with_key(&self, credential: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("key", credential);
        url
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &GenerateRequest, credential: &str) -> Result<String, TransportError> {
        let response = self
            .client
            .post(self.url_with_key(credential))
            .header(CONTENT_TYPE, "application/json")
            .json(request)
            .send()
            .map_err(TransportError::from_reqwest)?;

        let status = response.status();
        let body = response.text().map_err(TransportError::from_reqwest)?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
                body: truncate(&body, MAX_ERROR_BODY_CHARS),
            })
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &text[..idx]),
        None => text.to_owned(),
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "transport panicked".to_owned()
    }
}

/// Generates report text with retry. Generic over the transport so tests
/// can script responses.
pub struct ReportClient<T = HttpTransport> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: fmt::Debug> fmt::Debug for ReportClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportClient")
            .field("transport", &self.transport)
            .field("policy", &self.policy)
            .finish()
    }
}

impl<T: Transport> ReportClient<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `prompt` and return the generated text.
    ///
    /// An empty credential fails immediately without touching the network.
    pub fn generate(&self, prompt: &str, credential: &str) -> Result<String, GenerateError> {
        if credential.trim().is_empty() {
            return Err(GenerateError::MissingCredential);
        }

        let request = GenerateRequest::new(prompt);
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt_index = 0;

        loop {
            let sent = panic::catch_unwind(AssertUnwindSafe(|| {
                self.transport.send(&request, credential)
            }));
            let result = match sent {
                Ok(result) => result,
                Err(payload) => return Err(GenerateError::Unexpected(panic_message(&*payload))),
            };

            match result {
                Ok(body) => return extract_text(&body),
                Err(err) if attempt_index + 1 >= max_attempts => {
                    return Err(GenerateError::TransportExhausted {
                        attempts: attempt_index + 1,
                        last: err,
                    });
                }
                Err(err) => {
                    let delay = self.policy.delay_for(attempt_index);
                    warn!(
                        attempt = attempt_index + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        err = %err,
                        "generate request failed, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt_index += 1;
                }
            }
        }
    }
}

/// Pull `candidates[0].content.parts[0].text` out of a response body.
fn extract_text(body: &str) -> Result<String, GenerateError> {
    let invalid = |detail: &str| {
        debug!(
            body = %truncate(body, MAX_ERROR_BODY_CHARS),
            "invalid generate response"
        );
        GenerateError::InvalidResponse {
            detail: detail.to_owned(),
        }
    };

    let parsed: GenerateResponse = serde_json::from_str(body)
        .map_err(|e| invalid(&format!("response is not the expected JSON: {e}")))?;
    let candidate = parsed
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| invalid("response contains no candidates"))?;

    candidate
        .content
        .and_then(|c| c.parts.into_iter().next())
        .and_then(|p| p.text)
        .ok_or_else(|| invalid("could not extract text from candidates[0].content.parts[0]"))
}
