//! Authenticated, timeout-bounded access to the Jira REST API.

use crate::config::Config;
use crate::errors::GatewayError;
use crate::issue_key::IssueKey;
use crate::metrics_defs::UPSTREAM_REQUEST_DURATION;
use crate::retry::{RetryError, RetryPolicy};
use crate::types::AttachmentSource;
use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use shared::histogram;
use std::future::Future;
use std::time::Instant;
use thiserror::Error;
use url::Url;

const ISSUE_EXPAND: &str = "renderedFields,changelog";
const BODY_EXCERPT_CHARS: usize = 300;
const BODY_EXCERPT_BYTES: usize = 1024;

/// Failure of a single upstream call, after retries where they apply.
///
/// Cloneable so a failed computation can be handed to every caller waiting
/// on the same cache key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpstreamError {
    #[error("{}", describe_client_error(.status))]
    ClientError { status: StatusCode },

    #[error("Transient upstream failure: {reason}")]
    Transient { status: Option<u16>, reason: String },

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Jira is unavailable after {attempts} attempt(s)")]
    Unavailable { attempts: u32, timed_out: bool },

    #[error("Malformed upstream payload: {0}")]
    MalformedPayload(String),
}

fn describe_client_error(status: &StatusCode) -> String {
    match *status {
        StatusCode::NOT_FOUND => "Issue not found".to_string(),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            format!("Jira rejected the configured credentials ({})", status.as_u16())
        }
        _ => format!("Jira rejected the request ({})", status.as_u16()),
    }
}

impl UpstreamError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, UpstreamError::Transient { .. } | UpstreamError::Timeout)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            UpstreamError::ClientError { status } => match *status {
                StatusCode::NOT_FOUND => "NOT_FOUND",
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "UNAUTHORIZED",
                _ => "UPSTREAM_CLIENT_ERROR",
            },
            UpstreamError::Transient { .. }
            | UpstreamError::Timeout
            | UpstreamError::Unavailable { .. } => "UPSTREAM_UNAVAILABLE",
            UpstreamError::MalformedPayload(_) => "MALFORMED_UPSTREAM_PAYLOAD",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            UpstreamError::ClientError { status } => match *status {
                StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    *status
                }
                _ => StatusCode::BAD_GATEWAY,
            },
            UpstreamError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
            UpstreamError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            UpstreamError::Unavailable { timed_out, .. } => {
                if *timed_out {
                    StatusCode::GATEWAY_TIMEOUT
                } else {
                    StatusCode::SERVICE_UNAVAILABLE
                }
            }
            UpstreamError::MalformedPayload(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Transient {
                status: err.status().map(|s| s.as_u16()),
                reason: err.without_url().to_string(),
            }
        }
    }

    fn outcome(result: &Result<impl Sized, UpstreamError>) -> &'static str {
        match result {
            Ok(_) => "success",
            Err(UpstreamError::ClientError { .. }) => "client_error",
            Err(UpstreamError::Timeout) => "timeout",
            Err(_) => "transient",
        }
    }
}

/// Raw issue response, fully read.
#[derive(Clone, Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: Url,
    email: String,
    api_token: String,
    retry: RetryPolicy,
}

impl UpstreamClient {
    pub fn new(config: &Config) -> Result<Self, GatewayError> {
        let upstream = &config.upstream;
        let client = reqwest::Client::builder()
            .connect_timeout(upstream.connect_timeout())
            .read_timeout(upstream.read_timeout())
            .user_agent(concat!("jira-relay/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(UpstreamClient {
            client,
            base_url: upstream.base_url.clone(),
            email: upstream.email.clone(),
            api_token: upstream.api_token.clone(),
            retry: RetryPolicy::new(config.retry.max_attempts, config.retry.backoff()),
        })
    }

    fn base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .basic_auth(&self.email, Some(&self.api_token))
    }

    /// Fetches the issue with its rendered fields and changelog. The body is
    /// read inside each attempt, so a stalled body is retried like a stalled
    /// connect.
    pub async fn fetch_issue(&self, key: &IssueKey) -> Result<UpstreamResponse, UpstreamError> {
        let url = format!(
            "{}/rest/api/3/issue/{}?expand={}",
            self.base(),
            key,
            ISSUE_EXPAND
        );
        let url = url.as_str();

        self.call("issue", move || async move {
            let response = self
                .get(url)
                .header(header::ACCEPT, "application/json")
                .send()
                .await
                .map_err(UpstreamError::from_transport)?;
            let response = self.check_status(response).await?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(UpstreamError::from_transport)?;

            Ok(UpstreamResponse {
                status,
                headers,
                body,
            })
        })
        .await
    }

    /// Opens the attachment content. Only the response head is awaited; the
    /// body is left on the connection for the caller to stream.
    pub async fn open_attachment(
        &self,
        source: &AttachmentSource,
    ) -> Result<reqwest::Response, UpstreamError> {
        let url = self.attachment_url(source);
        let url = url.as_str();

        self.call("attachment", move || async move {
            let response = self
                .get(url)
                .send()
                .await
                .map_err(UpstreamError::from_transport)?;
            self.check_status(response).await
        })
        .await
    }

    /// Credentials only go to the configured site: a content URL on any other
    /// origin is replaced by the REST content endpoint.
    pub fn attachment_url(&self, source: &AttachmentSource) -> String {
        if let Some(content_url) = source.content_url.as_deref()
            && let Ok(parsed) = Url::parse(content_url)
            && parsed.origin() == self.base_url.origin()
        {
            return parsed.into();
        }

        format!(
            "{}/rest/api/3/attachment/content/{}",
            self.base(),
            source.id
        )
    }

    async fn check_status(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, UpstreamError> {
        let status = response.status();

        if status.is_server_error() {
            return Err(UpstreamError::Transient {
                status: Some(status.as_u16()),
                reason: format!("Jira responded with {}", status.as_u16()),
            });
        }

        if status.is_client_error() {
            if !matches!(
                status,
                StatusCode::NOT_FOUND | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
            ) {
                let url = response.url().path().to_string();
                let excerpt = body_excerpt(response).await;
                tracing::error!(
                    status = status.as_u16(),
                    path = %url,
                    body = %excerpt,
                    "Unexpected client error from Jira"
                );
            }
            return Err(UpstreamError::ClientError { status });
        }

        Ok(response)
    }

    /// Runs one logical upstream call under the retry policy, timing every
    /// attempt.
    async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        mut attempt_fn: F,
    ) -> Result<T, UpstreamError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, UpstreamError>>,
    {
        let result = self
            .retry
            .run(UpstreamError::is_retryable, |attempt| {
                let fut = attempt_fn();
                async move {
                    let started = Instant::now();
                    let result = fut.await;
                    histogram!(
                        UPSTREAM_REQUEST_DURATION,
                        "operation" => operation,
                        "outcome" => UpstreamError::outcome(&result)
                    )
                    .record(started.elapsed().as_secs_f64());

                    if let Err(err) = &result {
                        tracing::debug!(operation, attempt, error = %err, "Upstream attempt failed");
                    }
                    result
                }
            })
            .await;

        result.map_err(|err| match err {
            RetryError::Permanent(err) => err,
            RetryError::Exhausted { attempts, last } => UpstreamError::Unavailable {
                attempts,
                timed_out: last == UpstreamError::Timeout,
            },
        })
    }
}

/// Leading characters of an error body. At most `BODY_EXCERPT_BYTES` are read
/// off the connection; the rest is discarded with the response.
async fn body_excerpt(mut response: reqwest::Response) -> String {
    let mut buf = Vec::new();
    while buf.len() < BODY_EXCERPT_BYTES {
        match response.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            _ => break,
        }
    }
    buf.truncate(BODY_EXCERPT_BYTES);

    String::from_utf8_lossy(&buf)
        .chars()
        .take(BODY_EXCERPT_CHARS)
        .collect()
}
