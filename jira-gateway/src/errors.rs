use crate::upstream::UpstreamError;
use http::StatusCode;
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Errors surfaced by the gateway to its callers.
///
/// Display strings are caller-visible: they never carry credentials or
/// upstream response bodies.
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Invalid issue key: {0:?}, expected format PROJECT-123")]
    InvalidIssueKey(String),

    #[error("Invalid attachment id: {0:?}, expected a numeric id")]
    InvalidAttachmentId(String),

    #[error("Invalid request body: {0}")]
    RequestBody(String),

    #[error("Attachment {attachment_id} not found for issue {issue_key}")]
    AttachmentNotFound {
        issue_key: String,
        attachment_id: String,
    },

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("Attachment stream interrupted")]
    AttachmentStream(#[source] reqwest::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Response serialization error: {0}")]
    ResponseSerialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl GatewayError {
    /// Stable, caller-visible error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidIssueKey(_)
            | GatewayError::InvalidAttachmentId(_)
            | GatewayError::RequestBody(_) => "INVALID_INPUT",
            GatewayError::AttachmentNotFound { .. } => "ATTACHMENT_NOT_FOUND",
            GatewayError::Upstream(e) => e.kind(),
            GatewayError::AttachmentStream(_) => "UPSTREAM_UNAVAILABLE",
            GatewayError::HttpClient(_)
            | GatewayError::ResponseSerialization(_)
            | GatewayError::Internal(_)
            | GatewayError::Io(_) => "INTERNAL",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::InvalidIssueKey(_)
            | GatewayError::InvalidAttachmentId(_)
            | GatewayError::RequestBody(_) => StatusCode::BAD_REQUEST,
            GatewayError::AttachmentNotFound { .. } => StatusCode::NOT_FOUND,
            GatewayError::Upstream(e) => e.status_code(),
            GatewayError::AttachmentStream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::HttpClient(_)
            | GatewayError::ResponseSerialization(_)
            | GatewayError::Internal(_)
            | GatewayError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to return to callers. Internal failures are not described.
    pub fn public_message(&self) -> String {
        match self.status_code() {
            StatusCode::INTERNAL_SERVER_ERROR => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}
