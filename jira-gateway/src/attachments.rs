//! Streams attachment content from Jira to the caller chunk by chunk.

use crate::errors::{GatewayError, Result};
use crate::issue_key::IssueKey;
use crate::metrics_defs::{ATTACHMENT_BYTES, ATTACHMENT_STREAMS_ACTIVE};
use crate::types::AttachmentSource;
use crate::upstream::{UpstreamClient, UpstreamError};
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use http::{StatusCode, header};
use shared::{counter, gauge};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// An opened attachment download.
///
/// `chunks` reads straight from the upstream connection. It can be consumed
/// once, and dropping it closes the connection.
pub struct AttachmentStream {
    pub content_type: String,
    pub content_length: Option<u64>,
    pub filename: String,
    pub chunks: BoxStream<'static, Result<Bytes>>,
}

impl AttachmentStream {
    pub fn content_disposition(&self) -> String {
        format!("attachment; filename=\"{}\"", self.filename)
    }
}

impl std::fmt::Debug for AttachmentStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttachmentStream")
            .field("content_type", &self.content_type)
            .field("content_length", &self.content_length)
            .field("filename", &self.filename)
            .finish_non_exhaustive()
    }
}

/// Opens the upstream content for an attachment already known to belong to
/// `issue_key`. Opening is retried; failures after the first byte are not.
pub async fn open(
    client: &UpstreamClient,
    issue_key: &IssueKey,
    source: &AttachmentSource,
) -> Result<AttachmentStream> {
    let response = client.open_attachment(source).await.map_err(|err| match err {
        UpstreamError::ClientError {
            status: StatusCode::NOT_FOUND,
        } => GatewayError::AttachmentNotFound {
            issue_key: issue_key.to_string(),
            attachment_id: source.id.clone(),
        },
        other => GatewayError::Upstream(other),
    })?;

    let headers = response.headers();
    let content_type = pick_content_type(
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        source.mime_type.as_deref(),
    );
    let content_length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    let filename = sanitize_filename(source.filename.as_deref(), &source.id);

    tracing::info!(
        issue_key = %issue_key,
        attachment_id = %source.id,
        content_type = %content_type,
        content_length,
        "Streaming attachment"
    );

    let guard = ActiveStream::new();
    let attachment_id = source.id.clone();
    let chunks = response
        .bytes_stream()
        .map(move |chunk| {
            let _active = &guard;
            match chunk {
                Ok(bytes) => {
                    counter!(ATTACHMENT_BYTES).increment(bytes.len() as u64);
                    Ok(bytes)
                }
                Err(err) => {
                    tracing::warn!(
                        attachment_id = %attachment_id,
                        error = %err,
                        "Attachment stream interrupted"
                    );
                    Err(GatewayError::AttachmentStream(err))
                }
            }
        })
        .boxed();

    Ok(AttachmentStream {
        content_type,
        content_length,
        filename,
        chunks,
    })
}

/// Tracks a live download in the active-streams gauge until dropped.
struct ActiveStream;

impl ActiveStream {
    fn new() -> Self {
        gauge!(ATTACHMENT_STREAMS_ACTIVE).increment(1.0);
        ActiveStream
    }
}

impl Drop for ActiveStream {
    fn drop(&mut self) {
        gauge!(ATTACHMENT_STREAMS_ACTIVE).decrement(1.0);
    }
}

fn pick_content_type(upstream: Option<&str>, metadata: Option<&str>) -> String {
    [upstream, metadata]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|value| !value.is_empty())
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Filename safe to put in a quoted header parameter.
fn sanitize_filename(filename: Option<&str>, attachment_id: &str) -> String {
    let cleaned: String = filename
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' ') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim().trim_start_matches('.');

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '_') {
        format!("attachment-{attachment_id}")
    } else {
        cleaned.to_string()
    }
}
