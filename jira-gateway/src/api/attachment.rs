use crate::api::utils::ResponseBody;
use crate::errors::{GatewayError, Result};
use crate::service::IssueService;
use futures::TryStreamExt;
use http_body_util::{BodyExt, StreamBody};
use hyper::body::Frame;
use hyper::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};

/// Relays the attachment body frame by frame. When the caller goes away hyper
/// drops the body and with it the upstream connection.
pub async fn handle(
    service: &IssueService,
    issue_key: &str,
    attachment_id: &str,
) -> Result<Response<ResponseBody>> {
    let stream = service.stream_attachment(issue_key, attachment_id).await?;

    let content_type = HeaderValue::from_str(&stream.content_type)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
    let disposition = HeaderValue::from_str(&stream.content_disposition())
        .map_err(|e| GatewayError::Internal(format!("Invalid content disposition: {e}")))?;

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_DISPOSITION, disposition);
    if let Some(length) = stream.content_length {
        builder = builder.header(CONTENT_LENGTH, length);
    }

    let body = StreamBody::new(stream.chunks.map_ok(Frame::data)).boxed_unsync();
    builder
        .body(body)
        .map_err(|e| GatewayError::Internal(format!("Failed to build response: {e}")))
}
