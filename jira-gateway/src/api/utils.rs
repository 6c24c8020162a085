use crate::errors::{GatewayError, Result};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{CONTENT_TYPE, HeaderValue};
use hyper::{Response, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use shared::http::make_error_response;

pub type ResponseBody = UnsyncBoxBody<Bytes, GatewayError>;

/// Upper bound for JSON request bodies.
const MAX_REQUEST_BODY: usize = 64 * 1024;

#[derive(Serialize)]
struct ErrorBody<'a> {
    detail: &'a str,
    kind: &'a str,
}

/// Reads and deserializes a bounded JSON request body.
pub async fn deserialize_body<T, B>(body: B) -> Result<T>
where
    T: DeserializeOwned,
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let bytes = Limited::new(body, MAX_REQUEST_BODY)
        .collect()
        .await
        .map_err(|e| GatewayError::RequestBody(e.to_string()))?
        .to_bytes();
    serde_json::from_slice(&bytes).map_err(|e| GatewayError::RequestBody(e.to_string()))
}

pub fn full_body(bytes: impl Into<Bytes>) -> ResponseBody {
    Full::new(bytes.into()).map_err(|e| match e {}).boxed_unsync()
}

/// Serializes `value` as the JSON body of a response with `status`.
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Result<Response<ResponseBody>> {
    let bytes = serde_json::to_vec(value)?;
    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
        .body(full_body(bytes))
        .map_err(|e| GatewayError::Internal(format!("Failed to build response: {e}")))
}

/// JSON error document `{"detail": ..., "kind": ...}`.
pub fn json_error(status: StatusCode, detail: &str, kind: &str) -> Response<ResponseBody> {
    json_response(status, &ErrorBody { detail, kind }).unwrap_or_else(|err| {
        tracing::error!(error = %err, "Failed to build error response");
        make_error_response(status)
    })
}

pub fn error_response(err: &GatewayError) -> Response<ResponseBody> {
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!(kind = err.kind(), error = %err, "Request failed");
    } else {
        tracing::info!(kind = err.kind(), status = status.as_u16(), error = %err, "Request rejected");
    }
    json_error(status, &err.public_message(), err.kind())
}

#[cfg(test)]
pub async fn read_json(response: Response<ResponseBody>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
