use crate::api::utils::{ResponseBody, full_body};
use crate::errors::{GatewayError, Result};
use hyper::header::{CACHE_CONTROL, CONTENT_TYPE};
use hyper::{Response, StatusCode};

const INDEX_HTML: &str = include_str!("../../assets/index.html");

/// Single-page issue viewer backed by `GET /jira/{issue_key}`.
pub fn handle() -> Result<Response<ResponseBody>> {
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "text/html; charset=utf-8")
        .header(CACHE_CONTROL, "no-cache")
        .body(full_body(INDEX_HTML))
        .map_err(|e| GatewayError::Internal(format!("Failed to build response: {e}")))
}
