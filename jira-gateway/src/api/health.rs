use crate::api::utils::{ResponseBody, json_response};
use crate::errors::Result;
use hyper::{Response, StatusCode};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

/// Liveness only: never calls Jira.
pub fn handle() -> Result<Response<ResponseBody>> {
    json_response(StatusCode::OK, &HealthResponse { status: "ok" })
}
