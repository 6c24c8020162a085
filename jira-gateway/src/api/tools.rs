//! Tool-call endpoints. Domain outcomes are reported inside the envelope
//! with HTTP 200; only malformed requests and unknown tools change the status.

use crate::api::utils::{ResponseBody, deserialize_body, json_error, json_response};
use crate::errors::Result;
use crate::issue_key::IssueKey;
use crate::service::IssueService;
use crate::types::NormalizedIssue;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

pub const GET_ISSUE: &str = "jira.get_issue";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GetIssueRequest {
    issue_key: String,
}

#[derive(Debug, Serialize)]
struct ToolError {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
struct ToolResponse {
    ok: bool,
    data: Option<NormalizedIssue>,
    error: Option<ToolError>,
}

pub async fn handle<B>(
    service: &IssueService,
    action: &str,
    req: Request<B>,
) -> Result<Response<ResponseBody>>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    if action != GET_ISSUE {
        return Ok(json_error(
            StatusCode::NOT_FOUND,
            &format!("Unknown tool: {action}"),
            "NOT_FOUND",
        ));
    }

    let request: GetIssueRequest = deserialize_body(req.into_body()).await?;
    // A malformed key is a bad request, not a tool outcome
    let issue_key = request.issue_key.parse::<IssueKey>()?;

    let envelope = match service.get_issue(issue_key.as_str()).await {
        Ok(issue) => ToolResponse {
            ok: true,
            data: Some(issue),
            error: None,
        },
        Err(err) => {
            tracing::info!(tool = GET_ISSUE, kind = err.kind(), error = %err, "Tool call failed");
            ToolResponse {
                ok: false,
                data: None,
                error: Some(ToolError {
                    code: err.kind(),
                    message: err.public_message(),
                }),
            }
        }
    };

    json_response(StatusCode::OK, &envelope)
}
