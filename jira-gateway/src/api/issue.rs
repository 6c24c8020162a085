use crate::api::utils::{ResponseBody, json_response};
use crate::errors::Result;
use crate::service::IssueService;
use hyper::{Response, StatusCode};

pub async fn handle(service: &IssueService, issue_key: &str) -> Result<Response<ResponseBody>> {
    let issue = service.get_issue(issue_key).await?;
    json_response(StatusCode::OK, &issue)
}
