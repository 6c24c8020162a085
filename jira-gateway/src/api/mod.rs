pub mod attachment;
pub mod health;
pub mod index;
pub mod issue;
pub mod tools;
pub mod utils;

use crate::router::{Route, RouteError, match_request};
use crate::service::IssueService;
use hyper::body::Body;
use hyper::{Request, Response, StatusCode};
use utils::{ResponseBody, error_response, json_error};

/// Routes and serves one request. Every failure becomes a JSON error
/// response, so this never fails itself.
pub async fn handle<B>(service: &IssueService, req: Request<B>) -> Response<ResponseBody>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let route = match_request(req.method(), req.uri().path());
    dispatch(service, route, req).await
}

pub async fn dispatch<B>(
    service: &IssueService,
    route: Result<Route, RouteError>,
    req: Request<B>,
) -> Response<ResponseBody>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let route = match route {
        Ok(route) => route,
        Err(RouteError::NotFound) => {
            return json_error(StatusCode::NOT_FOUND, "Not Found", "NOT_FOUND");
        }
        Err(RouteError::MethodNotAllowed) => {
            return json_error(
                StatusCode::METHOD_NOT_ALLOWED,
                "Method Not Allowed",
                "METHOD_NOT_ALLOWED",
            );
        }
    };

    let result = match route {
        Route::Index => index::handle(),
        Route::Health => health::handle(),
        Route::Issue { issue_key } => issue::handle(service, &issue_key).await,
        Route::Attachment {
            issue_key,
            attachment_id,
        } => attachment::handle(service, &issue_key, &attachment_id).await,
        Route::Tool { action } => tools::handle(service, &action, req).await,
    };

    result.unwrap_or_else(|err| error_response(&err))
}
