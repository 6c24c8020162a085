use hyper::Method;

/// Endpoints served by the gateway. Path parameters are captured raw and
/// validated by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Index,
    Health,
    Issue {
        issue_key: String,
    },
    Attachment {
        issue_key: String,
        attachment_id: String,
    },
    Tool {
        action: String,
    },
}

impl Route {
    /// Low-cardinality name used for metrics tags.
    pub fn name(&self) -> &'static str {
        match self {
            Route::Index => "index",
            Route::Health => "health",
            Route::Issue { .. } => "issue",
            Route::Attachment { .. } => "attachment",
            Route::Tool { .. } => "tool",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteError {
    NotFound,
    MethodNotAllowed,
}

/// Matches a request line against the known paths. A known path with the
/// wrong method is distinguished from an unknown path.
pub fn match_request(method: &Method, path: &str) -> Result<Route, RouteError> {
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();

    let (route, allowed) = match segments.as_slice() {
        [""] => (Route::Index, Method::GET),
        ["health"] => (Route::Health, Method::GET),
        ["jira", key] if !key.is_empty() => (
            Route::Issue {
                issue_key: key.to_string(),
            },
            Method::GET,
        ),
        ["jira", key, "attachments", id] if !key.is_empty() && !id.is_empty() => (
            Route::Attachment {
                issue_key: key.to_string(),
                attachment_id: id.to_string(),
            },
            Method::GET,
        ),
        ["tools", action] if !action.is_empty() => (
            Route::Tool {
                action: action.to_string(),
            },
            Method::POST,
        ),
        _ => {
            tracing::debug!(method = %method, path, "No route matched");
            return Err(RouteError::NotFound);
        }
    };

    if *method != allowed {
        return Err(RouteError::MethodNotAllowed);
    }

    tracing::debug!(route = route.name(), "Matched route");
    Ok(route)
}
