pub mod api;
pub mod attachments;
pub mod cache;
pub mod config;
pub mod errors;
pub mod issue_key;
pub mod metrics_defs;
pub mod normalize;
pub mod retry;
pub mod router;
pub mod service;
pub mod types;
pub mod upstream;

#[cfg(test)]
mod testutils;

use crate::api::utils::ResponseBody;
use crate::errors::GatewayError;
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS_INFLIGHT};
use crate::router::match_request;
use crate::service::IssueService;
use hyper::body::Incoming;
use hyper::service::Service;
use hyper::{Request, Response};
use shared::http::run_http_service;
use shared::{gauge, histogram};
use std::pin::Pin;
use std::time::Instant;

pub async fn run(config: config::Config) -> Result<(), GatewayError> {
    let service = IssueService::from_config(&config)?;
    tracing::info!(
        base_url = %config.upstream.base_url,
        cache_enabled = config.cache.enabled,
        cache_ttl_secs = config.cache.ttl_secs,
        max_attempts = config.retry.max_attempts,
        "Starting Jira gateway"
    );

    let gateway_service = GatewayService { service };
    run_http_service(
        &config.listener.host,
        config.listener.port,
        gateway_service,
    )
    .await
}

pub struct GatewayService {
    service: IssueService,
}

impl Service<Request<Incoming>> for GatewayService {
    type Response = Response<ResponseBody>;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let service = self.service.clone();

        Box::pin(async move {
            let _inflight = Inflight::new();
            let started = Instant::now();
            let method = req.method().clone();
            let path = req.uri().path().to_string();

            let route = match_request(&method, &path);
            let route_name = route.as_ref().map_or("unmatched", |r| r.name());
            let response = api::dispatch(&service, route, req).await;

            let status = response.status();
            histogram!(
                REQUEST_DURATION,
                "status" => status.as_str().to_owned(),
                "route" => route_name
            )
            .record(started.elapsed().as_secs_f64());
            tracing::info!(
                method = %method,
                path = %path,
                status = status.as_u16(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Handled request"
            );

            Ok(response)
        })
    }
}

/// Counts a request in the inflight gauge until it completes or is dropped.
struct Inflight;

impl Inflight {
    fn new() -> Self {
        gauge!(REQUESTS_INFLIGHT).increment(1.0);
        Inflight
    }
}

impl Drop for Inflight {
    fn drop(&mut self) {
        gauge!(REQUESTS_INFLIGHT).decrement(1.0);
    }
}
