//! Prometheus metrics for stash-server.
//!
//! Exposes request counters and latencies at the health listener's `/metrics`
//! endpoint.

use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::{Duration, Instant};

/// Install the Prometheus recorder and return a handle for rendering.
///
/// Call once at startup, before any metrics are recorded.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(
        "stash_http_requests_total",
        "Total number of HTTP requests processed"
    );
    describe_histogram!(
        "stash_http_request_duration_seconds",
        "Duration of HTTP requests in seconds"
    );
    describe_counter!(
        "stash_http_errors_total",
        "Total number of HTTP requests answered with an error status"
    );

    Ok(handle)
}

pub fn record_request(route: String, method: String, status: u16, duration: Duration) {
    let outcome = if status < 400 { "ok" } else { "error" };
    counter!(
        "stash_http_requests_total",
        "route" => route.clone(),
        "method" => method.clone(),
        "status" => outcome
    )
    .increment(1);
    histogram!(
        "stash_http_request_duration_seconds",
        "route" => route.clone(),
        "method" => method.clone()
    )
    .record(duration.as_secs_f64());

    if status >= 400 {
        counter!(
            "stash_http_errors_total",
            "route" => route,
            "method" => method,
            "code" => status.to_string()
        )
        .increment(1);
    }
}

/// Middleware counting and timing every API request by matched route.
pub async fn track_requests(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = req.method().to_string();

    let response = next.run(req).await;

    record_request(route, method, response.status().as_u16(), start.elapsed());
    response
}
