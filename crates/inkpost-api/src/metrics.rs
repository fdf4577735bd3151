//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "inkpost_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "inkpost_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "inkpost_http_requests_in_flight";

    // Queue metrics
    pub const QUEUE_LENGTH: &str = "inkpost_queue_length";
    pub const QUEUE_DLQ_LENGTH: &str = "inkpost_queue_dlq_length";
    pub const ORDERS_ENQUEUED_TOTAL: &str = "inkpost_orders_enqueued_total";

    // Job metrics
    pub const JOBS_FAILED_TOTAL: &str = "inkpost_jobs_failed_total";
    pub const JOBS_RETRIED_TOTAL: &str = "inkpost_jobs_retried_total";
    pub const SWEEP_RELEASED_TOTAL: &str = "inkpost_sweep_released_total";
    pub const SWEEP_STALE_FAILED_TOTAL: &str = "inkpost_sweep_stale_failed_total";

    // Payout metrics
    pub const PAYOUTS_DECIDED_TOTAL: &str = "inkpost_payouts_decided_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "inkpost_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Update queue length gauge for one lane.
pub fn set_queue_length(lane: &str, length: u64) {
    gauge!(names::QUEUE_LENGTH, "lane" => lane.to_string()).set(length as f64);
}

/// Update DLQ length gauge.
pub fn set_dlq_length(length: u64) {
    gauge!(names::QUEUE_DLQ_LENGTH).set(length as f64);
}

/// Record an order enqueued.
pub fn record_order_enqueued(lane: &str) {
    counter!(names::ORDERS_ENQUEUED_TOTAL, "lane" => lane.to_string()).increment(1);
}

/// Record a job failed.
pub fn record_job_failed(job_type: &str) {
    counter!(names::JOBS_FAILED_TOTAL, "type" => job_type.to_string()).increment(1);
}

/// Record an operator-initiated retry.
pub fn record_job_retried(job_type: &str) {
    counter!(names::JOBS_RETRIED_TOTAL, "type" => job_type.to_string()).increment(1);
}

/// Record scheduled generations released by the sweep.
pub fn record_sweep_released(count: u64) {
    counter!(names::SWEEP_RELEASED_TOTAL).increment(count);
}

/// Record stale jobs failed by the sweep.
pub fn record_sweep_stale_failed(count: u64) {
    counter!(names::SWEEP_STALE_FAILED_TOTAL).increment(count);
}

/// Record a payout decision.
pub fn record_payout_decided(decision: &str) {
    counter!(names::PAYOUTS_DECIDED_TOTAL, "decision" => decision.to_string()).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    counter!(names::RATE_LIMIT_HITS_TOTAL, "endpoint" => endpoint.to_string()).increment(1);
}

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    let path = regex_lite::Regex::new(
        r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
    )
    .unwrap()
    .replace_all(path, ":id");
    let path = regex_lite::Regex::new(r"/jobs/[a-zA-Z0-9-]+")
        .unwrap()
        .replace_all(&path, "/jobs/:job_id");
    let path = regex_lite::Regex::new(r"/[0-9]+(/|$)")
        .unwrap()
        .replace_all(&path, "/:id$1");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);

    let response = next.run(request).await;

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();

    record_http_request(&method, &path, status, duration);

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_path() {
        assert_eq!(
            sanitize_path("/api/generations/550e8400-e29b-41d4-a716-446655440000/cancel"),
            "/api/generations/:id/cancel"
        );
        assert_eq!(
            sanitize_path("/api/jobs/render-abc123/retry"),
            "/api/jobs/:job_id/retry"
        );
    }
}
