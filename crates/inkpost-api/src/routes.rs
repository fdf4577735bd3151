//! API routes.

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::admin::{get_queue_status, get_system_info};
use crate::handlers::generations::{
    cancel_generation, create_generation, force_generation_now, get_generation,
    list_generations, retry_generation, schedule_generation,
};
use crate::handlers::jobs::{get_job, list_jobs, retry_job};
use crate::handlers::payouts::{
    approve_payout, bulk_approve_payouts, create_payout, get_payout, list_own_payouts,
    list_payouts, mark_payout_processing, reject_payout,
};
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{
    cors_layer, rate_limit_middleware, request_id, request_logging, security_headers,
    RateLimiterCache,
};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let job_routes = Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/retry", post(retry_job));

    let generation_routes = Router::new()
        .route("/generations", post(create_generation).get(list_generations))
        .route("/generations/:id", get(get_generation))
        .route("/generations/:id/schedule", post(schedule_generation))
        .route("/generations/:id/force-now", post(force_generation_now))
        .route("/generations/:id/cancel", post(cancel_generation))
        .route("/generations/:id/retry", post(retry_generation));

    let payout_routes = Router::new()
        .route("/payouts", post(create_payout).get(list_payouts))
        .route("/payouts/bulk-approve", post(bulk_approve_payouts))
        .route("/payouts/:id", get(get_payout))
        .route("/payouts/:id/approve", post(approve_payout))
        .route("/payouts/:id/reject", post(reject_payout))
        .route("/payouts/:id/processing", post(mark_payout_processing))
        .route("/user/payouts", get(list_own_payouts));

    let admin_routes = Router::new()
        .route("/admin/queue/status", get(get_queue_status))
        .route("/admin/system/info", get(get_system_info));

    // Create rate limiter for API routes
    let rate_limiter = std::sync::Arc::new(RateLimiterCache::new(
        state.config.rate_limit_rps,
        state.config.trust_proxy_headers,
    ));

    let api_routes = Router::new()
        .merge(job_routes)
        .merge(generation_routes)
        .merge(payout_routes)
        .merge(admin_routes)
        .layer(middleware::from_fn_with_state(
            rate_limiter,
            rate_limit_middleware,
        ));

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    // Metrics endpoint (if enabled)
    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
