//! Axum HTTP API server.
//!
//! This crate provides:
//! - The creator/operator surface over the job, generation, and payout
//!   state machines
//! - Bearer token verification
//! - Rate limiting and security headers
//! - Prometheus metrics
//! - The background sweep for scheduled and stale work

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::Sweeper;
pub use state::AppState;
