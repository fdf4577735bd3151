//! Admin handlers for queue monitoring and system info.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use inkpost_models::Priority;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::metrics;
use crate::state::AppState;

/// Queue status response.
#[derive(Serialize)]
pub struct QueueStatusResponse {
    pub lanes: Vec<LaneStatus>,
    pub total: u64,
    pub dlq_length: u64,
}

#[derive(Serialize)]
pub struct LaneStatus {
    pub lane: String,
    pub length: u64,
}

/// Get queue status per lane (admin only).
pub async fn get_queue_status(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Json<QueueStatusResponse>> {
    user.require_admin()?;

    let mut lanes = Vec::new();
    let mut total = 0;
    for priority in Priority::descending() {
        let length = state.queue.lane_len(priority).await.unwrap_or(0);
        metrics::set_queue_length(priority.as_str(), length);
        total += length;
        lanes.push(LaneStatus {
            lane: priority.to_string(),
            length,
        });
    }

    let dlq_length = state.queue.dlq_len().await.unwrap_or(0);
    metrics::set_dlq_length(dlq_length);

    Ok(Json(QueueStatusResponse {
        lanes,
        total,
        dlq_length,
    }))
}

/// System info response.
#[derive(Serialize)]
pub struct SystemInfoResponse {
    pub version: String,
    pub timestamp: String,
}

/// Get system info (admin only).
pub async fn get_system_info(user: AuthUser) -> ApiResult<Json<SystemInfoResponse>> {
    user.require_admin()?;

    Ok(Json(SystemInfoResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    }))
}
