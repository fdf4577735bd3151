//! Video generation handlers.
//!
//! Creation, scheduling, and the operator overrides (force-now, cancel,
//! retry). Each generation request owns one job status record; orders for
//! the render workers go out on the priority lanes.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use inkpost_models::{
    GenerationId, JobKind, JobStatus, Priority, PublishPlatform, TrackableRef, VideoGeneration,
    VideoKind, CANCELLED_MESSAGE,
};
use inkpost_queue::{QueueError, RenderOrder, WorkQueue};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Request body for creating a generation.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateGenerationRequest {
    /// Source post
    #[validate(length(min = 1, max = 128))]
    pub post_id: String,
    /// Target format
    pub video_kind: VideoKind,
    /// Processing priority
    #[serde(default)]
    pub priority: Priority,
    /// Defer rendering until this time
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Publish automatically once rendered
    #[serde(default)]
    pub auto_publish: bool,
    /// Platforms to publish to
    #[serde(default)]
    pub publish_platforms: Vec<PublishPlatform>,
}

/// Generation response.
#[derive(Debug, Serialize)]
pub struct GenerationResponse {
    pub id: String,
    pub post_id: String,
    pub user_id: String,
    pub video_kind: String,
    pub status: String,
    pub priority: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<String>,
    pub auto_publish: bool,
    pub publish_platforms: Vec<String>,
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_retry_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub job_id: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<VideoGeneration> for GenerationResponse {
    fn from(gen: VideoGeneration) -> Self {
        let job_id = gen.render_job_id().to_string();
        Self {
            id: gen.id.to_string(),
            post_id: gen.post_id,
            user_id: gen.user_id,
            video_kind: gen.video_kind.to_string(),
            status: gen.status.to_string(),
            priority: gen.priority.to_string(),
            scheduled_at: gen.scheduled_at.map(|t| t.to_rfc3339()),
            auto_publish: gen.auto_publish,
            publish_platforms: gen
                .publish_platforms
                .iter()
                .map(|p| p.to_string())
                .collect(),
            retry_count: gen.retry_count,
            last_retry_at: gen.last_retry_at.map(|t| t.to_rfc3339()),
            video_url: gen.video_url,
            duration_seconds: gen.duration_seconds,
            error_message: gen.error_message,
            job_id,
            created_at: gen.created_at.to_rfc3339(),
            updated_at: gen.updated_at.to_rfc3339(),
        }
    }
}

/// POST /api/generations
///
/// Create a render request. Immediately enqueued unless `scheduled_at` is
/// given, in which case the sweep releases it when due.
pub async fn create_generation(
    State(state): State<AppState>,
    user: AuthUser,
    Json(request): Json<CreateGenerationRequest>,
) -> ApiResult<Json<GenerationResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let mut generation = VideoGeneration::new(&user.uid, &request.post_id, request.video_kind)
        .with_priority(request.priority);
    if request.auto_publish {
        generation = generation.with_auto_publish(request.publish_platforms.clone());
    }

    if let Some(at) = request.scheduled_at {
        if at <= Utc::now() {
            return Err(ApiError::bad_request("scheduled_at must be in the future"));
        }
        generation
            .schedule_for(at)
            .map_err(ApiError::from)?;
    }

    let job = JobStatus::new(JobKind::VideoGeneration, WorkQueue::lane_name(generation.priority))
        .with_job_id(generation.render_job_id())
        .with_trackable(TrackableRef::video(generation.id.as_str()))
        .with_user(&generation.user_id);

    state.generations.create(&generation).await?;
    state.jobs.create(&job).await?;

    if generation.scheduled_at.is_none() {
        enqueue_order(&state, &generation).await?;
    }

    info!(
        generation_id = %generation.id,
        post_id = %generation.post_id,
        kind = %generation.video_kind,
        scheduled = generation.scheduled_at.is_some(),
        "Created video generation for {}",
        user.uid
    );

    Ok(Json(generation.into()))
}

/// Query parameters for the listing endpoint.
#[derive(Debug, Deserialize)]
pub struct ListGenerationsQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Generation listing response.
#[derive(Debug, Serialize)]
pub struct GenerationListResponse {
    pub generations: Vec<GenerationResponse>,
}

/// GET /api/generations
///
/// List the caller's recent requests.
pub async fn list_generations(
    State(state): State<AppState>,
    Query(query): Query<ListGenerationsQuery>,
    user: AuthUser,
) -> ApiResult<Json<GenerationListResponse>> {
    let limit = query.limit.unwrap_or(50).min(500);
    let generations = state.generations.list_for_user(&user.uid, limit).await?;

    Ok(Json(GenerationListResponse {
        generations: generations.into_iter().map(Into::into).collect(),
    }))
}

/// GET /api/generations/:id
pub async fn get_generation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<GenerationResponse>> {
    let generation = state
        .generations
        .get(&GenerationId::from(id))
        .await?
        .ok_or_else(|| ApiError::not_found("Generation not found"))?;

    user.require_owner_or_admin(&generation.user_id)?;
    Ok(Json(generation.into()))
}

/// Request body for scheduling.
#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_at: DateTime<Utc>,
}

/// POST /api/generations/:id/schedule
///
/// Defer a queued request. Any order already on a lane is skipped by the
/// worker once it sees the record is no longer queued.
pub async fn schedule_generation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
    Json(request): Json<ScheduleRequest>,
) -> ApiResult<Json<GenerationResponse>> {
    if request.scheduled_at <= Utc::now() {
        return Err(ApiError::bad_request("scheduled_at must be in the future"));
    }

    let id = GenerationId::from(id);
    let current = state.generations.get_required(&id).await?;
    user.require_owner_or_admin(&current.user_id)?;

    let generation = state
        .generations
        .transition(&id, |g| g.schedule_for(request.scheduled_at))
        .await?;

    Ok(Json(generation.into()))
}

/// POST /api/generations/:id/force-now
///
/// Pull a scheduled request forward: back to the queue immediately, with
/// the schedule cleared.
pub async fn force_generation_now(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<GenerationResponse>> {
    let id = GenerationId::from(id);
    let current = state.generations.get_required(&id).await?;
    user.require_owner_or_admin(&current.user_id)?;

    let generation = state.generations.transition(&id, |g| g.force_now()).await?;
    enqueue_order(&state, &generation).await?;

    info!(generation_id = %generation.id, "Generation forced to queue by {}", user.uid);
    Ok(Json(generation.into()))
}

/// POST /api/generations/:id/cancel
///
/// Cancel a queued, scheduled, or processing request. This is a record
/// transition, not a signal: an in-flight render finishes on the worker
/// and its completion is then refused by the state guard.
pub async fn cancel_generation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<GenerationResponse>> {
    let id = GenerationId::from(id);
    let current = state.generations.get_required(&id).await?;
    user.require_owner_or_admin(&current.user_id)?;

    let generation = state.generations.transition(&id, |g| g.cancel()).await?;

    // Keep the tracker in step; it may already be terminal, which is fine.
    if let Err(e) = state
        .jobs
        .transition(&generation.render_job_id(), |j| j.mark_failed(CANCELLED_MESSAGE))
        .await
    {
        warn!(generation_id = %generation.id, "Tracker not failed on cancel: {}", e);
    }

    info!(generation_id = %generation.id, "Generation cancelled by {}", user.uid);
    Ok(Json(generation.into()))
}

/// POST /api/generations/:id/retry
///
/// Re-queue a failed request and hand a fresh order to the workers.
pub async fn retry_generation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<GenerationResponse>> {
    let id = GenerationId::from(id);
    let current = state.generations.get_required(&id).await?;
    user.require_owner_or_admin(&current.user_id)?;

    let generation = state.generations.transition(&id, |g| g.retry()).await?;

    if let Err(e) = state
        .jobs
        .transition(&generation.render_job_id(), |j| j.retry())
        .await
    {
        warn!(generation_id = %generation.id, "Tracker not reset on retry: {}", e);
    }

    enqueue_order(&state, &generation).await?;
    metrics::record_job_retried(JobKind::VideoGeneration.as_str());

    info!(
        generation_id = %generation.id,
        retry_count = generation.retry_count,
        "Generation retried by {}",
        user.uid
    );
    Ok(Json(generation.into()))
}

/// Enqueue a render order for a queued generation. A duplicate rejection
/// means an order for this hand-off is already on a lane, which is exactly
/// the state we want.
pub(crate) async fn enqueue_order(
    state: &AppState,
    generation: &VideoGeneration,
) -> ApiResult<()> {
    let order = RenderOrder::for_generation(generation, generation.render_job_id());
    match state.queue.enqueue(&order).await {
        Ok(_) => {
            metrics::record_order_enqueued(generation.priority.as_str());
            Ok(())
        }
        Err(QueueError::EnqueueFailed(reason)) if reason.contains("Duplicate") => {
            warn!(generation_id = %generation.id, "Order already enqueued, skipping");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
