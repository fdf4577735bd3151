//! Job status handlers for progress polling and operator retries.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use inkpost_models::{JobId, JobState, JobStatus};

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::metrics;
use crate::state::AppState;

/// Job status response.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub job_type: String,
    pub queue: String,
    pub status: String,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trackable: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<JobStatus> for JobStatusResponse {
    fn from(job: JobStatus) -> Self {
        Self {
            job_id: job.job_id.to_string(),
            job_type: job.job_type.to_string(),
            queue: job.queue,
            status: job.status.to_string(),
            progress: job.progress,
            progress_message: job.progress_message,
            attempts: job.attempts,
            error_message: job.error_message,
            trackable: job.trackable.map(|t| t.to_string()),
            started_at: job.started_at.map(|t| t.to_rfc3339()),
            completed_at: job.completed_at.map(|t| t.to_rfc3339()),
            created_at: job.created_at.to_rfc3339(),
            updated_at: job.updated_at.to_rfc3339(),
        }
    }
}

/// GET /api/jobs/:job_id
///
/// Poll the current status of a background job.
///
/// Returns:
/// - 200: Job status
/// - 401: Not authenticated
/// - 403: Job belongs to another user
/// - 404: Job not found
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<JobStatusResponse>> {
    if !is_valid_job_id(&job_id) {
        return Err(ApiError::bad_request("Invalid job ID format"));
    }

    let job = state
        .jobs
        .get(&JobId::from(job_id))
        .await?
        .ok_or_else(|| ApiError::not_found("Job not found"))?;

    if let Some(owner) = &job.user_id {
        user.require_owner_or_admin(owner)?;
    } else {
        user.require_admin()?;
    }

    Ok(Json(job.into()))
}

/// Query parameters for the job listing endpoint.
#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    /// Filter by state (pending/processing/completed/failed).
    #[serde(default)]
    pub state: Option<String>,
    /// Maximum number of jobs to return.
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Job listing response.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobStatusResponse>,
}

/// GET /api/jobs
///
/// List recent jobs, optionally filtered by state. Operators only.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(query): Query<ListJobsQuery>,
    user: AuthUser,
) -> ApiResult<Json<JobListResponse>> {
    user.require_admin()?;

    let limit = query.limit.unwrap_or(50).min(500);
    let jobs = match query.state.as_deref() {
        Some(s) => {
            let status = parse_state(s)?;
            state.jobs.list_in_state(status, limit).await?
        }
        None => state.jobs.list_recent(limit).await?,
    };

    Ok(Json(JobListResponse {
        jobs: jobs.into_iter().map(Into::into).collect(),
    }))
}

/// POST /api/jobs/:job_id/retry
///
/// Reset a failed job back to pending. Operators only. The job record is
/// the only thing touched here: dispatching the work again is the queue's
/// business, driven by the resource-specific retry endpoints.
pub async fn retry_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    user: AuthUser,
) -> ApiResult<Json<JobStatusResponse>> {
    user.require_admin()?;

    if !is_valid_job_id(&job_id) {
        return Err(ApiError::bad_request("Invalid job ID format"));
    }

    let job = state
        .jobs
        .transition(&JobId::from(job_id), |j| j.retry())
        .await?;

    metrics::record_job_retried(job.job_type.as_str());
    info!(job_id = %job.job_id, attempts = job.attempts, "Job reset for retry by {}", user.uid);

    Ok(Json(job.into()))
}

fn parse_state(s: &str) -> ApiResult<JobState> {
    match s {
        "pending" => Ok(JobState::Pending),
        "processing" => Ok(JobState::Processing),
        "completed" => Ok(JobState::Completed),
        "failed" => Ok(JobState::Failed),
        other => Err(ApiError::bad_request(format!("Unknown job state: {other}"))),
    }
}

/// Validate job ID format to prevent injection attacks.
///
/// Valid format: alphanumeric characters and hyphens only, 8-64 chars.
fn is_valid_job_id(id: &str) -> bool {
    if id.len() < 8 || id.len() > 64 {
        return false;
    }
    id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_job_ids() {
        assert!(is_valid_job_id("12345678"));
        assert!(is_valid_job_id("render-1234-abcd"));
        assert!(is_valid_job_id("a1b2c3d4-e5f6-g7h8"));
    }

    #[test]
    fn test_invalid_job_ids() {
        assert!(!is_valid_job_id(""));
        assert!(!is_valid_job_id("short"));
        assert!(!is_valid_job_id("has space"));
        assert!(!is_valid_job_id("has_underscore"));
        assert!(!is_valid_job_id(&"a".repeat(65)));
    }

    #[test]
    fn test_parse_state() {
        assert_eq!(parse_state("pending").unwrap(), JobState::Pending);
        assert!(parse_state("sleeping").is_err());
    }
}
