//! Generic status tracking for asynchronous background work.
//!
//! A [`JobStatus`] record holds the current state of one unit of work
//! (video generation, content import, post publishing) and exposes the
//! legal state transitions to the worker and the operator API. Actual
//! work dispatch lives in the queue and worker crates; this type only
//! guards the edges.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{TransitionError, TransitionResult};
use crate::trackable::TrackableRef;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Category of background work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Render a short video from a post
    VideoGeneration,
    /// Import content from an external source
    SourceImport,
    /// Publish a finished video to a platform
    PostPublish,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::VideoGeneration => "video_generation",
            JobKind::SourceImport => "source_import",
            JobKind::PostPublish => "post_publish",
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job processing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Job is waiting for a worker
    #[default]
    Pending,
    /// Job is actively being processed
    Processing,
    /// Job completed successfully
    Completed,
    /// Job failed with an error
    Failed,
}

impl JobState {
    /// Get string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status record for one asynchronous unit of work.
///
/// Legal edges: pending → processing → {completed, failed},
/// pending → failed, and failed → pending via [`JobStatus::retry`].
/// Every other transition is rejected before any field is written.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStatus {
    /// Unique job ID
    pub job_id: JobId,

    /// Job category
    pub job_type: JobKind,

    /// Named queue lane this job was enqueued on
    pub queue: String,

    /// Current state
    #[serde(default)]
    pub status: JobState,

    /// Progress percentage (0-100)
    #[serde(default)]
    pub progress: u8,

    /// Current processing step description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_message: Option<String>,

    /// Number of times this job has been handed to a worker
    #[serde(default)]
    pub attempts: u32,

    /// Error message (set only while failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Entity this job works on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trackable: Option<TrackableRef>,

    /// Owning user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// When processing started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When processing completed (set iff status is completed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Last heartbeat from the worker
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_heartbeat: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl JobStatus {
    /// Create a new job record in state `pending`.
    pub fn new(job_type: JobKind, queue: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: JobId::new(),
            job_type,
            queue: queue.into(),
            status: JobState::Pending,
            progress: 0,
            progress_message: None,
            attempts: 0,
            error_message: None,
            trackable: None,
            user_id: None,
            started_at: None,
            completed_at: None,
            last_heartbeat: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Use an externally assigned job ID.
    pub fn with_job_id(mut self, job_id: JobId) -> Self {
        self.job_id = job_id;
        self
    }

    /// Attach the entity this job works on.
    pub fn with_trackable(mut self, trackable: TrackableRef) -> Self {
        self.trackable = Some(trackable);
        self
    }

    /// Attach the owning user.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Move `pending` → `processing` and stamp `started_at`.
    pub fn mark_started(&mut self) -> TransitionResult<()> {
        if self.status != JobState::Pending {
            return Err(TransitionError::invalid(self.status.as_str(), "start"));
        }
        let now = Utc::now();
        self.status = JobState::Processing;
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Update progress while `processing`. The percentage is clamped to [0, 100].
    pub fn record_progress(
        &mut self,
        percent: u8,
        message: Option<String>,
    ) -> TransitionResult<()> {
        if self.status != JobState::Processing {
            return Err(TransitionError::invalid(self.status.as_str(), "record progress on"));
        }
        self.progress = percent.min(100);
        if message.is_some() {
            self.progress_message = message;
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Record a worker heartbeat while `processing`.
    pub fn record_heartbeat(&mut self) -> TransitionResult<()> {
        if self.status != JobState::Processing {
            return Err(TransitionError::invalid(self.status.as_str(), "heartbeat"));
        }
        let now = Utc::now();
        self.last_heartbeat = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Move `processing` → `completed` and stamp `completed_at`.
    pub fn mark_completed(&mut self) -> TransitionResult<()> {
        if self.status != JobState::Processing {
            return Err(TransitionError::invalid(self.status.as_str(), "complete"));
        }
        let now = Utc::now();
        self.status = JobState::Completed;
        self.progress = 100;
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Move `pending` or `processing` → `failed` with an error message.
    pub fn mark_failed(&mut self, error: impl Into<String>) -> TransitionResult<()> {
        if self.is_terminal() {
            return Err(TransitionError::invalid(self.status.as_str(), "fail"));
        }
        self.status = JobState::Failed;
        self.error_message = Some(error.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Reset a `failed` job back to `pending` for another attempt.
    ///
    /// Clears the error and all processing timestamps and increments
    /// `attempts`.
    pub fn retry(&mut self) -> TransitionResult<()> {
        if self.status != JobState::Failed {
            return Err(TransitionError::invalid(self.status.as_str(), "retry"));
        }
        self.attempts += 1;
        self.status = JobState::Pending;
        self.error_message = None;
        self.started_at = None;
        self.completed_at = None;
        self.last_heartbeat = None;
        self.progress = 0;
        self.progress_message = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Check if the job should be considered stale based on heartbeat.
    ///
    /// A job is stale if it is `processing` and either no heartbeat has
    /// arrived within the grace period since start, or the last heartbeat
    /// is older than the threshold.
    pub fn is_stale(&self, stale_threshold_secs: i64, grace_period_secs: i64) -> bool {
        if self.status != JobState::Processing {
            return false;
        }

        let now = Utc::now();
        match self.last_heartbeat {
            Some(hb) => (now - hb).num_seconds() > stale_threshold_secs,
            None => {
                let started = self.started_at.unwrap_or(self.created_at);
                (now - started).num_seconds() > grace_period_secs
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> JobStatus {
        JobStatus::new(JobKind::VideoGeneration, "render:normal").with_user("user-1")
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = job();
        assert_eq!(job.status, JobState::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.attempts, 0);
        assert!(job.completed_at.is_none());
        assert!(!job.is_terminal());
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut job = job();

        job.mark_started().unwrap();
        assert_eq!(job.status, JobState::Processing);
        assert!(job.started_at.is_some());

        job.record_progress(55, Some("rendering".into())).unwrap();
        assert_eq!(job.progress, 55);
        assert_eq!(job.progress_message.as_deref(), Some("rendering"));

        job.mark_completed().unwrap();
        assert_eq!(job.status, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.completed_at.is_some());
        assert!(job.is_terminal());
    }

    #[test]
    fn test_completed_at_set_only_on_completion() {
        let mut job = job();
        job.mark_started().unwrap();
        job.mark_failed("boom").unwrap();
        assert!(job.completed_at.is_none());
        assert_eq!(job.status, JobState::Failed);
    }

    #[test]
    fn test_progress_is_clamped() {
        let mut job = job();
        job.mark_started().unwrap();
        job.record_progress(200, None).unwrap();
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn test_progress_rejected_unless_processing() {
        let mut job = job();
        let err = job.record_progress(10, None).unwrap_err();
        assert_eq!(
            err,
            TransitionError::invalid("pending", "record progress on")
        );
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_illegal_edges_rejected() {
        let mut job = job();
        // complete from pending
        assert!(job.mark_completed().is_err());
        assert_eq!(job.status, JobState::Pending);

        // double start
        job.mark_started().unwrap();
        assert!(job.mark_started().is_err());

        // fail from terminal
        job.mark_completed().unwrap();
        assert!(job.mark_failed("late").is_err());
        assert!(job.error_message.is_none());
    }

    #[test]
    fn test_fail_from_pending_is_allowed() {
        let mut job = job();
        job.mark_failed("never picked up").unwrap();
        assert_eq!(job.status, JobState::Failed);
        assert_eq!(job.error_message.as_deref(), Some("never picked up"));
    }

    #[test]
    fn test_retry_resets_failed_job() {
        let mut job = job();
        job.attempts = 2;
        job.mark_started().unwrap();
        job.mark_failed("renderer crashed").unwrap();
        job.mark_started().unwrap_err();

        job.retry().unwrap();
        assert_eq!(job.status, JobState::Pending);
        assert_eq!(job.attempts, 3);
        assert!(job.error_message.is_none());
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
        assert_eq!(job.progress, 0);
    }

    #[test]
    fn test_retry_only_from_failed() {
        let mut job = job();
        assert!(job.retry().is_err());
        job.mark_started().unwrap();
        assert!(job.retry().is_err());
        job.mark_completed().unwrap();
        assert!(job.retry().is_err());
    }

    #[test]
    fn test_stale_detection() {
        let mut job = job();
        assert!(!job.is_stale(60, 120));

        job.mark_started().unwrap();
        assert!(!job.is_stale(60, 120));

        // old start without heartbeat
        job.started_at = Some(Utc::now() - chrono::Duration::seconds(200));
        assert!(job.is_stale(60, 120));

        // recent heartbeat clears it
        job.record_heartbeat().unwrap();
        assert!(!job.is_stale(60, 120));
    }

    #[test]
    fn test_state_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&JobState::Processing).unwrap(),
            "\"processing\""
        );
        assert_eq!(
            serde_json::to_string(&JobKind::VideoGeneration).unwrap(),
            "\"video_generation\""
        );
    }
}
