//! Video generation request records.
//!
//! One record per render+publish request. The state machine is
//! queued → processing → {completed, failed}, with an orthogonal
//! `scheduled` pre-state while `scheduled_at` is set. Ordering of queued
//! work (urgent > high > normal > low, then creation time) is enforced by
//! the queue lanes and the worker, not by this type.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::{TransitionError, TransitionResult};
use crate::job::JobId;

/// Message recorded when a generation is cancelled.
pub const CANCELLED_MESSAGE: &str = "Cancelled by user";

/// Unique identifier for a video generation request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct GenerationId(pub String);

impl GenerationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for GenerationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GenerationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for GenerationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for GenerationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Target format of a generated video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum VideoKind {
    #[default]
    Youtube,
    Tiktok,
    Reel,
    Short,
}

impl VideoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoKind::Youtube => "youtube",
            VideoKind::Tiktok => "tiktok",
            VideoKind::Reel => "reel",
            VideoKind::Short => "short",
        }
    }
}

impl fmt::Display for VideoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Processing priority. Higher priorities are drained first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }

    /// All priorities from most to least urgent. Consumers drain lanes in
    /// this order.
    pub fn descending() -> [Priority; 4] {
        [Priority::Urgent, Priority::High, Priority::Normal, Priority::Low]
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Priority::Low),
            "normal" => Some(Priority::Normal),
            "high" => Some(Priority::High),
            "urgent" => Some(Priority::Urgent),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Platform a finished video can be auto-published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PublishPlatform {
    Youtube,
    Tiktok,
    Instagram,
    X,
}

impl PublishPlatform {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishPlatform::Youtube => "youtube",
            PublishPlatform::Tiktok => "tiktok",
            PublishPlatform::Instagram => "instagram",
            PublishPlatform::X => "x",
        }
    }
}

impl fmt::Display for PublishPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Generation request state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    /// Waiting in a queue lane
    #[default]
    Queued,
    /// Deferred until `scheduled_at`
    Scheduled,
    /// A worker is rendering
    Processing,
    /// Render finished, output available
    Completed,
    /// Render failed or was cancelled
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Queued => "queued",
            GenerationStatus::Scheduled => "scheduled",
            GenerationStatus::Processing => "processing",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, GenerationStatus::Completed | GenerationStatus::Failed)
    }
}

impl fmt::Display for GenerationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One render+publish request for a post.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct VideoGeneration {
    /// Unique request ID
    pub id: GenerationId,

    /// Source post being rendered
    pub post_id: String,

    /// Owning user
    pub user_id: String,

    /// Target video format
    pub video_kind: VideoKind,

    /// Current state
    #[serde(default)]
    pub status: GenerationStatus,

    /// Processing priority
    #[serde(default)]
    pub priority: Priority,

    /// Deferred start time (set iff the record has been scheduled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,

    /// Publish automatically once rendering completes
    #[serde(default)]
    pub auto_publish: bool,

    /// Platforms to publish to
    #[serde(default)]
    pub publish_platforms: Vec<PublishPlatform>,

    /// Number of retries after failure
    #[serde(default)]
    pub retry_count: u32,

    /// When the last retry was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_retry_at: Option<DateTime<Utc>>,

    /// Output video URL (set on completion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,

    /// Output duration in seconds (set on completion)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u32>,

    /// Error message (set only while failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Completion timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl VideoGeneration {
    /// Create a new request in state `queued`.
    pub fn new(
        user_id: impl Into<String>,
        post_id: impl Into<String>,
        video_kind: VideoKind,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: GenerationId::new(),
            post_id: post_id.into(),
            user_id: user_id.into(),
            video_kind,
            status: GenerationStatus::Queued,
            priority: Priority::default(),
            scheduled_at: None,
            auto_publish: false,
            publish_platforms: Vec::new(),
            retry_count: 0,
            last_retry_at: None,
            video_url: None,
            duration_seconds: None,
            error_message: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_auto_publish(mut self, platforms: Vec<PublishPlatform>) -> Self {
        self.auto_publish = true;
        self.publish_platforms = platforms;
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// ID of the job status record tracking this request's render work.
    /// Deterministic so every hand-off of the same request shares one
    /// tracker.
    pub fn render_job_id(&self) -> JobId {
        JobId::from_string(format!("render-{}", self.id))
    }

    /// Defer a `queued` request until `at`.
    pub fn schedule_for(&mut self, at: DateTime<Utc>) -> TransitionResult<()> {
        if self.status != GenerationStatus::Queued {
            return Err(TransitionError::invalid(self.status.as_str(), "schedule"));
        }
        self.status = GenerationStatus::Scheduled;
        self.scheduled_at = Some(at);
        self.updated_at = Utc::now();
        Ok(())
    }

    /// True when a `scheduled` request has reached its start time.
    pub fn due_for_processing(&self, now: DateTime<Utc>) -> bool {
        self.status == GenerationStatus::Scheduled
            && self.scheduled_at.is_some_and(|at| at <= now)
    }

    /// Sweep transition: `scheduled` → `queued` once due. Keeps
    /// `scheduled_at` so the original plan stays visible.
    pub fn make_due(&mut self) -> TransitionResult<()> {
        if self.status != GenerationStatus::Scheduled {
            return Err(TransitionError::invalid(self.status.as_str(), "release"));
        }
        self.status = GenerationStatus::Queued;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Operator override: `scheduled` → `queued` immediately, dropping the
    /// schedule.
    pub fn force_now(&mut self) -> TransitionResult<()> {
        if self.status != GenerationStatus::Scheduled {
            return Err(TransitionError::invalid(self.status.as_str(), "force"));
        }
        self.status = GenerationStatus::Queued;
        self.scheduled_at = None;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Worker pickup: `queued` → `processing`.
    pub fn start(&mut self) -> TransitionResult<()> {
        if self.status != GenerationStatus::Queued {
            return Err(TransitionError::invalid(self.status.as_str(), "start"));
        }
        self.status = GenerationStatus::Processing;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Render finished: `processing` → `completed` with the output.
    pub fn complete(
        &mut self,
        video_url: impl Into<String>,
        duration_seconds: u32,
    ) -> TransitionResult<()> {
        if self.status != GenerationStatus::Processing {
            return Err(TransitionError::invalid(self.status.as_str(), "complete"));
        }
        let now = Utc::now();
        self.status = GenerationStatus::Completed;
        self.video_url = Some(video_url.into());
        self.duration_seconds = Some(duration_seconds);
        self.completed_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Any non-terminal state → `failed` with an error message.
    pub fn fail(&mut self, message: impl Into<String>) -> TransitionResult<()> {
        if self.is_terminal() {
            return Err(TransitionError::invalid(self.status.as_str(), "fail"));
        }
        self.status = GenerationStatus::Failed;
        self.error_message = Some(message.into());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Cancel a `queued`, `scheduled`, or `processing` request.
    ///
    /// Cancellation is a terminal transition on the record; it does not
    /// signal an in-flight render.
    pub fn cancel(&mut self) -> TransitionResult<()> {
        if self.is_terminal() {
            return Err(TransitionError::invalid(self.status.as_str(), "cancel"));
        }
        self.status = GenerationStatus::Failed;
        self.error_message = Some(CANCELLED_MESSAGE.to_string());
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Re-queue a `failed` request for another attempt.
    pub fn retry(&mut self) -> TransitionResult<()> {
        if self.status != GenerationStatus::Failed {
            return Err(TransitionError::invalid(self.status.as_str(), "retry"));
        }
        let now = Utc::now();
        self.status = GenerationStatus::Queued;
        self.error_message = None;
        self.video_url = None;
        self.duration_seconds = None;
        self.completed_at = None;
        self.retry_count += 1;
        self.last_retry_at = Some(now);
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generation() -> VideoGeneration {
        VideoGeneration::new("user-1", "post-1", VideoKind::Short)
    }

    #[test]
    fn test_new_generation_is_queued() {
        let gen = generation();
        assert_eq!(gen.status, GenerationStatus::Queued);
        assert_eq!(gen.priority, Priority::Normal);
        assert!(gen.scheduled_at.is_none());
    }

    #[test]
    fn test_full_lifecycle() {
        let mut gen = generation();
        gen.start().unwrap();
        assert_eq!(gen.status, GenerationStatus::Processing);

        gen.complete("https://cdn.example.com/v/abc.mp4", 42).unwrap();
        assert_eq!(gen.status, GenerationStatus::Completed);
        assert_eq!(gen.duration_seconds, Some(42));
        assert!(gen.completed_at.is_some());
        assert!(gen.is_terminal());
    }

    #[test]
    fn test_schedule_then_force_now() {
        let mut gen = generation();
        let at = Utc::now() + chrono::Duration::hours(1);
        gen.schedule_for(at).unwrap();
        assert_eq!(gen.status, GenerationStatus::Scheduled);
        assert_eq!(gen.scheduled_at, Some(at));
        assert!(!gen.due_for_processing(Utc::now()));

        gen.force_now().unwrap();
        assert_eq!(gen.status, GenerationStatus::Queued);
        assert!(gen.scheduled_at.is_none());
    }

    #[test]
    fn test_due_for_processing() {
        let mut gen = generation();
        let at = Utc::now() - chrono::Duration::minutes(5);
        gen.schedule_for(at).unwrap();
        assert!(gen.due_for_processing(Utc::now()));

        gen.make_due().unwrap();
        assert_eq!(gen.status, GenerationStatus::Queued);
        // the original plan is kept for audit
        assert_eq!(gen.scheduled_at, Some(at));
    }

    #[test]
    fn test_schedule_only_from_queued() {
        let mut gen = generation();
        gen.start().unwrap();
        assert!(gen.schedule_for(Utc::now()).is_err());
        assert!(gen.scheduled_at.is_none());
    }

    #[test]
    fn test_cancel_processing_generation() {
        let mut gen = generation();
        gen.start().unwrap();
        gen.cancel().unwrap();
        assert_eq!(gen.status, GenerationStatus::Failed);
        assert_eq!(gen.error_message.as_deref(), Some("Cancelled by user"));
    }

    #[test]
    fn test_cancel_rejected_once_terminal() {
        let mut gen = generation();
        gen.start().unwrap();
        gen.complete("https://cdn.example.com/v/abc.mp4", 10).unwrap();
        assert!(gen.cancel().is_err());
        assert_eq!(gen.status, GenerationStatus::Completed);
    }

    #[test]
    fn test_fail_from_scheduled() {
        let mut gen = generation();
        gen.schedule_for(Utc::now() + chrono::Duration::hours(2)).unwrap();
        gen.fail("renderer unavailable").unwrap();
        assert_eq!(gen.status, GenerationStatus::Failed);
    }

    #[test]
    fn test_retry_requeues_and_counts() {
        let mut gen = generation();
        gen.start().unwrap();
        gen.fail("timeout").unwrap();

        gen.retry().unwrap();
        assert_eq!(gen.status, GenerationStatus::Queued);
        assert_eq!(gen.retry_count, 1);
        assert!(gen.last_retry_at.is_some());
        assert!(gen.error_message.is_none());

        assert!(gen.retry().is_err());
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Urgent > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(
            Priority::descending(),
            [Priority::Urgent, Priority::High, Priority::Normal, Priority::Low]
        );
    }
}
