//! Work order payloads carried on the queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use inkpost_models::{
    GenerationId, JobId, Priority, PublishPlatform, VideoGeneration, VideoKind,
};

/// An order for a worker to render one video generation request.
///
/// The order references both the generation record (domain state) and the
/// job status record (generic progress tracking); the worker keeps the two
/// in step as it goes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderOrder {
    /// Job status record tracking this order
    pub job_id: JobId,

    /// Generation request to render
    pub generation_id: GenerationId,

    /// Source post
    pub post_id: String,

    /// Owning user
    pub user_id: String,

    /// Target format
    pub video_kind: VideoKind,

    /// Queue lane this order belongs on
    pub priority: Priority,

    /// Publish automatically after rendering
    #[serde(default)]
    pub auto_publish: bool,

    /// Platforms to publish to
    #[serde(default)]
    pub publish_platforms: Vec<PublishPlatform>,

    /// Which hand-off this is (0 for the first enqueue, bumped on retry)
    #[serde(default)]
    pub attempt: u32,

    /// When the order was created
    pub created_at: DateTime<Utc>,
}

impl RenderOrder {
    /// Build an order for a generation request.
    pub fn for_generation(generation: &VideoGeneration, job_id: JobId) -> Self {
        Self {
            job_id,
            generation_id: generation.id.clone(),
            post_id: generation.post_id.clone(),
            user_id: generation.user_id.clone(),
            video_kind: generation.video_kind,
            priority: generation.priority,
            auto_publish: generation.auto_publish,
            publish_platforms: generation.publish_platforms.clone(),
            attempt: generation.retry_count,
            created_at: Utc::now(),
        }
    }

    /// Key used to reject accidental double-enqueues of the same hand-off.
    /// Retries bump `attempt`, so a deliberate re-enqueue passes.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}", self.job_id, self.attempt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_carries_generation_fields() {
        let gen = VideoGeneration::new("user-1", "post-9", VideoKind::Tiktok)
            .with_priority(Priority::High)
            .with_auto_publish(vec![PublishPlatform::Tiktok]);
        let job_id = JobId::new();

        let order = RenderOrder::for_generation(&gen, job_id.clone());
        assert_eq!(order.generation_id, gen.id);
        assert_eq!(order.priority, Priority::High);
        assert!(order.auto_publish);
        assert_eq!(order.attempt, 0);
        assert_eq!(order.idempotency_key(), format!("{}:0", job_id));
    }

    #[test]
    fn test_retry_changes_idempotency_key() {
        let mut gen = VideoGeneration::new("user-1", "post-9", VideoKind::Short);
        gen.start().unwrap();
        gen.fail("boom").unwrap();
        gen.retry().unwrap();

        let job_id = JobId::new();
        let order = RenderOrder::for_generation(&gen, job_id.clone());
        assert_eq!(order.attempt, 1);
        assert_eq!(order.idempotency_key(), format!("{}:1", job_id));
    }
}
