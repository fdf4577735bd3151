//! Progress events via Redis Pub/Sub.

use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::debug;

use inkpost_models::JobId;

use crate::error::QueueResult;

/// What happened to a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEventKind {
    /// A worker picked the job up
    Started,
    /// Progress update
    Progress { percent: u8, message: Option<String> },
    /// Job finished; output URL when there is one
    Completed { video_url: Option<String> },
    /// Job failed
    Failed { error: String },
}

/// Progress event published to Redis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEvent {
    /// Job ID
    pub job_id: JobId,
    /// When the event happened
    pub at: DateTime<Utc>,
    /// Event payload
    #[serde(flatten)]
    pub kind: JobEventKind,
}

impl JobEvent {
    pub fn new(job_id: JobId, kind: JobEventKind) -> Self {
        Self {
            job_id,
            at: Utc::now(),
            kind,
        }
    }
}

/// Per-job pub/sub channel prefix.
const CHANNEL_PREFIX: &str = "inkpost:progress";

/// Channel for publishing/subscribing to job progress events.
pub struct ProgressChannel {
    client: redis::Client,
}

impl ProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a job.
    pub fn channel_name(job_id: &JobId) -> String {
        format!("{CHANNEL_PREFIX}:{job_id}")
    }

    /// Publish a progress event.
    ///
    /// Events are transient: with nobody subscribed they are not stored.
    pub async fn publish(&self, event: &JobEvent) -> QueueResult<()> {
        let payload = serde_json::to_string(event)?;
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let receivers: u32 = conn
            .publish(Self::channel_name(&event.job_id), payload)
            .await?;
        debug!(job_id = %event.job_id, receivers, "job event published");

        Ok(())
    }

    /// Publish a started event.
    pub async fn started(&self, job_id: &JobId) -> QueueResult<()> {
        self.publish(&JobEvent::new(job_id.clone(), JobEventKind::Started))
            .await
    }

    /// Publish a progress update.
    pub async fn progress(
        &self,
        job_id: &JobId,
        percent: u8,
        message: Option<String>,
    ) -> QueueResult<()> {
        self.publish(&JobEvent::new(
            job_id.clone(),
            JobEventKind::Progress { percent, message },
        ))
        .await
    }

    /// Publish a completed event.
    pub async fn completed(&self, job_id: &JobId, video_url: Option<String>) -> QueueResult<()> {
        self.publish(&JobEvent::new(
            job_id.clone(),
            JobEventKind::Completed { video_url },
        ))
        .await
    }

    /// Publish a failed event.
    pub async fn failed(&self, job_id: &JobId, error: impl Into<String>) -> QueueResult<()> {
        self.publish(&JobEvent::new(
            job_id.clone(),
            JobEventKind::Failed { error: error.into() },
        ))
        .await
    }

    /// Subscribe to the event feed for one job.
    ///
    /// The returned stream yields decoded events; payloads that fail to
    /// decode are dropped (a malformed message must not end the feed).
    pub async fn subscribe(
        &self,
        job_id: &JobId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = JobEvent> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(Self::channel_name(job_id)).await?;

        let events = pubsub.into_on_message().filter_map(|msg| {
            let decoded = msg
                .get_payload::<String>()
                .ok()
                .and_then(|raw| serde_json::from_str::<JobEvent>(&raw).ok());
            async move { decoded }
        });

        Ok(Box::pin(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_flattened_kind() {
        let event = JobEvent::new(
            JobId::from("job-1"),
            JobEventKind::Progress {
                percent: 40,
                message: Some("rendering".into()),
            },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["percent"], 40);
        assert_eq!(json["job_id"], "job-1");
    }
}
