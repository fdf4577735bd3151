//! Render order queue using Redis Streams.
//!
//! One stream per priority lane. Consumers drain lanes from `urgent` down
//! to `low`; within a lane, stream order gives oldest-first. That is the
//! whole ordering policy: priority first, then creation time.

use redis::AsyncCommands;
use tracing::{debug, info, warn};

use inkpost_models::Priority;

use crate::error::{QueueError, QueueResult};
use crate::order::RenderOrder;

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for the per-lane stream names
    pub stream_prefix: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Max retries before an order is dead-lettered
    pub max_retries: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_prefix: "inkpost:orders".to_string(),
            consumer_group: "inkpost:renderers".to_string(),
            max_retries: 3,
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            stream_prefix: std::env::var("QUEUE_STREAM_PREFIX")
                .unwrap_or_else(|_| "inkpost:orders".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "inkpost:renderers".to_string()),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(3),
        }
    }
}

/// An order delivered to a consumer, with the bookkeeping needed to ack or
/// dead-letter it.
#[derive(Debug, Clone)]
pub struct DeliveredOrder {
    /// Lane the order was read from
    pub lane: Priority,
    /// Stream message ID
    pub message_id: String,
    /// The order payload
    pub order: RenderOrder,
}

/// Render order queue client.
pub struct WorkQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl WorkQueue {
    /// Create a new queue.
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    /// Semantic lane name stored on job records (`orders:urgent` etc).
    pub fn lane_name(priority: Priority) -> String {
        format!("orders:{}", priority.as_str())
    }

    fn lane_stream(&self, priority: Priority) -> String {
        format!("{}:{}", self.config.stream_prefix, priority.as_str())
    }

    fn dlq_stream(&self) -> String {
        format!("{}:dlq", self.config.stream_prefix)
    }

    fn lane_of(&self, stream_key: &str) -> Option<Priority> {
        Priority::descending()
            .into_iter()
            .find(|p| self.lane_stream(*p) == stream_key)
    }

    /// Initialize the queue (create consumer groups for every lane).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        for priority in Priority::descending() {
            let stream = self.lane_stream(priority);
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(&stream)
                .arg(&self.config.consumer_group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!("Created consumer group on {}", stream),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!("Consumer group already exists on {}", stream);
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    /// Enqueue an order on its priority lane.
    pub async fn enqueue(&self, order: &RenderOrder) -> QueueResult<String> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(order)?;
        let idempotency_key = order.idempotency_key();

        // Reject accidental double-enqueues of the same hand-off
        let dedup_key = format!("{}:dedup:{}", self.config.stream_prefix, idempotency_key);
        let exists: bool = conn.exists(&dedup_key).await?;
        if exists {
            warn!("Duplicate order rejected: {}", idempotency_key);
            return Err(QueueError::enqueue_failed("Duplicate order"));
        }

        let stream = self.lane_stream(order.priority);
        let message_id: String = redis::cmd("XADD")
            .arg(&stream)
            .arg("*")
            .arg("order")
            .arg(&payload)
            .arg("key")
            .arg(&idempotency_key)
            .query_async(&mut conn)
            .await?;

        // Dedup key with a 1 hour TTL
        conn.set_ex::<_, _, ()>(&dedup_key, "1", 3600).await?;

        info!(
            "Enqueued order {} on lane {} with message ID {}",
            order.job_id,
            order.priority,
            message_id
        );

        Ok(message_id)
    }

    /// Acknowledge a delivered order (work finished, one way or the other).
    pub async fn ack(&self, lane: Priority, message_id: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let stream = self.lane_stream(lane);

        redis::cmd("XACK")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&stream)
            .arg(message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!("Acknowledged order message {} on {}", message_id, stream);
        Ok(())
    }

    /// Move a delivered order to the dead letter queue.
    pub async fn dlq(&self, delivered: &DeliveredOrder, error: &str) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let payload = serde_json::to_string(&delivered.order)?;

        redis::cmd("XADD")
            .arg(self.dlq_stream())
            .arg("*")
            .arg("order")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("lane")
            .arg(delivered.lane.as_str())
            .arg("original_id")
            .arg(&delivered.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(delivered.lane, &delivered.message_id).await?;

        warn!(
            "Moved order {} to DLQ: {}",
            delivered.order.job_id, error
        );
        Ok(())
    }

    /// Length of one lane.
    pub async fn lane_len(&self, priority: Priority) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(self.lane_stream(priority)).await?;
        Ok(len)
    }

    /// Total queued orders across all lanes.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut total = 0;
        for priority in Priority::descending() {
            total += self.lane_len(priority).await?;
        }
        Ok(total)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let len: u64 = conn.xlen(self.dlq_stream()).await?;
        Ok(len)
    }

    /// Consume orders, urgent lanes first.
    ///
    /// Lanes are checked non-blocking from most to least urgent; only when
    /// every lane is empty does the call block across all lanes for up to
    /// `block_ms` waiting for new work.
    pub async fn consume(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<DeliveredOrder>> {
        for priority in Priority::descending() {
            let delivered = self
                .read_lane(consumer_name, priority, None, count)
                .await?;
            if !delivered.is_empty() {
                return Ok(delivered);
            }
        }

        // All lanes empty: block across every lane until something arrives.
        self.read_all_lanes(consumer_name, block_ms, count).await
    }

    /// Claim orders another consumer left pending for too long (crash
    /// recovery). Lanes are scanned urgent-first.
    pub async fn claim_pending(
        &self,
        consumer_name: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<DeliveredOrder>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let mut claimed = Vec::new();

        for priority in Priority::descending() {
            let stream = self.lane_stream(priority);

            let pending: redis::streams::StreamPendingReply = redis::cmd("XPENDING")
                .arg(&stream)
                .arg(&self.config.consumer_group)
                .query_async(&mut conn)
                .await?;

            if pending.count() == 0 {
                continue;
            }

            let result: redis::streams::StreamClaimReply = redis::cmd("XCLAIM")
                .arg(&stream)
                .arg(&self.config.consumer_group)
                .arg(consumer_name)
                .arg(min_idle_ms)
                .arg("0-0")
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn)
                .await?;

            for entry in result.ids {
                let message_id = entry.id.clone();

                if let Some(redis::Value::BulkString(payload)) = entry.map.get("order") {
                    let payload_str = String::from_utf8_lossy(payload);
                    match serde_json::from_str::<RenderOrder>(&payload_str) {
                        Ok(order) => {
                            info!("Claimed pending order {} from {}", order.job_id, stream);
                            claimed.push(DeliveredOrder {
                                lane: priority,
                                message_id,
                                order,
                            });
                        }
                        Err(e) => {
                            warn!("Failed to parse claimed order payload: {}", e);
                            self.ack(priority, &message_id).await.ok();
                        }
                    }
                }
            }
        }

        Ok(claimed)
    }

    /// Retry count for a delivered order.
    pub async fn get_retry_count(&self, delivered: &DeliveredOrder) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = self.retry_key(delivered);
        let count: Option<u32> = conn.get(&key).await?;
        Ok(count.unwrap_or(0))
    }

    /// Increment the retry count for a delivered order.
    pub async fn increment_retry(&self, delivered: &DeliveredOrder) -> QueueResult<u32> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let key = self.retry_key(delivered);
        let count: u32 = conn.incr(&key, 1).await?;
        // TTL of 24 hours
        conn.expire::<_, ()>(&key, 86400).await?;
        Ok(count)
    }

    /// Max retries from config.
    pub fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    fn retry_key(&self, delivered: &DeliveredOrder) -> String {
        format!(
            "{}:retry:{}:{}",
            self.config.stream_prefix,
            delivered.lane.as_str(),
            delivered.message_id
        )
    }

    async fn read_lane(
        &self,
        consumer_name: &str,
        priority: Priority,
        block_ms: Option<u64>,
        count: usize,
    ) -> QueueResult<Vec<DeliveredOrder>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let stream = self.lane_stream(priority);

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count);
        if let Some(block) = block_ms {
            cmd.arg("BLOCK").arg(block);
        }
        cmd.arg("STREAMS").arg(&stream).arg(">");

        let result: redis::streams::StreamReadReply = cmd.query_async(&mut conn).await?;
        self.collect_deliveries(result).await
    }

    async fn read_all_lanes(
        &self,
        consumer_name: &str,
        block_ms: u64,
        count: usize,
    ) -> QueueResult<Vec<DeliveredOrder>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer_name)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block_ms)
            .arg("STREAMS");
        for priority in Priority::descending() {
            cmd.arg(self.lane_stream(priority));
        }
        for _ in Priority::descending() {
            cmd.arg(">");
        }

        let result: redis::streams::StreamReadReply = cmd.query_async(&mut conn).await?;
        self.collect_deliveries(result).await
    }

    async fn collect_deliveries(
        &self,
        result: redis::streams::StreamReadReply,
    ) -> QueueResult<Vec<DeliveredOrder>> {
        let mut deliveries = Vec::new();

        for stream_key in result.keys {
            let Some(lane) = self.lane_of(&stream_key.key) else {
                warn!("Ignoring message on unknown stream {}", stream_key.key);
                continue;
            };

            for entry in stream_key.ids {
                let message_id = entry.id.clone();

                if let Some(redis::Value::BulkString(payload)) = entry.map.get("order") {
                    let payload_str = String::from_utf8_lossy(payload);
                    match serde_json::from_str::<RenderOrder>(&payload_str) {
                        Ok(order) => {
                            debug!("Consumed order {} from lane {}", order.job_id, lane);
                            deliveries.push(DeliveredOrder {
                                lane,
                                message_id,
                                order,
                            });
                        }
                        Err(e) => {
                            warn!("Failed to parse order payload: {}", e);
                            // Ack the malformed message to prevent reprocessing
                            self.ack(lane, &message_id).await.ok();
                        }
                    }
                }
            }
        }

        Ok(deliveries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_streams_are_distinct() {
        let queue = WorkQueue::new(QueueConfig::default()).unwrap();
        let streams: Vec<String> = Priority::descending()
            .into_iter()
            .map(|p| queue.lane_stream(p))
            .collect();
        assert_eq!(streams.len(), 4);
        assert_eq!(streams[0], "inkpost:orders:urgent");
        assert_eq!(streams[3], "inkpost:orders:low");
    }

    #[test]
    fn test_lane_of_round_trips() {
        let queue = WorkQueue::new(QueueConfig::default()).unwrap();
        for priority in Priority::descending() {
            assert_eq!(queue.lane_of(&queue.lane_stream(priority)), Some(priority));
        }
        assert_eq!(queue.lane_of("inkpost:orders:dlq"), None);
    }

    #[test]
    fn test_lane_name() {
        assert_eq!(WorkQueue::lane_name(Priority::Urgent), "orders:urgent");
    }
}
