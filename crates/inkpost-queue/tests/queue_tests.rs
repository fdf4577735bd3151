//! Queue integration tests.
//!
//! These require a running Redis and are ignored by default:
//! `cargo test -p inkpost-queue -- --ignored`

use inkpost_models::{JobId, Priority, VideoGeneration, VideoKind};
use inkpost_queue::{RenderOrder, WorkQueue};

fn queue() -> WorkQueue {
    dotenvy::dotenv().ok();
    WorkQueue::from_env().expect("Failed to create queue")
}

fn order_with_priority(priority: Priority) -> RenderOrder {
    let gen = VideoGeneration::new("it-user", "post-1", VideoKind::Short).with_priority(priority);
    RenderOrder::for_generation(&gen, JobId::new())
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_consume_ack() {
    let queue = queue();
    queue.init().await.expect("Failed to initialize queue");

    let order = order_with_priority(Priority::Normal);
    let job_id = order.job_id.clone();

    queue.enqueue(&order).await.expect("Failed to enqueue");

    let delivered = queue
        .consume("it-consumer", 1000, 5)
        .await
        .expect("Failed to consume");
    let hit = delivered
        .iter()
        .find(|d| d.order.job_id == job_id)
        .expect("order not delivered");
    assert_eq!(hit.lane, Priority::Normal);

    queue.ack(hit.lane, &hit.message_id).await.expect("Failed to ack");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_duplicate_enqueue_rejected() {
    let queue = queue();
    queue.init().await.expect("Failed to initialize queue");

    let order = order_with_priority(Priority::Low);
    queue.enqueue(&order).await.expect("first enqueue failed");

    let err = queue.enqueue(&order).await.unwrap_err();
    assert!(err.to_string().contains("Duplicate"));
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_urgent_lane_drained_first() {
    let queue = queue();
    queue.init().await.expect("Failed to initialize queue");

    let low = order_with_priority(Priority::Low);
    let urgent = order_with_priority(Priority::Urgent);

    queue.enqueue(&low).await.expect("enqueue low failed");
    queue.enqueue(&urgent).await.expect("enqueue urgent failed");

    let first = queue
        .consume("it-priority-consumer", 1000, 1)
        .await
        .expect("consume failed");
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].lane, Priority::Urgent);
    queue.ack(first[0].lane, &first[0].message_id).await.unwrap();

    let second = queue
        .consume("it-priority-consumer", 1000, 1)
        .await
        .expect("consume failed");
    assert_eq!(second[0].lane, Priority::Low);
    queue.ack(second[0].lane, &second[0].message_id).await.unwrap();
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_dlq_receives_failed_order() {
    let queue = queue();
    queue.init().await.expect("Failed to initialize queue");

    let order = order_with_priority(Priority::Normal);
    queue.enqueue(&order).await.expect("enqueue failed");

    let delivered = queue
        .consume("it-dlq-consumer", 1000, 5)
        .await
        .expect("consume failed");
    let hit = delivered
        .iter()
        .find(|d| d.order.job_id == order.job_id)
        .expect("order not delivered");

    let before = queue.dlq_len().await.unwrap();
    queue.dlq(hit, "renderer exploded").await.expect("dlq failed");
    let after = queue.dlq_len().await.unwrap();
    assert_eq!(after, before + 1);
}
