//! Redis Streams work queue for the Inkpost backend.
//!
//! This crate provides:
//! - Render order enqueueing onto per-priority stream lanes
//! - Lane-ordered consumption with retry/DLQ and crash-recovery claims
//! - Job progress events via Redis Pub/Sub

pub mod error;
pub mod order;
pub mod progress;
pub mod queue;

pub use error::{QueueError, QueueResult};
pub use order::RenderOrder;
pub use progress::{JobEvent, JobEventKind, ProgressChannel};
pub use queue::{DeliveredOrder, QueueConfig, WorkQueue};
