//! Redis-backed record store for the Inkpost backend.
//!
//! This crate provides:
//! - Record persistence as Redis hashes with a status field used as an
//!   optimistic compare-and-set guard
//! - Typed repositories for jobs, video generations, and payout requests
//! - Listing indexes (sorted sets) and the schedule index the sweep scans
//! - Retry with exponential backoff for transient failures

pub mod client;
pub mod error;
pub mod generations;
pub mod jobs;
pub mod payouts;
pub mod retry;

pub use client::{RedisStore, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use generations::GenerationRepository;
pub use jobs::JobRepository;
pub use payouts::PayoutRepository;
pub use retry::{with_retry, RetryConfig};
