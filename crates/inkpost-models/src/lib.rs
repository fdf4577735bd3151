//! Shared data models for the Inkpost backend.
//!
//! This crate provides Serde-serializable record types and their state
//! machines:
//! - Generic job status tracking for background work
//! - Video generation requests with scheduling and priorities
//! - Payout requests with an audited approval workflow
//!
//! Transitions are pure and validate before writing; persistence and
//! concurrency control live in the store crate.

pub mod error;
pub mod generation;
pub mod job;
pub mod payout;
pub mod trackable;

// Re-export common types
pub use error::{TransitionError, TransitionResult};
pub use generation::{
    GenerationId, GenerationStatus, Priority, PublishPlatform, VideoGeneration, VideoKind,
    CANCELLED_MESSAGE,
};
pub use job::{JobId, JobKind, JobState, JobStatus};
pub use payout::{PayoutId, PayoutMethod, PayoutRequest, PayoutStatus};
pub use trackable::{TrackableKind, TrackableRef};
