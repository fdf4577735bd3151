//! Render order worker.
//!
//! Consumes render orders from the priority lanes, calls the external
//! render service, and drives the generation/job records through their
//! state machines.

pub mod config;
pub mod error;
pub mod executor;
pub mod notifier;
pub mod renderer;
pub mod retry;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, WorkerContext};
pub use notifier::Notifier;
pub use renderer::{RenderOutput, RenderRequest, RendererClient, RendererConfig};
pub use retry::{retry_async, FailureTracker, RetryConfig, RetryResult};
