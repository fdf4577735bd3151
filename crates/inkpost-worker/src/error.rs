//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("queue error: {0}")]
    Queue(#[from] inkpost_queue::QueueError),

    #[error("store error: {0}")]
    Store(#[from] inkpost_store::StoreError),

    #[error("renderer error: {0}")]
    Renderer(String),

    #[error("render timed out after {0} seconds")]
    RenderTimeout(u64),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl WorkerError {
    pub fn renderer(msg: impl Into<String>) -> Self {
        Self::Renderer(msg.into())
    }
}
