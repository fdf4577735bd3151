//! Application state.

use std::sync::Arc;

use inkpost_queue::{ProgressChannel, WorkQueue};
use inkpost_store::{GenerationRepository, JobRepository, PayoutRepository, RedisStore};

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub store: RedisStore,
    pub jobs: JobRepository,
    pub generations: GenerationRepository,
    pub payouts: PayoutRepository,
    pub queue: Arc<WorkQueue>,
    pub progress: Arc<ProgressChannel>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: ApiConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = RedisStore::from_env()?;
        let queue = WorkQueue::from_env()?;

        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let progress = ProgressChannel::new(&redis_url)?;

        Ok(Self {
            config,
            jobs: JobRepository::new(store.clone()),
            generations: GenerationRepository::new(store.clone()),
            payouts: PayoutRepository::new(store.clone()),
            store,
            queue: Arc::new(queue),
            progress: Arc::new(progress),
        })
    }
}
