//! Video generation repository.

use chrono::{DateTime, Utc};
use inkpost_models::{GenerationId, GenerationStatus, TransitionResult, VideoGeneration};

use crate::client::RedisStore;
use crate::error::{StoreError, StoreResult};
use crate::retry::{with_retry, RetryConfig};

/// Typed access to video generation records.
///
/// Besides the per-status listing indexes, scheduled records live in a
/// dedicated index scored by `scheduled_at`, which is what the sweep scans
/// for due work.
#[derive(Clone)]
pub struct GenerationRepository {
    store: RedisStore,
    retry: RetryConfig,
}

impl GenerationRepository {
    pub fn new(store: RedisStore) -> Self {
        Self {
            store,
            retry: RetryConfig::from_env(),
        }
    }

    fn record_key(&self, id: &GenerationId) -> String {
        self.store.key(&format!("gen:{}", id))
    }

    fn status_index(&self, status: GenerationStatus) -> String {
        self.store.key(&format!("gens:status:{}", status.as_str()))
    }

    fn user_index(&self, user_id: &str) -> String {
        self.store.key(&format!("gens:user:{}", user_id))
    }

    fn schedule_index(&self) -> String {
        self.store.key("gens:scheduled")
    }

    /// Persist a freshly created record.
    pub async fn create(&self, gen: &VideoGeneration) -> StoreResult<()> {
        let key = self.record_key(&gen.id);
        self.store
            .create_record(&key, gen.status.as_str(), gen)
            .await?;

        let score = gen.created_at.timestamp_millis();
        self.store
            .index_add(&self.user_index(&gen.user_id), gen.id.as_str(), score)
            .await?;
        self.store
            .index_add(&self.status_index(gen.status), gen.id.as_str(), score)
            .await?;

        if let Some(at) = gen.scheduled_at {
            self.store
                .index_add(&self.schedule_index(), gen.id.as_str(), at.timestamp_millis())
                .await?;
        }
        Ok(())
    }

    /// Fetch a record by ID.
    pub async fn get(&self, id: &GenerationId) -> StoreResult<Option<VideoGeneration>> {
        let key = self.record_key(id);
        with_retry(&self.retry, "generation_get", || self.store.get_record(&key)).await
    }

    /// Fetch a record by ID, erroring when absent.
    pub async fn get_required(&self, id: &GenerationId) -> StoreResult<VideoGeneration> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("gen:{}", id)))
    }

    /// Most recent requests for one user.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<VideoGeneration>> {
        let ids = self
            .store
            .index_newest(&self.user_index(user_id), limit)
            .await?;
        self.fetch_many(&ids).await
    }

    /// Most recent requests in one status.
    pub async fn list_in_status(
        &self,
        status: GenerationStatus,
        limit: usize,
    ) -> StoreResult<Vec<VideoGeneration>> {
        let ids = self
            .store
            .index_newest(&self.status_index(status), limit)
            .await?;
        self.fetch_many(&ids).await
    }

    /// Scheduled records whose start time has passed, oldest first.
    pub async fn due_scheduled(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<VideoGeneration>> {
        let ids = self
            .store
            .index_due(&self.schedule_index(), now.timestamp_millis(), limit)
            .await?;
        let generations = self.fetch_many(&ids).await?;
        // Index entries can outlive a force-now/cancel; trust the record.
        Ok(generations
            .into_iter()
            .filter(|g| g.due_for_processing(now))
            .collect())
    }

    /// Apply a state transition and persist it with a compare-and-set on
    /// the status observed before the transition.
    pub async fn transition<F>(&self, id: &GenerationId, op: F) -> StoreResult<VideoGeneration>
    where
        F: FnOnce(&mut VideoGeneration) -> TransitionResult<()>,
    {
        let key = self.record_key(id);
        let mut gen: VideoGeneration = self
            .store
            .get_record(&key)
            .await?
            .ok_or_else(|| StoreError::not_found(&key))?;

        let before = gen.status;
        let was_scheduled = gen.scheduled_at.is_some() && before == GenerationStatus::Scheduled;
        op(&mut gen)?;

        self.store
            .cas_update(&key, before.as_str(), gen.status.as_str(), &gen)
            .await?;

        if before != gen.status {
            self.store
                .index_move(
                    &self.status_index(before),
                    &self.status_index(gen.status),
                    gen.id.as_str(),
                    gen.updated_at.timestamp_millis(),
                )
                .await?;
        }

        // Keep the schedule index in line with the scheduled status.
        let is_scheduled = gen.status == GenerationStatus::Scheduled;
        if is_scheduled {
            if let Some(at) = gen.scheduled_at {
                self.store
                    .index_add(&self.schedule_index(), gen.id.as_str(), at.timestamp_millis())
                    .await?;
            }
        } else if was_scheduled {
            self.store
                .index_remove(&self.schedule_index(), gen.id.as_str())
                .await?;
        }

        Ok(gen)
    }

    async fn fetch_many(&self, ids: &[String]) -> StoreResult<Vec<VideoGeneration>> {
        let mut generations = Vec::with_capacity(ids.len());
        for id in ids {
            let key = self.store.key(&format!("gen:{}", id));
            if let Some(gen) = self.store.get_record::<VideoGeneration>(&key).await? {
                generations.push(gen);
            }
        }
        Ok(generations)
    }
}
