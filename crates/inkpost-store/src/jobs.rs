//! Job status repository.

use inkpost_models::{JobId, JobState, JobStatus, TransitionResult};

use crate::client::RedisStore;
use crate::error::{StoreError, StoreResult};
use crate::retry::{with_retry, RetryConfig};

/// Typed access to job status records.
#[derive(Clone)]
pub struct JobRepository {
    store: RedisStore,
    retry: RetryConfig,
}

impl JobRepository {
    pub fn new(store: RedisStore) -> Self {
        Self {
            store,
            retry: RetryConfig::from_env(),
        }
    }

    fn record_key(&self, id: &JobId) -> String {
        self.store.key(&format!("job:{}", id))
    }

    fn status_index(&self, state: JobState) -> String {
        self.store.key(&format!("jobs:status:{}", state.as_str()))
    }

    fn all_index(&self) -> String {
        self.store.key("jobs:all")
    }

    /// Persist a freshly created record.
    pub async fn create(&self, job: &JobStatus) -> StoreResult<()> {
        let key = self.record_key(&job.job_id);
        self.store
            .create_record(&key, job.status.as_str(), job)
            .await?;

        let score = job.created_at.timestamp_millis();
        self.store
            .index_add(&self.all_index(), job.job_id.as_str(), score)
            .await?;
        self.store
            .index_add(&self.status_index(job.status), job.job_id.as_str(), score)
            .await?;
        Ok(())
    }

    /// Fetch a record by ID.
    pub async fn get(&self, id: &JobId) -> StoreResult<Option<JobStatus>> {
        let key = self.record_key(id);
        with_retry(&self.retry, "job_get", || self.store.get_record(&key)).await
    }

    /// Fetch a record by ID, erroring when absent.
    pub async fn get_required(&self, id: &JobId) -> StoreResult<JobStatus> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("job:{}", id)))
    }

    /// Most recently created jobs.
    pub async fn list_recent(&self, limit: usize) -> StoreResult<Vec<JobStatus>> {
        let ids = self.store.index_newest(&self.all_index(), limit).await?;
        self.fetch_many(&ids).await
    }

    /// Most recently created jobs in one state.
    pub async fn list_in_state(&self, state: JobState, limit: usize) -> StoreResult<Vec<JobStatus>> {
        let ids = self
            .store
            .index_newest(&self.status_index(state), limit)
            .await?;
        self.fetch_many(&ids).await
    }

    /// Apply a state transition and persist it with a compare-and-set on
    /// the status observed before the transition.
    ///
    /// A concurrent writer surfaces as [`StoreError::Conflict`]; an illegal
    /// edge surfaces as [`StoreError::Transition`]. In both cases the
    /// stored record is untouched.
    pub async fn transition<F>(&self, id: &JobId, op: F) -> StoreResult<JobStatus>
    where
        F: FnOnce(&mut JobStatus) -> TransitionResult<()>,
    {
        let key = self.record_key(id);
        let mut job: JobStatus = self
            .store
            .get_record(&key)
            .await?
            .ok_or_else(|| StoreError::not_found(&key))?;

        let before = job.status;
        op(&mut job)?;

        self.store
            .cas_update(&key, before.as_str(), job.status.as_str(), &job)
            .await?;

        if before != job.status {
            self.store
                .index_move(
                    &self.status_index(before),
                    &self.status_index(job.status),
                    job.job_id.as_str(),
                    job.updated_at.timestamp_millis(),
                )
                .await?;
        }

        Ok(job)
    }

    async fn fetch_many(&self, ids: &[String]) -> StoreResult<Vec<JobStatus>> {
        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let key = self.store.key(&format!("job:{}", id));
            if let Some(job) = self.store.get_record::<JobStatus>(&key).await? {
                jobs.push(job);
            }
        }
        Ok(jobs)
    }
}
