//! Payout request repository.

use inkpost_models::{PayoutId, PayoutRequest, PayoutStatus, TransitionResult};

use crate::client::RedisStore;
use crate::error::{StoreError, StoreResult};
use crate::retry::{with_retry, RetryConfig};

/// Typed access to payout request records.
#[derive(Clone)]
pub struct PayoutRepository {
    store: RedisStore,
    retry: RetryConfig,
}

impl PayoutRepository {
    pub fn new(store: RedisStore) -> Self {
        Self {
            store,
            retry: RetryConfig::from_env(),
        }
    }

    fn record_key(&self, id: &PayoutId) -> String {
        self.store.key(&format!("payout:{}", id))
    }

    fn status_index(&self, status: PayoutStatus) -> String {
        self.store.key(&format!("payouts:status:{}", status.as_str()))
    }

    fn user_index(&self, user_id: &str) -> String {
        self.store.key(&format!("payouts:user:{}", user_id))
    }

    /// Persist a freshly created request.
    pub async fn create(&self, request: &PayoutRequest) -> StoreResult<()> {
        let key = self.record_key(&request.id);
        self.store
            .create_record(&key, request.status.as_str(), request)
            .await?;

        let score = request.created_at.timestamp_millis();
        self.store
            .index_add(&self.user_index(&request.user_id), request.id.as_str(), score)
            .await?;
        self.store
            .index_add(&self.status_index(request.status), request.id.as_str(), score)
            .await?;
        Ok(())
    }

    /// Fetch a request by ID.
    pub async fn get(&self, id: &PayoutId) -> StoreResult<Option<PayoutRequest>> {
        let key = self.record_key(id);
        with_retry(&self.retry, "payout_get", || self.store.get_record(&key)).await
    }

    /// Fetch a request by ID, erroring when absent.
    pub async fn get_required(&self, id: &PayoutId) -> StoreResult<PayoutRequest> {
        self.get(id)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("payout:{}", id)))
    }

    /// Most recent requests in one status.
    pub async fn list_in_status(
        &self,
        status: PayoutStatus,
        limit: usize,
    ) -> StoreResult<Vec<PayoutRequest>> {
        let ids = self
            .store
            .index_newest(&self.status_index(status), limit)
            .await?;
        self.fetch_many(&ids).await
    }

    /// Most recent requests for one user.
    pub async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> StoreResult<Vec<PayoutRequest>> {
        let ids = self
            .store
            .index_newest(&self.user_index(user_id), limit)
            .await?;
        self.fetch_many(&ids).await
    }

    /// Apply a state transition and persist it with a compare-and-set on
    /// the status observed before the transition.
    pub async fn transition<F>(&self, id: &PayoutId, op: F) -> StoreResult<PayoutRequest>
    where
        F: FnOnce(&mut PayoutRequest) -> TransitionResult<()>,
    {
        let key = self.record_key(id);
        let mut request: PayoutRequest = self
            .store
            .get_record(&key)
            .await?
            .ok_or_else(|| StoreError::not_found(&key))?;

        let before = request.status;
        op(&mut request)?;

        self.store
            .cas_update(&key, before.as_str(), request.status.as_str(), &request)
            .await?;

        if before != request.status {
            self.store
                .index_move(
                    &self.status_index(before),
                    &self.status_index(request.status),
                    request.id.as_str(),
                    request.updated_at.timestamp_millis(),
                )
                .await?;
        }

        Ok(request)
    }

    async fn fetch_many(&self, ids: &[String]) -> StoreResult<Vec<PayoutRequest>> {
        let mut requests = Vec::with_capacity(ids.len());
        for id in ids {
            let key = self.store.key(&format!("payout:{}", id));
            if let Some(request) = self.store.get_record::<PayoutRequest>(&key).await? {
                requests.push(request);
            }
        }
        Ok(requests)
    }
}
