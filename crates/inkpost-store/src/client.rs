//! Redis-backed record store.
//!
//! Records are stored as hashes with two fields: `status` (the bare status
//! string, used as the compare-and-set guard) and `json` (the full record).
//! Every mutation goes through [`RedisStore::cas_update`], which applies the
//! write only when the stored status still matches the pre-state the caller
//! observed. Listing indexes are sorted sets scored by timestamp.

use redis::aio::MultiplexedConnection;
use redis::Script;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{StoreError, StoreResult};

/// Creates the record hash only when the key does not exist yet.
const CREATE_SCRIPT: &str = r#"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1], 'status', ARGV[1], 'json', ARGV[2])
return 1
"#;

/// Replaces the record iff the stored status equals the expected pre-state.
/// Returns 1 on success, 0 on a status mismatch, -1 when the key is gone.
const CAS_SCRIPT: &str = r#"
local current = redis.call('HGET', KEYS[1], 'status')
if current == false then
  return -1
end
if current ~= ARGV[1] then
  return 0
end
redis.call('HSET', KEYS[1], 'status', ARGV[2], 'json', ARGV[3])
return 1
"#;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis URL
    pub redis_url: String,
    /// Prefix for every key this store writes
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            key_prefix: "inkpost".to_string(),
        }
    }
}

impl StoreConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            key_prefix: std::env::var("STORE_KEY_PREFIX")
                .unwrap_or_else(|_| "inkpost".to_string()),
        }
    }
}

/// Record store client.
#[derive(Clone)]
pub struct RedisStore {
    client: redis::Client,
    config: StoreConfig,
}

impl RedisStore {
    /// Create a new store.
    pub fn new(config: StoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> StoreResult<Self> {
        Self::new(StoreConfig::from_env())
    }

    pub(crate) async fn conn(&self) -> StoreResult<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Build a namespaced key.
    pub fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.config.key_prefix, suffix)
    }

    /// Ping the server (readiness probes).
    pub async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("PING").query_async::<()>(&mut conn).await?;
        Ok(())
    }

    /// Fetch a record by key.
    pub async fn get_record<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        let mut conn = self.conn().await?;
        let json: Option<String> = redis::cmd("HGET")
            .arg(key)
            .arg("json")
            .query_async(&mut conn)
            .await?;

        match json {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    /// Insert a new record; fails if the key already exists.
    pub async fn create_record<T: Serialize>(
        &self,
        key: &str,
        status: &str,
        record: &T,
    ) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(record)?;

        let created: i64 = Script::new(CREATE_SCRIPT)
            .key(key)
            .arg(status)
            .arg(&payload)
            .invoke_async(&mut conn)
            .await?;

        if created == 0 {
            return Err(StoreError::AlreadyExists(key.to_string()));
        }

        debug!(key, status, "created record");
        Ok(())
    }

    /// Atomically replace a record, guarded by the status the caller
    /// observed before applying the transition.
    pub async fn cas_update<T: Serialize>(
        &self,
        key: &str,
        expected_status: &str,
        new_status: &str,
        record: &T,
    ) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(record)?;

        let outcome: i64 = Script::new(CAS_SCRIPT)
            .key(key)
            .arg(expected_status)
            .arg(new_status)
            .arg(&payload)
            .invoke_async(&mut conn)
            .await?;

        match outcome {
            1 => {
                debug!(key, from = expected_status, to = new_status, "record transitioned");
                Ok(())
            }
            -1 => Err(StoreError::not_found(key)),
            _ => {
                // Re-read the winner's status for the error message.
                let found: Option<String> = redis::cmd("HGET")
                    .arg(key)
                    .arg("status")
                    .query_async(&mut conn)
                    .await?;
                Err(StoreError::Conflict {
                    expected: expected_status.to_string(),
                    found: found.unwrap_or_else(|| "<deleted>".to_string()),
                })
            }
        }
    }

    /// Add a member to a scored listing index.
    pub async fn index_add(&self, index: &str, member: &str, score: i64) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("ZADD")
            .arg(index)
            .arg(score)
            .arg(member)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Remove a member from a listing index.
    pub async fn index_remove(&self, index: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        redis::cmd("ZREM")
            .arg(index)
            .arg(member)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Move a member between two status indexes in one round trip.
    pub async fn index_move(
        &self,
        from: &str,
        to: &str,
        member: &str,
        score: i64,
    ) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        redis::pipe()
            .atomic()
            .cmd("ZREM")
            .arg(from)
            .arg(member)
            .ignore()
            .cmd("ZADD")
            .arg(to)
            .arg(score)
            .arg(member)
            .ignore()
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    /// Newest members of an index, up to `limit`.
    pub async fn index_newest(&self, index: &str, limit: usize) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = redis::cmd("ZREVRANGE")
            .arg(index)
            .arg(0)
            .arg(limit.saturating_sub(1))
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }

    /// Members of an index with a score at or below `max_score`, oldest
    /// first, up to `limit`.
    pub async fn index_due(
        &self,
        index: &str,
        max_score: i64,
        limit: usize,
    ) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let members: Vec<String> = redis::cmd("ZRANGEBYSCORE")
            .arg(index)
            .arg("-inf")
            .arg(max_score)
            .arg("LIMIT")
            .arg(0)
            .arg(limit)
            .query_async(&mut conn)
            .await?;
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_prefixed() {
        let store = RedisStore::new(StoreConfig::default()).unwrap();
        assert_eq!(store.key("job:abc"), "inkpost:job:abc");
    }

    #[test]
    fn test_config_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.key_prefix, "inkpost");
        assert!(config.redis_url.starts_with("redis://"));
    }
}
