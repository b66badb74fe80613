mod memory;
mod record;

pub use memory::{InMemoryCache, InMemoryRecordStore};
pub use record::{CachedResponse, IdempotencyRecord, RecordState};

use async_trait::async_trait;
use std::time::Duration;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq)]
pub enum CreateOutcome {
    Created,
    Existing(IdempotencyRecord),
}

/// Low-latency first-check layer keyed by idempotency key. Entries expire by
/// TTL; a fingerprint travels with each response so replays can be verified
/// without a durable read.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>, StoreError>;
    async fn put(
        &self,
        key: &str,
        value: CachedResponse,
        ttl: Duration,
    ) -> Result<(), StoreError>;
}

/// Durable table of idempotency records. `create_if_absent` must be atomic:
/// a losing racer gets the existing record back instead of overwriting it.
/// Records created before `stale_before_ms` are recyclable and may be
/// replaced by a fresh create.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError>;
    async fn create_if_absent(
        &self,
        record: IdempotencyRecord,
        stale_before_ms: i64,
    ) -> Result<CreateOutcome, StoreError>;
    /// Upsert the final outcome; last completed write wins.
    async fn complete(&self, record: IdempotencyRecord) -> Result<(), StoreError>;
    /// Operational cleanup hook for expired rows; not called per-request.
    async fn purge_expired(&self, cutoff_ms: i64) -> Result<u64, StoreError>;
}
