use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::now_ms;
use crate::error::StoreError;
use crate::store::{CacheStore, CachedResponse, CreateOutcome, IdempotencyRecord, RecordStore};

#[derive(Clone)]
pub struct InMemoryCache {
    entries: Arc<DashMap<String, (CachedResponse, i64)>>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn evict_expired(&self) {
        let now = now_ms();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CachedResponse>, StoreError> {
        let expired = match self.entries.get(key) {
            Some(entry) => {
                let (value, expires_at) = entry.value();
                if *expires_at > now_ms() {
                    return Ok(Some(value.clone()));
                }
                true
            }
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: CachedResponse,
        ttl: Duration,
    ) -> Result<(), StoreError> {
        let expires_at = now_ms() + ttl.as_millis() as i64;
        self.entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }
}

#[derive(Clone)]
pub struct InMemoryRecordStore {
    records: Arc<DashMap<String, IdempotencyRecord>>,
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(DashMap::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get(&self, key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
        Ok(self.records.get(key).map(|r| r.clone()))
    }

    async fn create_if_absent(
        &self,
        record: IdempotencyRecord,
        stale_before_ms: i64,
    ) -> Result<CreateOutcome, StoreError> {
        match self.records.entry(record.key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().created_at_ms < stale_before_ms {
                    occupied.insert(record);
                    Ok(CreateOutcome::Created)
                } else {
                    Ok(CreateOutcome::Existing(occupied.get().clone()))
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
                Ok(CreateOutcome::Created)
            }
        }
    }

    async fn complete(&self, record: IdempotencyRecord) -> Result<(), StoreError> {
        self.records.insert(record.key.clone(), record);
        Ok(())
    }

    async fn purge_expired(&self, cutoff_ms: i64) -> Result<u64, StoreError> {
        let before = self.records.len();
        self.records.retain(|_, r| r.created_at_ms >= cutoff_ms);
        Ok((before - self.records.len()) as u64)
    }
}
