use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::clock::now_ms;
use crate::config::IdempotencyConfig;
use crate::error::StoreError;
use crate::store::{
    CacheStore, CachedResponse, CreateOutcome, IdempotencyRecord, RecordState, RecordStore,
};

/// Outcome of admitting a keyed request.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// No usable prior record; execute the handler, then call `complete`
    /// with the outcome if it succeeded.
    Proceed(RecordHandle),
    /// A completed record with a matching fingerprint exists; return this
    /// response verbatim.
    Replay { status: u16, body: String },
    /// The key was already used with a different payload.
    Conflict,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordHandle {
    pub key: String,
    pub route: String,
    pub method: String,
    pub actor_id: Option<String>,
    pub tenant_id: Option<String>,
    pub fingerprint: String,
    pub created_at_ms: i64,
}

#[derive(Debug, Clone)]
pub struct AdmitRequest {
    pub key: String,
    pub route: String,
    pub method: String,
    pub actor_id: Option<String>,
    pub tenant_id: Option<String>,
    pub fingerprint: String,
}

pub struct IdempotencyCoordinator {
    cache: Arc<dyn CacheStore>,
    records: Arc<dyn RecordStore>,
    config: IdempotencyConfig,
}

impl IdempotencyCoordinator {
    pub fn new(
        cache: Arc<dyn CacheStore>,
        records: Arc<dyn RecordStore>,
        config: IdempotencyConfig,
    ) -> Self {
        Self {
            cache,
            records,
            config,
        }
    }

    /// The full admission chain: fast cache, then durable store, then an
    /// atomic create of a pending record. Store faults never surface to the
    /// caller; the request is treated as not-yet-seen so a legitimate retry
    /// is never blocked by infrastructure trouble.
    pub async fn admit(&self, request: AdmitRequest) -> Decision {
        let now = now_ms();
        let stale_before = now - (self.config.record_ttl_seconds as i64) * 1000;

        match self.checked(self.cache.get(&request.key)).await {
            Ok(Some(cached)) => {
                if cached.fingerprint == request.fingerprint {
                    return Decision::Replay {
                        status: cached.status,
                        body: cached.body,
                    };
                }
                return Decision::Conflict;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(key = %request.key, error = %e, "idempotency cache read failed, falling through to durable store");
            }
        }

        match self.checked(self.records.get(&request.key)).await {
            Ok(Some(record)) if record.created_at_ms >= stale_before => {
                return self.decide_on_existing(record, &request).await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(key = %request.key, error = %e, "idempotency record read failed, treating key as unseen");
            }
        }

        let record = IdempotencyRecord::pending(
            request.key.clone(),
            request.route.clone(),
            request.method.clone(),
            request.actor_id.clone(),
            request.tenant_id.clone(),
            request.fingerprint.clone(),
            now,
        );
        match self
            .checked(self.records.create_if_absent(record, stale_before))
            .await
        {
            Ok(CreateOutcome::Created) => Decision::Proceed(self.handle_for(&request, now)),
            // Lost the create race: decide on whatever the winner wrote.
            Ok(CreateOutcome::Existing(existing)) => {
                self.decide_on_existing(existing, &request).await
            }
            Err(e) => {
                tracing::warn!(key = %request.key, error = %e, "pending record create failed, proceeding unrecorded");
                Decision::Proceed(self.handle_for(&request, now))
            }
        }
    }

    async fn decide_on_existing(
        &self,
        record: IdempotencyRecord,
        request: &AdmitRequest,
    ) -> Decision {
        if record.fingerprint != request.fingerprint {
            return Decision::Conflict;
        }
        match record.state {
            RecordState::Completed => {
                let status = record.response_status.unwrap_or(200);
                let body = record.response_body.clone().unwrap_or_default();
                self.backfill_cache(&record, status, &body).await;
                Decision::Replay { status, body }
            }
            // A concurrent attempt is in flight with the same payload. Both
            // run; completion is last-write-wins. Deployments that cannot
            // tolerate a double execution should replace this branch with a
            // short-lived lock on the key.
            RecordState::Pending => Decision::Proceed(RecordHandle {
                key: record.key,
                route: record.route,
                method: record.method,
                actor_id: record.actor_id,
                tenant_id: record.tenant_id,
                fingerprint: record.fingerprint,
                created_at_ms: record.created_at_ms,
            }),
        }
    }

    /// Store the final outcome and refresh both layers. Only success-class
    /// outcomes are recorded; failed attempts stay retryable under the same
    /// key. Write failures are logged and swallowed, the response has
    /// already been produced and a lost write only costs a future replay.
    pub async fn complete(&self, handle: RecordHandle, status: u16, body: String) {
        let completed_at = now_ms();
        let record = IdempotencyRecord {
            key: handle.key.clone(),
            route: handle.route,
            method: handle.method,
            actor_id: handle.actor_id,
            tenant_id: handle.tenant_id,
            fingerprint: handle.fingerprint.clone(),
            state: RecordState::Completed,
            response_status: Some(status),
            response_body: Some(body.clone()),
            created_at_ms: handle.created_at_ms,
            completed_at_ms: Some(completed_at),
        };
        if let Err(e) = self.checked(self.records.complete(record)).await {
            tracing::warn!(key = %handle.key, error = %e, "failed to persist completed idempotency record");
        }
        let cached = CachedResponse {
            fingerprint: handle.fingerprint,
            status,
            body,
        };
        if let Err(e) = self
            .checked(self.cache.put(&handle.key, cached, self.cache_ttl()))
            .await
        {
            tracing::warn!(key = %handle.key, error = %e, "failed to cache completed response");
        }
    }

    async fn backfill_cache(&self, record: &IdempotencyRecord, status: u16, body: &str) {
        let cached = CachedResponse {
            fingerprint: record.fingerprint.clone(),
            status,
            body: body.to_string(),
        };
        if let Err(e) = self
            .checked(self.cache.put(&record.key, cached, self.cache_ttl()))
            .await
        {
            tracing::warn!(key = %record.key, error = %e, "cache backfill failed");
        }
    }

    fn handle_for(&self, request: &AdmitRequest, created_at_ms: i64) -> RecordHandle {
        RecordHandle {
            key: request.key.clone(),
            route: request.route.clone(),
            method: request.method.clone(),
            actor_id: request.actor_id.clone(),
            tenant_id: request.tenant_id.clone(),
            fingerprint: request.fingerprint.clone(),
            created_at_ms,
        }
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache_ttl_seconds)
    }

    async fn checked<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let timeout = Duration::from_millis(self.config.store_timeout_ms);
        match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryCache, InMemoryRecordStore};
    use async_trait::async_trait;

    fn coordinator() -> (
        IdempotencyCoordinator,
        Arc<InMemoryCache>,
        Arc<InMemoryRecordStore>,
    ) {
        coordinator_with(IdempotencyConfig::default())
    }

    fn coordinator_with(
        config: IdempotencyConfig,
    ) -> (
        IdempotencyCoordinator,
        Arc<InMemoryCache>,
        Arc<InMemoryRecordStore>,
    ) {
        let cache = Arc::new(InMemoryCache::new());
        let records = Arc::new(InMemoryRecordStore::new());
        let coordinator =
            IdempotencyCoordinator::new(cache.clone(), records.clone(), config);
        (coordinator, cache, records)
    }

    fn admit_request(key: &str, fingerprint: &str) -> AdmitRequest {
        AdmitRequest {
            key: key.into(),
            route: "/v1/projects".into(),
            method: "POST".into(),
            actor_id: Some("u-1".into()),
            tenant_id: Some("t-1".into()),
            fingerprint: fingerprint.into(),
        }
    }

    #[tokio::test]
    async fn first_sighting_proceeds() {
        let (c, _, records) = coordinator();
        let decision = c.admit(admit_request("k-1", "fp-a")).await;
        match decision {
            Decision::Proceed(handle) => {
                assert_eq!(handle.key, "k-1");
                assert_eq!(handle.fingerprint, "fp-a");
            }
            other => panic!("expected Proceed, got {other:?}"),
        }
        assert_eq!(records.count(), 1);
    }

    #[tokio::test]
    async fn completed_key_replays_byte_for_byte() {
        let (c, _, _) = coordinator();
        let Decision::Proceed(handle) = c.admit(admit_request("k-1", "fp-a")).await else {
            panic!("expected Proceed");
        };
        c.complete(handle, 201, r#"{"id":"p1"}"#.into()).await;

        let decision = c.admit(admit_request("k-1", "fp-a")).await;
        assert_eq!(
            decision,
            Decision::Replay {
                status: 201,
                body: r#"{"id":"p1"}"#.into()
            }
        );
    }

    #[tokio::test]
    async fn completed_key_with_other_payload_conflicts() {
        let (c, _, _) = coordinator();
        let Decision::Proceed(handle) = c.admit(admit_request("k-1", "fp-a")).await else {
            panic!("expected Proceed");
        };
        c.complete(handle, 201, "{}".into()).await;

        let decision = c.admit(admit_request("k-1", "fp-b")).await;
        assert_eq!(decision, Decision::Conflict);
    }

    #[tokio::test]
    async fn pending_key_with_other_payload_conflicts() {
        let (c, _, _) = coordinator();
        let Decision::Proceed(_) = c.admit(admit_request("k-1", "fp-a")).await else {
            panic!("expected Proceed");
        };
        let decision = c.admit(admit_request("k-1", "fp-b")).await;
        assert_eq!(decision, Decision::Conflict);
    }

    #[tokio::test]
    async fn pending_key_with_same_payload_proceeds_again() {
        let (c, _, records) = coordinator();
        let Decision::Proceed(_) = c.admit(admit_request("k-1", "fp-a")).await else {
            panic!("expected Proceed");
        };
        let decision = c.admit(admit_request("k-1", "fp-a")).await;
        assert!(matches!(decision, Decision::Proceed(_)));
        assert_eq!(records.count(), 1);
    }

    #[tokio::test]
    async fn failed_attempt_is_not_cached() {
        let (c, _, _) = coordinator();
        let Decision::Proceed(_) = c.admit(admit_request("k-1", "fp-a")).await else {
            panic!("expected Proceed");
        };
        // Handler failed; complete is never called. The retry runs again.
        let decision = c.admit(admit_request("k-1", "fp-a")).await;
        assert!(matches!(decision, Decision::Proceed(_)));
    }

    #[tokio::test]
    async fn replay_served_from_cache_without_durable_store() {
        let (c, cache, records) = coordinator();
        let Decision::Proceed(handle) = c.admit(admit_request("k-1", "fp-a")).await else {
            panic!("expected Proceed");
        };
        c.complete(handle, 200, "done".into()).await;
        assert_eq!(cache.count(), 1);

        // Wipe the durable layer; the cached copy must still answer.
        records.purge_expired(i64::MAX).await.unwrap();
        let decision = c.admit(admit_request("k-1", "fp-a")).await;
        assert_eq!(
            decision,
            Decision::Replay {
                status: 200,
                body: "done".into()
            }
        );
    }

    #[tokio::test]
    async fn cached_entry_with_other_payload_conflicts() {
        let (c, _, _) = coordinator();
        let Decision::Proceed(handle) = c.admit(admit_request("k-1", "fp-a")).await else {
            panic!("expected Proceed");
        };
        c.complete(handle, 200, "done".into()).await;
        assert_eq!(c.admit(admit_request("k-1", "fp-b")).await, Decision::Conflict);
    }

    #[tokio::test]
    async fn durable_hit_backfills_cache() {
        let (c, _, records) = coordinator();
        let Decision::Proceed(handle) = c.admit(admit_request("k-1", "fp-a")).await else {
            panic!("expected Proceed");
        };
        c.complete(handle, 200, "done".into()).await;

        // Drop the cache entry; the durable record must repopulate it.
        let fresh_cache = Arc::new(InMemoryCache::new());
        let c2 = IdempotencyCoordinator::new(
            fresh_cache.clone(),
            records,
            IdempotencyConfig::default(),
        );
        let decision = c2.admit(admit_request("k-1", "fp-a")).await;
        assert!(matches!(decision, Decision::Replay { .. }));
        assert_eq!(fresh_cache.count(), 1);
    }

    #[tokio::test]
    async fn expired_record_is_recycled() {
        let (c, _, records) = coordinator_with(IdempotencyConfig {
            record_ttl_seconds: 1,
            ..IdempotencyConfig::default()
        });
        // Seed a record far in the past, beyond the 1s TTL.
        let stale = IdempotencyRecord::pending(
            "k-1".into(),
            "/v1/projects".into(),
            "POST".into(),
            None,
            None,
            "fp-old".into(),
            1000,
        );
        records.create_if_absent(stale, 0).await.unwrap();

        // Different fingerprint, but the stale record no longer binds the key.
        let decision = c.admit(admit_request("k-1", "fp-new")).await;
        assert!(matches!(decision, Decision::Proceed(_)));
        let record = records.get("k-1").await.unwrap().unwrap();
        assert_eq!(record.fingerprint, "fp-new");
    }

    #[tokio::test]
    async fn concurrent_admits_create_exactly_one_record() {
        let (c, _, records) = coordinator();
        let c = Arc::new(c);

        let mut handles = Vec::new();
        for _ in 0..16 {
            let c = c.clone();
            handles.push(tokio::spawn(async move {
                c.admit(admit_request("k-race", "fp-a")).await
            }));
        }
        for h in handles {
            let decision = h.await.unwrap();
            assert!(
                matches!(decision, Decision::Proceed(_) | Decision::Replay { .. }),
                "racing admit must never conflict on identical payloads: {decision:?}"
            );
        }
        assert_eq!(records.count(), 1);
    }

    #[tokio::test]
    async fn double_completion_is_last_write_wins() {
        let (c, _, records) = coordinator();
        let Decision::Proceed(h1) = c.admit(admit_request("k-1", "fp-a")).await else {
            panic!("expected Proceed");
        };
        let Decision::Proceed(h2) = c.admit(admit_request("k-1", "fp-a")).await else {
            panic!("expected Proceed");
        };
        c.complete(h1, 201, "first".into()).await;
        c.complete(h2, 201, "second".into()).await;

        let record = records.get("k-1").await.unwrap().unwrap();
        assert_eq!(record.response_body.as_deref(), Some("second"));
        assert!(record.is_completed());
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<CachedResponse>, StoreError> {
            Err(StoreError::Unavailable("cache down".into()))
        }
        async fn put(
            &self,
            _key: &str,
            _value: CachedResponse,
            _ttl: Duration,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("cache down".into()))
        }
    }

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
            Err(StoreError::Unavailable("db down".into()))
        }
        async fn create_if_absent(
            &self,
            _record: IdempotencyRecord,
            _stale_before_ms: i64,
        ) -> Result<CreateOutcome, StoreError> {
            Err(StoreError::Unavailable("db down".into()))
        }
        async fn complete(&self, _record: IdempotencyRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("db down".into()))
        }
        async fn purge_expired(&self, _cutoff_ms: i64) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("db down".into()))
        }
    }

    #[tokio::test]
    async fn store_outage_fails_open() {
        let c = IdempotencyCoordinator::new(
            Arc::new(BrokenStore),
            Arc::new(BrokenStore),
            IdempotencyConfig::default(),
        );
        let decision = c.admit(admit_request("k-1", "fp-a")).await;
        assert!(matches!(decision, Decision::Proceed(_)));

        // Completion against a dead store must not panic or error out.
        let Decision::Proceed(handle) = decision else {
            unreachable!()
        };
        c.complete(handle, 200, "ok".into()).await;
    }

    struct StalledStore;

    #[async_trait]
    impl CacheStore for StalledStore {
        async fn get(&self, _key: &str) -> Result<Option<CachedResponse>, StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
        async fn put(
            &self,
            _key: &str,
            _value: CachedResponse,
            _ttl: Duration,
        ) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[async_trait]
    impl RecordStore for StalledStore {
        async fn get(&self, _key: &str) -> Result<Option<IdempotencyRecord>, StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
        async fn create_if_absent(
            &self,
            _record: IdempotencyRecord,
            _stale_before_ms: i64,
        ) -> Result<CreateOutcome, StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(CreateOutcome::Created)
        }
        async fn complete(&self, _record: IdempotencyRecord) -> Result<(), StoreError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
        async fn purge_expired(&self, _cutoff_ms: i64) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_store_times_out_and_fails_open() {
        let c = IdempotencyCoordinator::new(
            Arc::new(StalledStore),
            Arc::new(StalledStore),
            IdempotencyConfig {
                store_timeout_ms: 50,
                ..IdempotencyConfig::default()
            },
        );
        let decision = c.admit(admit_request("k-1", "fp-a")).await;
        assert!(matches!(decision, Decision::Proceed(_)));
    }
}
