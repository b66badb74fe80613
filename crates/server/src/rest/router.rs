use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::Router;

use opsdeck_gate::idempotency::IdempotencyCoordinator;
use opsdeck_gate::limiter::RateLimiter;
use opsdeck_gate::policy::PolicyTable;
use opsdeck_gate::store::{CacheStore, InMemoryCache, InMemoryRecordStore, RecordStore};

use super::{health, metrics, projects};
use crate::config::ServerConfig;
use crate::metrics::gate_metrics::GateMetrics;
use crate::middleware::{idempotency, rate_limit};
use crate::store::ProjectStore;

#[derive(Clone)]
pub struct AppState {
    pub limiter: RateLimiter,
    pub coordinator: Arc<IdempotencyCoordinator>,
    pub policies: Arc<PolicyTable>,
    pub projects: ProjectStore,
    pub metrics: Arc<GateMetrics>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_stores(
            config,
            Arc::new(InMemoryCache::new()),
            Arc::new(InMemoryRecordStore::new()),
        )
    }

    /// Build with externally supplied store layers (a Redis cache, a SQL
    /// record table, or test doubles).
    pub fn with_stores(
        config: ServerConfig,
        cache: Arc<dyn CacheStore>,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        let gate = &config.gate;
        let limiter = RateLimiter::new(
            gate.limits.clone(),
            gate.ban.clone(),
            gate.auth_route_prefixes.clone(),
        );
        let coordinator = Arc::new(IdempotencyCoordinator::new(
            cache,
            records,
            gate.idempotency.clone(),
        ));
        let policies = Arc::new(PolicyTable::from_rules(&gate.routes));
        Self {
            limiter,
            coordinator,
            policies,
            projects: ProjectStore::new(),
            metrics: GateMetrics::new(),
            config: Arc::new(config),
        }
    }
}

pub fn router(state: AppState) -> Router {
    // Rate limiting is the outer layer: denied traffic never reaches the
    // idempotency stage or a handler.
    let guarded = Router::new()
        .route(
            "/v1/projects",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/v1/projects/{project_id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .layer(from_fn_with_state(state.clone(), idempotency::idempotency))
        .layer(from_fn_with_state(state.clone(), rate_limit::rate_limit));

    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/ready", get(health::ready))
        .route("/metrics", get(metrics::metrics))
        .merge(guarded)
        .with_state(state)
}
