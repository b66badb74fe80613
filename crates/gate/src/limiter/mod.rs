mod window;

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::now_ms;
use crate::config::{BanConfig, LimitClassConfig};
use crate::error::StoreError;

use window::WindowState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Epoch seconds at which a denied identifier regains a slot.
    pub reset_at: i64,
    pub window_seconds: u64,
    pub is_burst: bool,
    pub banned: bool,
    pub retry_after_seconds: Option<u64>,
}

impl Verdict {
    fn window_denial(cfg: &LimitClassConfig, reset_ms: i64, now_ms: i64) -> Self {
        Self {
            allowed: false,
            limit: cfg.requests_per_window,
            remaining: 0,
            reset_at: reset_ms / 1000,
            window_seconds: cfg.window_seconds,
            is_burst: false,
            banned: false,
            retry_after_seconds: Some(retry_after(reset_ms, now_ms)),
        }
    }

    fn ban_denial(cfg: &LimitClassConfig, until_ms: i64, now_ms: i64) -> Self {
        Self {
            allowed: false,
            limit: cfg.requests_per_window,
            remaining: 0,
            reset_at: until_ms / 1000,
            window_seconds: cfg.window_seconds,
            is_burst: false,
            banned: true,
            retry_after_seconds: Some(retry_after(until_ms, now_ms)),
        }
    }
}

fn retry_after(reset_ms: i64, now_ms: i64) -> u64 {
    (((reset_ms - now_ms).max(0) + 999) / 1000) as u64
}

#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<LimiterInner>,
}

struct LimiterInner {
    limits: HashMap<String, LimitClassConfig>,
    default_class: LimitClassConfig,
    ban: BanConfig,
    auth_prefixes: Vec<String>,
    entries: DashMap<String, WindowState>,
}

impl RateLimiter {
    pub fn new(
        limits: HashMap<String, LimitClassConfig>,
        ban: BanConfig,
        auth_prefixes: Vec<String>,
    ) -> Self {
        let default_class = limits
            .get(crate::config::DEFAULT_CLASS)
            .cloned()
            .unwrap_or_default();
        Self {
            inner: Arc::new(LimiterInner {
                limits,
                default_class,
                ban,
                auth_prefixes,
                entries: DashMap::new(),
            }),
        }
    }

    pub fn check(&self, identifier: &str, class: &str, route: &str) -> Verdict {
        self.check_at(now_ms(), identifier, class, route)
    }

    /// Fallible form of `check` for callers that handle degraded limiter
    /// state. The in-process window log cannot fault, so this always
    /// succeeds here; a store-backed limiter surfaces its I/O errors
    /// through the same signature and the adapter picks the configured
    /// fail posture.
    pub fn try_check(
        &self,
        identifier: &str,
        class: &str,
        route: &str,
    ) -> Result<Verdict, StoreError> {
        Ok(self.check_at(now_ms(), identifier, class, route))
    }

    /// Permissive verdict for the fail-open degrade path: the request is
    /// admitted with full headroom reported.
    pub fn open_verdict(&self, class: &str) -> Verdict {
        let cfg = self
            .inner
            .limits
            .get(class)
            .unwrap_or(&self.inner.default_class);
        Verdict {
            allowed: true,
            limit: cfg.requests_per_window,
            remaining: cfg.requests_per_window.saturating_sub(1),
            reset_at: (now_ms() + (cfg.window_seconds as i64) * 1000) / 1000,
            window_seconds: cfg.window_seconds,
            is_burst: false,
            banned: false,
            retry_after_seconds: None,
        }
    }

    /// True sliding window over a per-identifier admission log, with burst
    /// headroom and ban escalation. The whole read-purge-count-append
    /// sequence runs under one map entry guard, so two concurrent checks on
    /// the same identifier cannot both observe the pre-append count.
    pub fn check_at(&self, now_ms: i64, identifier: &str, class: &str, route: &str) -> Verdict {
        let inner = &self.inner;
        let mut cfg = inner
            .limits
            .get(class)
            .unwrap_or(&inner.default_class)
            .clone();
        // Endpoint override: tightened prefixes never get burst headroom,
        // whatever class the caller resolved.
        if inner
            .auth_prefixes
            .iter()
            .any(|p| route.starts_with(p.as_str()))
        {
            cfg.allow_burst = false;
            cfg.burst_allowance = cfg.requests_per_window;
        }

        let window_ms = (cfg.window_seconds as i64) * 1000;
        let detect_ms = (inner.ban.detection_window_seconds as i64) * 1000;

        let mut entry = inner
            .entries
            .entry(identifier.to_string())
            .or_insert_with(WindowState::new);

        if let Some(until) = entry.ban_until_ms {
            if until > now_ms {
                return Verdict::ban_denial(&cfg, until, now_ms);
            }
            entry.ban_until_ms = None;
        }

        entry.purge(now_ms - window_ms.max(detect_ms));
        let window_cutoff = now_ms - window_ms;
        let count = entry.count_since(window_cutoff) as u64;

        let is_burst = if count < cfg.requests_per_window {
            false
        } else if cfg.allow_burst && count < cfg.burst_allowance {
            true
        } else {
            let reset_ms = entry
                .oldest_since(window_cutoff)
                .map(|t| t + window_ms)
                .unwrap_or(now_ms);
            return Verdict::window_denial(&cfg, reset_ms, now_ms);
        };

        entry.record(now_ms);
        if entry.count_since(now_ms - detect_ms) as u64 > inner.ban.burst_limit {
            let until = now_ms + (inner.ban.ban_duration_seconds as i64) * 1000;
            entry.ban_until_ms = Some(until);
            tracing::warn!(
                identifier = %identifier,
                class = %class,
                until_ms = until,
                "admission rate exceeded ban threshold, banning identifier"
            );
        }

        Verdict {
            allowed: true,
            limit: cfg.requests_per_window,
            remaining: cfg.requests_per_window.saturating_sub(count + 1),
            reset_at: (now_ms + window_ms) / 1000,
            window_seconds: cfg.window_seconds,
            is_burst,
            banned: false,
            retry_after_seconds: None,
        }
    }

    /// Drop identifiers with no activity inside the retention horizon plus
    /// `grace_ms`. Active bans are kept regardless.
    pub fn evict_idle(&self, grace_ms: i64) {
        let now = now_ms();
        let inner = &self.inner;
        let max_window_ms = inner
            .limits
            .values()
            .map(|c| (c.window_seconds as i64) * 1000)
            .max()
            .unwrap_or(0)
            .max((inner.ban.detection_window_seconds as i64) * 1000);
        inner.entries.retain(|_, state| {
            if state.ban_until_ms.map_or(false, |u| u > now) {
                return true;
            }
            state
                .newest()
                .map_or(false, |t| t >= now - max_window_ms - grace_ms)
        });
    }

    pub fn tracked_identifiers(&self) -> usize {
        self.inner.entries.len()
    }
}
