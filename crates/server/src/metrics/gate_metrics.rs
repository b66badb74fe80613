use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct GateMetrics {
    requests_total: AtomicU64,
    admitted_total: AtomicU64,
    burst_admissions_total: AtomicU64,
    rate_limited_total: AtomicU64,
    ban_denials_total: AtomicU64,
    replays_total: AtomicU64,
    conflicts_total: AtomicU64,
    key_required_total: AtomicU64,
    completions_total: AtomicU64,
}

impl GateMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_requests(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_admitted(&self) {
        self.admitted_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_burst_admissions(&self) {
        self.burst_admissions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.rate_limited_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_ban_denials(&self) {
        self.ban_denials_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_replays(&self) {
        self.replays_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_conflicts(&self) {
        self.conflicts_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_key_required(&self) {
        self.key_required_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_completions(&self) {
        self.completions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn admitted_total(&self) -> u64 {
        self.admitted_total.load(Ordering::Relaxed)
    }

    pub fn burst_admissions_total(&self) -> u64 {
        self.burst_admissions_total.load(Ordering::Relaxed)
    }

    pub fn rate_limited_total(&self) -> u64 {
        self.rate_limited_total.load(Ordering::Relaxed)
    }

    pub fn ban_denials_total(&self) -> u64 {
        self.ban_denials_total.load(Ordering::Relaxed)
    }

    pub fn replays_total(&self) -> u64 {
        self.replays_total.load(Ordering::Relaxed)
    }

    pub fn conflicts_total(&self) -> u64 {
        self.conflicts_total.load(Ordering::Relaxed)
    }

    pub fn key_required_total(&self) -> u64 {
        self.key_required_total.load(Ordering::Relaxed)
    }

    pub fn completions_total(&self) -> u64 {
        self.completions_total.load(Ordering::Relaxed)
    }
}
