pub mod idempotency;
pub mod identity;
pub mod rate_limit;
pub mod reject;
