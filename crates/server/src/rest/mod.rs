mod health;
mod metrics;
mod projects;
mod router;

pub use router::{router, AppState};
