//! Shared state for the health endpoints.
//!
//! Workflow and template routes carry their own service as state; this
//! struct only holds what the health checks report on.

use crate::config::AppConfig;
use crate::db::DbPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Arc<AppConfig>,
    pub nats: Option<Arc<async_nats::Client>>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig, nats: Option<Arc<async_nats::Client>>) -> Self {
        Self {
            db,
            config: Arc::new(config),
            nats,
            start_time: std::time::Instant::now(),
        }
    }

    /// Get the server uptime in seconds.
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Check if NATS is configured and connected.
    pub fn has_nats(&self) -> bool {
        self.nats.is_some()
    }
}
