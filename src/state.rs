//! Application state shared by every web handler.

use sqlx::PgPool;
use std::sync::Arc;
use std::time::Instant;

use crate::performance::PerformanceApi;
use crate::sync::Refresher;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub performance_api: Arc<PerformanceApi>,
    /// Owns the process-wide refresh lock.
    pub refresher: Refresher,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(db_pool: PgPool, performance_api: Arc<PerformanceApi>, refresher: Refresher) -> Self {
        Self {
            db_pool,
            performance_api,
            refresher,
            started_at: Instant::now(),
        }
    }
}
