//! Database health check.

use sqlx::PgPool;
use std::time::{Duration, Instant};

/// Round-trip a trivial query; returns how long it took.
pub async fn ping(pool: &PgPool) -> Result<Duration, sqlx::Error> {
    let started = Instant::now();
    sqlx::query_scalar::<_, i32>("SELECT 1")
        .fetch_one(pool)
        .await?;
    Ok(started.elapsed())
}
