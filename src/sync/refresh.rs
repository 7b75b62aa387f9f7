//! Refresh orchestration: validate, lock, fetch, then write everything in one transaction.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, error, info};
use ts_rs::TS;

use crate::data::reference;
use crate::sync::dispatch::{Fetcher, KeyPlan, dispatch};
use crate::sync::entity::{CachedEntity, EntityKind, TimeRange};
use crate::sync::error::SyncError;
use crate::sync::key::CacheKey;
use crate::sync::window::{plan_windows, retention_horizon, start_of_today};
use crate::utils::{fmt_duration, log_if_slow};

const SLOW_REFRESH_THRESHOLD: Duration = Duration::from_secs(60);

/// What one committed refresh did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RefreshReport {
    pub kind: EntityKind,
    pub keys: usize,
    /// Keys whose watermark was already at start of today.
    pub keys_current: usize,
    pub windows_fetched: usize,
    #[ts(type = "number")]
    pub records_inserted: u64,
    #[ts(type = "number")]
    pub records_pruned: u64,
}

/// Runs refreshes and selects against the cache tables.
///
/// Every refresh, of any kind, holds the same lock from its first watermark read to its
/// commit or rollback. Selects never take it.
#[derive(Clone)]
pub struct Refresher {
    pool: PgPool,
    lock: Arc<Mutex<()>>,
    tz: Tz,
}

impl Refresher {
    pub fn new(pool: PgPool, tz: Tz) -> Self {
        Self {
            pool,
            lock: Arc::new(Mutex::new(())),
            tz,
        }
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub async fn refresh<E: CachedEntity>(
        &self,
        fetcher: Arc<dyn Fetcher<E>>,
        keys: Vec<E::Key>,
    ) -> Result<RefreshReport, SyncError> {
        self.refresh_at(fetcher, keys, Utc::now()).await
    }

    /// Bring `keys` up to the start of the day containing `now`.
    ///
    /// Either every record, watermark and deletion of the refresh commits, or none does.
    pub async fn refresh_at<E: CachedEntity>(
        &self,
        fetcher: Arc<dyn Fetcher<E>>,
        keys: Vec<E::Key>,
        now: DateTime<Utc>,
    ) -> Result<RefreshReport, SyncError> {
        {
            let mut conn = self.pool.acquire().await?;
            validate_keys(&mut *conn, &keys).await?;
        }

        let _guard = self.lock.lock().await;
        let started = Instant::now();

        let today = start_of_today(self.tz, now);
        let today_utc = today.with_timezone(&Utc);
        let horizon = retention_horizon(today).with_timezone(&Utc);
        info!(kind = %E::KIND, keys = keys.len(), today = %today, "Refresh started");

        let mut tx = self.pool.begin().await?;

        let watermarks =
            <E::Key as CacheKey>::read_watermarks(&mut *tx, E::WATERMARKS, &keys).await?;
        let plans: Vec<KeyPlan<E::Key>> = keys
            .iter()
            .map(|key| {
                let watermark = watermarks.get(key).copied();
                let windows = plan_windows(watermark, today);
                debug!(
                    kind = %E::KIND,
                    key = %key,
                    watermark = ?watermark,
                    windows = windows.len(),
                    "Planned key"
                );
                KeyPlan {
                    key: key.clone(),
                    windows,
                }
            })
            .collect();
        let keys_current = plans.iter().filter(|p| p.windows.is_empty()).count();

        let outcome = dispatch(fetcher, plans).await;
        if !outcome.is_complete() {
            error!(
                kind = %E::KIND,
                failed = outcome.failures.len(),
                keys = keys.len(),
                "Refresh rolled back after upstream failures"
            );
            tx.rollback().await?;
            return Err(SyncError::Upstream(outcome.failures));
        }

        let records_inserted = E::insert(&mut *tx, &outcome.records).await?;
        <E::Key as CacheKey>::advance_watermarks(&mut *tx, E::WATERMARKS, &keys, today_utc)
            .await?;
        let records_pruned = E::delete_outdated(&mut *tx, horizon).await?;

        tx.commit().await?;

        let report = RefreshReport {
            kind: E::KIND,
            keys: keys.len(),
            keys_current,
            windows_fetched: outcome.windows_fetched,
            records_inserted,
            records_pruned,
        };
        info!(
            kind = %E::KIND,
            keys = report.keys,
            keys_current = report.keys_current,
            windows = report.windows_fetched,
            inserted = report.records_inserted,
            pruned = report.records_pruned,
            duration = fmt_duration(started.elapsed()),
            "Refresh committed"
        );
        log_if_slow(started, SLOW_REFRESH_THRESHOLD, "refresh");

        Ok(report)
    }

    /// Stored records for `keys` within `range`. Reads only; no upstream calls.
    pub async fn select<E: CachedEntity>(
        &self,
        keys: Vec<E::Key>,
        range: TimeRange,
    ) -> Result<Vec<E::Row>, SyncError> {
        if let (Some(start), Some(end)) = (range.start, range.end) {
            if start > end {
                return Err(SyncError::Validation(
                    "start_datetime must not be after end_datetime".into(),
                ));
            }
        }

        let mut tx = self.pool.begin().await?;
        validate_keys(&mut *tx, &keys).await?;
        let rows = E::select(&mut *tx, &keys, range).await?;
        tx.commit().await?;

        Ok(rows)
    }
}

/// Every key must name at least one stop and a route, all present in the reference tables.
async fn validate_keys<K: CacheKey>(
    conn: &mut PgConnection,
    keys: &[K],
) -> Result<(), SyncError> {
    if keys.is_empty() {
        return Err(SyncError::Validation("At least one stop ID required".into()));
    }

    let mut stop_ids: Vec<&str> = Vec::new();
    let mut route_ids: Vec<&str> = Vec::new();
    for key in keys {
        if key.route_id().is_empty() {
            return Err(SyncError::Validation("Route ID required".into()));
        }
        for stop_id in key.stop_ids() {
            if stop_id.is_empty() {
                return Err(SyncError::Validation("Stop IDs must not be empty".into()));
            }
            if !stop_ids.contains(&stop_id) {
                stop_ids.push(stop_id);
            }
        }
        if !route_ids.contains(&key.route_id()) {
            route_ids.push(key.route_id());
        }
    }

    let missing_stops = reference::missing_stop_ids(&mut *conn, &stop_ids).await?;
    if !missing_stops.is_empty() {
        return Err(SyncError::Validation(format!(
            "Unknown stop IDs: {}",
            missing_stops.join(", ")
        )));
    }

    let missing_routes = reference::missing_route_ids(&mut *conn, &route_ids).await?;
    if !missing_routes.is_empty() {
        return Err(SyncError::Validation(format!(
            "Unknown route IDs: {}",
            missing_routes.join(", ")
        )));
    }

    Ok(())
}
