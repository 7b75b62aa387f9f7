//! Shared fixtures for the database integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use perfdash::data::reference::{self, Route, Stop};
use perfdash::performance::PerformanceApiError;
use perfdash::performance::models::Dwell;
use perfdash::sync::dispatch::Fetcher;
use perfdash::sync::window::Window;
use perfdash::sync::{CachedEntity, StopRouteKey};
use sqlx::PgPool;
use std::sync::Mutex;

/// 2024-06-20 12:00 in New York; start of today is 04:00 UTC.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 20, 16, 0, 0).unwrap()
}

pub fn start_of_today() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 20, 4, 0, 0).unwrap()
}

/// Thirty local days before the start of today.
pub fn horizon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 21, 4, 0, 0).unwrap()
}

/// Routes `Red` and `Orange` with a few stops each.
pub async fn seed_reference(pool: &PgPool) {
    let stop = |id: &str, route_id: &str| Stop {
        id: id.to_owned(),
        route_id: route_id.to_owned(),
        name: format!("Stop {id}"),
        latitude: 42.35,
        longitude: -71.06,
    };
    reference::replace_all(
        pool,
        &[Route { id: "Red".into() }, Route { id: "Orange".into() }],
        &[
            stop("70061", "Red"),
            stop("70063", "Red"),
            stop("70077", "Red"),
            stop("70001", "Orange"),
        ],
        &[],
    )
    .await
    .unwrap();
}

type Respond<E> = dyn Fn(&<E as CachedEntity>::Key, &Window) -> Vec<E> + Send + Sync;

/// In-memory upstream: answers through a closure and records every call.
pub struct ScriptedFetcher<E: CachedEntity> {
    respond: Box<Respond<E>>,
    failing: Vec<E::Key>,
    calls: Mutex<Vec<(E::Key, Window)>>,
}

impl<E: CachedEntity> ScriptedFetcher<E> {
    pub fn new(respond: impl Fn(&E::Key, &Window) -> Vec<E> + Send + Sync + 'static) -> Self {
        Self {
            respond: Box::new(respond),
            failing: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_for(mut self, key: E::Key) -> Self {
        self.failing.push(key);
        self
    }

    pub fn calls(&self) -> Vec<(E::Key, Window)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl<E: CachedEntity> Fetcher<E> for ScriptedFetcher<E> {
    async fn fetch(&self, key: &E::Key, window: &Window) -> Result<Vec<E>, PerformanceApiError> {
        self.calls.lock().unwrap().push((key.clone(), *window));
        if self.failing.contains(key) {
            return Err(PerformanceApiError::Status {
                status: 500,
                url: "http://upstream.test".into(),
                body: "scripted failure".into(),
            });
        }
        Ok((self.respond)(key, window))
    }
}

pub fn dwell_at(key: &StopRouteKey, arrival: DateTime<Utc>) -> Dwell {
    Dwell {
        stop_id: key.stop_id.clone(),
        route_id: key.route_id.clone(),
        direction: "1".into(),
        arr_dt: arrival.timestamp().to_string(),
        dep_dt: (arrival.timestamp() + 45).to_string(),
        dwell_time_sec: "45".into(),
    }
}

/// One dwell an hour into every window.
pub fn dwell_per_window() -> ScriptedFetcher<Dwell> {
    ScriptedFetcher::new(|key: &StopRouteKey, window: &Window| {
        vec![dwell_at(key, window.start + chrono::TimeDelta::hours(1))]
    })
}

pub async fn dwell_watermark(pool: &PgPool, stop_id: &str, route_id: &str) -> Option<DateTime<Utc>> {
    sqlx::query_scalar(
        "SELECT value FROM last_dwell_cache_datetime WHERE stop_id = $1 AND route_id = $2",
    )
    .bind(stop_id)
    .bind(route_id)
    .fetch_optional(pool)
    .await
    .unwrap()
}

pub async fn count(pool: &PgPool, table: &str) -> i64 {
    // Table names come from the test source only.
    let sql = format!("SELECT COUNT(*) FROM {table}");
    sqlx::query_scalar::<_, i64>(&sql)
        .fetch_one(pool)
        .await
        .unwrap()
}
