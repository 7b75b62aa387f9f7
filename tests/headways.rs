//! Headways: refresh round-trip, nullable benchmarks and retention on `current_dep_dt`.

mod helpers;

use chrono::{DateTime, TimeDelta, Utc};
use helpers::{ScriptedFetcher, count, horizon, now, seed_reference, start_of_today};
use perfdash::data::watermarks::{self, StopRouteTable};
use perfdash::performance::models::Headway;
use perfdash::sync::window::Window;
use perfdash::sync::{CachedEntity, Refresher, StopRouteKey, SyncError, TimeRange};
use pretty_assertions::assert_eq;
use sqlx::PgPool;
use std::sync::Arc;

fn headway_at(key: &StopRouteKey, departure: DateTime<Utc>, benchmark: Option<&str>) -> Headway {
    Headway {
        stop_id: key.stop_id.clone(),
        route_id: key.route_id.clone(),
        prev_route_id: key.route_id.clone(),
        direction: "0".into(),
        current_dep_dt: departure.timestamp().to_string(),
        previous_dep_dt: (departure.timestamp() - 420).to_string(),
        headway_time_sec: "420".into(),
        benchmark_headway_time_sec: benchmark.map(str::to_owned),
    }
}

fn refresher(pool: &PgPool) -> Refresher {
    Refresher::new(pool.clone(), chrono_tz::America::New_York)
}

#[sqlx::test]
async fn refresh_stores_headways_with_optional_benchmarks(pool: PgPool) {
    seed_reference(&pool).await;
    let key = StopRouteKey::new("70063", "Red");
    let fetcher = ScriptedFetcher::<Headway>::new(|key: &StopRouteKey, window: &Window| {
        let departure = window.start + TimeDelta::hours(1);
        vec![
            headway_at(key, departure, Some("360")),
            headway_at(key, departure + TimeDelta::minutes(7), Some("")),
            headway_at(key, departure + TimeDelta::minutes(14), None),
        ]
    });

    let report = refresher(&pool)
        .refresh_at::<Headway>(Arc::new(fetcher), vec![key.clone()], now())
        .await
        .unwrap();
    assert_eq!(report.windows_fetched, 5);
    assert_eq!(report.records_inserted, 15);

    let rows = refresher(&pool)
        .select::<Headway>(vec![key.clone()], TimeRange::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 15);
    assert!(rows.windows(2).all(|w| w[0].current_dep_dt <= w[1].current_dep_dt));

    let first = &rows[0];
    assert_eq!(first.current_dep_dt, horizon() + TimeDelta::hours(1));
    assert_eq!(first.previous_dep_dt, first.current_dep_dt - TimeDelta::seconds(420));
    assert_eq!(first.headway_time_sec, 420);
    assert!(!first.direction);
    assert_eq!(first.benchmark_headway_time_sec, Some(360));
    assert_eq!(rows[1].benchmark_headway_time_sec, None);
    assert_eq!(rows[2].benchmark_headway_time_sec, None);

    let mut conn = pool.acquire().await.unwrap();
    let marks = watermarks::read_stop_route(&mut conn, StopRouteTable::Headway, &[key.clone()])
        .await
        .unwrap();
    assert_eq!(marks.get(&key), Some(&start_of_today()));
    let dwell_marks = watermarks::read_stop_route(&mut conn, StopRouteTable::Dwell, &[key])
        .await
        .unwrap();
    assert!(dwell_marks.is_empty());
}

#[sqlx::test]
async fn malformed_benchmark_fails_the_batch(pool: PgPool) {
    seed_reference(&pool).await;
    let fetcher = ScriptedFetcher::<Headway>::new(|key: &StopRouteKey, window: &Window| {
        vec![headway_at(key, window.start, Some("n/a"))]
    });

    let err = refresher(&pool)
        .refresh_at::<Headway>(Arc::new(fetcher), vec![StopRouteKey::new("70063", "Red")], now())
        .await
        .unwrap_err();

    assert!(
        matches!(err, SyncError::Conversion(ref e) if e.field == "benchmark_headway_time_sec")
    );
    assert_eq!(count(&pool, "headway").await, 0);
}

#[sqlx::test]
async fn retention_uses_current_departure(pool: PgPool) {
    seed_reference(&pool).await;
    let key = StopRouteKey::new("70001", "Orange");
    let mut conn = pool.acquire().await.unwrap();
    Headway::insert(
        &mut conn,
        &[
            headway_at(&key, horizon() - TimeDelta::seconds(1), None),
            headway_at(&key, horizon(), None),
        ],
    )
    .await
    .unwrap();
    drop(conn);

    let empty = ScriptedFetcher::<Headway>::new(|_: &StopRouteKey, _: &Window| Vec::new());
    let report = refresher(&pool)
        .refresh_at::<Headway>(Arc::new(empty), vec![StopRouteKey::new("70061", "Red")], now())
        .await
        .unwrap();

    assert_eq!(report.records_pruned, 1);
    let rows = refresher(&pool)
        .select::<Headway>(vec![key], TimeRange::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    // The surviving row's previous departure predates the horizon; only the current one counts.
    assert_eq!(rows[0].current_dep_dt, horizon());
}
