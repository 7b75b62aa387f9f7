//! Travel times: stop-pair keys, their watermark table and retention on `dep_dt`.

mod helpers;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use helpers::{ScriptedFetcher, horizon, now, seed_reference, start_of_today};
use perfdash::data::watermarks::{self, StopPairTable};
use perfdash::performance::models::TravelTime;
use perfdash::sync::window::Window;
use perfdash::sync::{CachedEntity, Refresher, StopPairKey, TimeRange};
use pretty_assertions::assert_eq;
use sqlx::PgPool;
use std::sync::Arc;

fn travel_time_at(key: &StopPairKey, departure: DateTime<Utc>, benchmark: Option<&str>) -> TravelTime {
    TravelTime {
        from_stop_id: key.from_stop_id.clone(),
        to_stop_id: key.to_stop_id.clone(),
        route_id: key.route_id.clone(),
        direction: "1".into(),
        dep_dt: departure.timestamp().to_string(),
        arr_dt: (departure.timestamp() + 600).to_string(),
        travel_time_sec: "600".into(),
        benchmark_travel_time_sec: benchmark.map(str::to_owned),
    }
}

fn refresher(pool: &PgPool) -> Refresher {
    Refresher::new(pool.clone(), chrono_tz::America::New_York)
}

fn one_per_window() -> ScriptedFetcher<TravelTime> {
    ScriptedFetcher::new(|key: &StopPairKey, window: &Window| {
        vec![travel_time_at(key, window.start + TimeDelta::hours(2), Some("540"))]
    })
}

#[sqlx::test]
async fn refresh_round_trip_per_stop_pair(pool: PgPool) {
    seed_reference(&pool).await;
    let forward = StopPairKey::new("70061", "70077", "Red");
    let backward = StopPairKey::new("70077", "70061", "Red");
    let fetcher = Arc::new(one_per_window());

    let report = refresher(&pool)
        .refresh_at::<TravelTime>(fetcher.clone(), vec![forward.clone(), backward.clone()], now())
        .await
        .unwrap();
    assert_eq!(report.keys, 2);
    assert_eq!(report.windows_fetched, 10);
    assert_eq!(report.records_inserted, 10);

    let rows = refresher(&pool)
        .select::<TravelTime>(vec![forward.clone()], TimeRange::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.from_stop_id == "70061" && r.to_stop_id == "70077"));
    assert_eq!(rows[0].dep_dt, horizon() + TimeDelta::hours(2));
    assert_eq!(rows[0].arr_dt, rows[0].dep_dt + TimeDelta::seconds(600));
    assert_eq!(rows[0].travel_time_sec, 600);
    assert_eq!(rows[0].benchmark_travel_time_sec, Some(540));
    assert!(rows[0].direction);

    let bounded = refresher(&pool)
        .select::<TravelTime>(
            vec![forward.clone()],
            TimeRange {
                start: Some(rows[1].dep_dt),
                end: Some(rows[2].dep_dt),
            },
        )
        .await
        .unwrap();
    assert_eq!(bounded.len(), 2);

    let mut conn = pool.acquire().await.unwrap();
    let marks = watermarks::read_stop_pair(
        &mut conn,
        StopPairTable::TravelTime,
        &[forward.clone(), backward.clone()],
    )
    .await
    .unwrap();
    assert_eq!(marks.len(), 2);
    assert_eq!(marks.get(&forward), Some(&start_of_today()));
    assert_eq!(marks.get(&backward), Some(&start_of_today()));
    drop(conn);

    let again = Arc::new(one_per_window());
    let report = refresher(&pool)
        .refresh_at::<TravelTime>(again.clone(), vec![forward], now())
        .await
        .unwrap();
    assert_eq!(report.keys_current, 1);
    assert!(again.calls().is_empty());
}

#[sqlx::test]
async fn stop_pair_watermark_only_moves_forward(pool: PgPool) {
    let key = StopPairKey::new("70061", "70077", "Red");
    let later = Utc.with_ymd_and_hms(2024, 6, 20, 4, 0, 0).unwrap();
    let earlier = Utc.with_ymd_and_hms(2024, 6, 10, 4, 0, 0).unwrap();
    let mut conn = pool.acquire().await.unwrap();

    let written = watermarks::advance_stop_pair(&mut conn, StopPairTable::TravelTime, &[key.clone()], earlier)
        .await
        .unwrap();
    assert_eq!(written, 1);
    let written = watermarks::advance_stop_pair(&mut conn, StopPairTable::TravelTime, &[key.clone()], later)
        .await
        .unwrap();
    assert_eq!(written, 1);
    let written = watermarks::advance_stop_pair(&mut conn, StopPairTable::TravelTime, &[key.clone()], earlier)
        .await
        .unwrap();
    assert_eq!(written, 0);

    let marks = watermarks::read_stop_pair(&mut conn, StopPairTable::TravelTime, &[key.clone()])
        .await
        .unwrap();
    assert_eq!(marks.get(&key), Some(&later));

    // The reverse pair is a different key.
    let reverse = StopPairKey::new("70077", "70061", "Red");
    let marks = watermarks::read_stop_pair(&mut conn, StopPairTable::TravelTime, &[reverse])
        .await
        .unwrap();
    assert!(marks.is_empty());
}

#[sqlx::test]
async fn retention_uses_departure(pool: PgPool) {
    seed_reference(&pool).await;
    let key = StopPairKey::new("70063", "70077", "Red");
    let mut conn = pool.acquire().await.unwrap();
    TravelTime::insert(
        &mut conn,
        &[
            // Arrives after the horizon but departed before it.
            travel_time_at(&key, horizon() - TimeDelta::seconds(1), Some("")),
            travel_time_at(&key, horizon(), None),
        ],
    )
    .await
    .unwrap();
    drop(conn);

    let empty = ScriptedFetcher::<TravelTime>::new(|_: &StopPairKey, _: &Window| Vec::new());
    let report = refresher(&pool)
        .refresh_at::<TravelTime>(Arc::new(empty), vec![key.clone()], now())
        .await
        .unwrap();

    assert_eq!(report.records_pruned, 1);
    let rows = refresher(&pool)
        .select::<TravelTime>(vec![key], TimeRange::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].dep_dt, horizon());
    assert_eq!(rows[0].benchmark_travel_time_sec, None);
}
