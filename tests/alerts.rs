//! Past alert versions and their children across overlapping and repeated refreshes.

mod helpers;

use chrono::{DateTime, TimeDelta, Utc};
use helpers::{ScriptedFetcher, count, now, seed_reference, start_of_today};
use perfdash::performance::models::{ActivePeriod, AlertVersion, InformedEntity};
use perfdash::sync::window::Window;
use perfdash::sync::{Refresher, StopRouteKey, TimeRange};
use pretty_assertions::assert_eq;
use sqlx::PgPool;
use std::sync::Arc;

fn version(key: &StopRouteKey, version_id: &str, valid_from: DateTime<Utc>) -> AlertVersion {
    AlertVersion {
        stop_id: key.stop_id.clone(),
        route_id: key.route_id.clone(),
        alert_id: "590011".into(),
        version_id: version_id.into(),
        valid_from: valid_from.timestamp().to_string(),
        valid_to: None,
        cause: "MAINTENANCE".into(),
        effect: "DELAY".into(),
        header_text: "Red Line delays".into(),
        description_text: String::new(),
        informed_entities: vec![InformedEntity {
            agency_id: Some("1".into()),
            route_id: Some("Red".into()),
            route_type: Some("1".into()),
            trip_id: None,
            stop_id: Some(key.stop_id.clone()),
        }],
        active_periods: vec![ActivePeriod {
            start: valid_from.timestamp().to_string(),
            end: None,
        }],
    }
}

/// Every window reports the same long-running version, as upstream does for alerts
/// that span several windows.
fn same_version_every_window() -> ScriptedFetcher<AlertVersion> {
    ScriptedFetcher::new(|key: &StopRouteKey, _window: &Window| {
        vec![version(key, "1", start_of_today() - TimeDelta::days(2))]
    })
}

#[sqlx::test]
async fn overlapping_windows_store_each_version_once(pool: PgPool) {
    seed_reference(&pool).await;
    let key = StopRouteKey::new("70061", "Red");
    let refresher = Refresher::new(pool.clone(), chrono_tz::America::New_York);

    let report = refresher
        .refresh_at::<AlertVersion>(
            Arc::new(same_version_every_window()),
            vec![key.clone()],
            now(),
        )
        .await
        .unwrap();

    assert_eq!(report.windows_fetched, 5);
    assert_eq!(report.records_inserted, 1);
    assert_eq!(count(&pool, "alert_version").await, 1);
    assert_eq!(count(&pool, "alert_informed_entity").await, 1);
    assert_eq!(count(&pool, "alert_active_period").await, 1);

    let rows = refresher
        .select::<AlertVersion>(vec![key], TimeRange::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let row = &rows[0];
    assert_eq!(row.alert_id, "590011");
    assert_eq!(row.valid_from, start_of_today() - TimeDelta::days(2));
    assert_eq!(row.informed_entities.0.len(), 1);
    assert_eq!(row.informed_entities.0[0].stop_id.as_deref(), Some("70061"));
    assert_eq!(row.active_periods.0.len(), 1);
    assert_eq!(row.active_periods.0[0].start, row.valid_from);
    assert_eq!(row.active_periods.0[0].end, None);
}

#[sqlx::test]
async fn next_day_refresh_does_not_duplicate_children(pool: PgPool) {
    seed_reference(&pool).await;
    let key = StopRouteKey::new("70061", "Red");
    let refresher = Refresher::new(pool.clone(), chrono_tz::America::New_York);
    refresher
        .refresh_at::<AlertVersion>(
            Arc::new(same_version_every_window()),
            vec![key.clone()],
            now(),
        )
        .await
        .unwrap();

    let fetcher = Arc::new(same_version_every_window());
    let report = refresher
        .refresh_at::<AlertVersion>(fetcher.clone(), vec![key], now() + TimeDelta::days(1))
        .await
        .unwrap();

    assert_eq!(fetcher.calls().len(), 1);
    assert_eq!(report.records_inserted, 0);
    assert_eq!(count(&pool, "alert_version").await, 1);
    assert_eq!(count(&pool, "alert_informed_entity").await, 1);
    assert_eq!(count(&pool, "alert_active_period").await, 1);
}

#[sqlx::test]
async fn pruning_a_version_removes_its_children(pool: PgPool) {
    seed_reference(&pool).await;
    let key = StopRouteKey::new("70061", "Red");
    let refresher = Refresher::new(pool.clone(), chrono_tz::America::New_York);
    refresher
        .refresh_at::<AlertVersion>(
            Arc::new(same_version_every_window()),
            vec![key.clone()],
            now(),
        )
        .await
        .unwrap();

    // Thirty-two days later the version sits before the retention horizon.
    let report = refresher
        .refresh_at::<AlertVersion>(
            Arc::new(ScriptedFetcher::<AlertVersion>::new(
                |_: &StopRouteKey, _: &Window| Vec::new(),
            )),
            vec![key],
            now() + TimeDelta::days(32),
        )
        .await
        .unwrap();

    assert_eq!(report.records_pruned, 1);
    assert_eq!(count(&pool, "alert_version").await, 0);
    assert_eq!(count(&pool, "alert_informed_entity").await, 0);
    assert_eq!(count(&pool, "alert_active_period").await, 0);
}

#[sqlx::test]
async fn retention_follows_active_periods(pool: PgPool) {
    seed_reference(&pool).await;
    let key = StopRouteKey::new("70061", "Red");
    let refresher = Refresher::new(pool.clone(), chrono_tz::America::New_York);

    // Both versions were issued 40 days ago; only the first is still active in range.
    let fetcher = ScriptedFetcher::<AlertVersion>::new(|key: &StopRouteKey, _: &Window| {
        let issued = start_of_today() - TimeDelta::days(40);
        let mut ongoing = version(key, "1", issued);
        ongoing.active_periods[0].start = (start_of_today() - TimeDelta::days(2))
            .timestamp()
            .to_string();
        let expired = version(key, "2", issued);
        vec![ongoing, expired]
    });

    let report = refresher
        .refresh_at::<AlertVersion>(Arc::new(fetcher), vec![key.clone()], now())
        .await
        .unwrap();

    assert_eq!(report.records_inserted, 2);
    assert_eq!(report.records_pruned, 1);

    let rows = refresher
        .select::<AlertVersion>(vec![key], TimeRange::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].version_id, "1");
    assert_eq!(rows[0].valid_from, start_of_today() - TimeDelta::days(40));
    assert_eq!(
        rows[0].active_periods.0[0].start,
        start_of_today() - TimeDelta::days(2)
    );
    assert_eq!(count(&pool, "alert_active_period").await, 1);
    assert_eq!(count(&pool, "alert_informed_entity").await, 1);
}
