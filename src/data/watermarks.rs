//! Per-key watermark tables (`last_<kind>_cache_datetime`).
//!
//! Table names are selected from a closed set of statements; nothing here is built from
//! caller input.

use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use std::collections::HashMap;

use crate::data::{stop_pair_columns, stop_route_columns};
use crate::sync::key::{StopPairKey, StopRouteKey};

/// Watermark tables keyed by `(stop_id, route_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopRouteTable {
    Dwell,
    Headway,
    PastAlert,
}

impl StopRouteTable {
    fn select_sql(self) -> &'static str {
        match self {
            Self::Dwell => {
                r#"
                SELECT w.stop_id, w.route_id, w.value
                FROM last_dwell_cache_datetime w
                JOIN UNNEST($1::text[], $2::text[]) AS k(stop_id, route_id)
                  ON w.stop_id = k.stop_id AND w.route_id = k.route_id
                "#
            }
            Self::Headway => {
                r#"
                SELECT w.stop_id, w.route_id, w.value
                FROM last_headway_cache_datetime w
                JOIN UNNEST($1::text[], $2::text[]) AS k(stop_id, route_id)
                  ON w.stop_id = k.stop_id AND w.route_id = k.route_id
                "#
            }
            Self::PastAlert => {
                r#"
                SELECT w.stop_id, w.route_id, w.value
                FROM last_past_alert_cache_datetime w
                JOIN UNNEST($1::text[], $2::text[]) AS k(stop_id, route_id)
                  ON w.stop_id = k.stop_id AND w.route_id = k.route_id
                "#
            }
        }
    }

    fn upsert_sql(self) -> &'static str {
        match self {
            Self::Dwell => {
                r#"
                INSERT INTO last_dwell_cache_datetime AS w (stop_id, route_id, value)
                SELECT k.stop_id, k.route_id, $3
                FROM UNNEST($1::text[], $2::text[]) AS k(stop_id, route_id)
                ON CONFLICT (stop_id, route_id)
                DO UPDATE SET value = EXCLUDED.value
                WHERE w.value < EXCLUDED.value
                "#
            }
            Self::Headway => {
                r#"
                INSERT INTO last_headway_cache_datetime AS w (stop_id, route_id, value)
                SELECT k.stop_id, k.route_id, $3
                FROM UNNEST($1::text[], $2::text[]) AS k(stop_id, route_id)
                ON CONFLICT (stop_id, route_id)
                DO UPDATE SET value = EXCLUDED.value
                WHERE w.value < EXCLUDED.value
                "#
            }
            Self::PastAlert => {
                r#"
                INSERT INTO last_past_alert_cache_datetime AS w (stop_id, route_id, value)
                SELECT k.stop_id, k.route_id, $3
                FROM UNNEST($1::text[], $2::text[]) AS k(stop_id, route_id)
                ON CONFLICT (stop_id, route_id)
                DO UPDATE SET value = EXCLUDED.value
                WHERE w.value < EXCLUDED.value
                "#
            }
        }
    }
}

/// Watermark tables keyed by `(from_stop_id, to_stop_id, route_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPairTable {
    TravelTime,
}

impl StopPairTable {
    fn select_sql(self) -> &'static str {
        match self {
            Self::TravelTime => {
                r#"
                SELECT w.from_stop_id, w.to_stop_id, w.route_id, w.value
                FROM last_travel_time_cache_datetime w
                JOIN UNNEST($1::text[], $2::text[], $3::text[]) AS k(from_stop_id, to_stop_id, route_id)
                  ON w.from_stop_id = k.from_stop_id
                 AND w.to_stop_id = k.to_stop_id
                 AND w.route_id = k.route_id
                "#
            }
        }
    }

    fn upsert_sql(self) -> &'static str {
        match self {
            Self::TravelTime => {
                r#"
                INSERT INTO last_travel_time_cache_datetime AS w (from_stop_id, to_stop_id, route_id, value)
                SELECT k.from_stop_id, k.to_stop_id, k.route_id, $4
                FROM UNNEST($1::text[], $2::text[], $3::text[]) AS k(from_stop_id, to_stop_id, route_id)
                ON CONFLICT (from_stop_id, to_stop_id, route_id)
                DO UPDATE SET value = EXCLUDED.value
                WHERE w.value < EXCLUDED.value
                "#
            }
        }
    }
}

/// Current watermark of every key that has one; keys without a row are absent.
pub async fn read_stop_route(
    conn: &mut PgConnection,
    table: StopRouteTable,
    keys: &[StopRouteKey],
) -> Result<HashMap<StopRouteKey, DateTime<Utc>>, sqlx::Error> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let (stop_ids, route_ids) = stop_route_columns(keys);

    let rows = sqlx::query_as::<_, (String, String, DateTime<Utc>)>(table.select_sql())
        .bind(&stop_ids)
        .bind(&route_ids)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(stop_id, route_id, value)| (StopRouteKey { stop_id, route_id }, value))
        .collect())
}

/// Raise each key's watermark to `today`, inserting rows for new keys.
///
/// Returns the number of rows written; keys already at or past `today` are untouched.
pub async fn advance_stop_route(
    conn: &mut PgConnection,
    table: StopRouteTable,
    keys: &[StopRouteKey],
    today: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    if keys.is_empty() {
        return Ok(0);
    }

    let (stop_ids, route_ids) = stop_route_columns(keys);

    let result = sqlx::query(table.upsert_sql())
        .bind(&stop_ids)
        .bind(&route_ids)
        .bind(today)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

pub async fn read_stop_pair(
    conn: &mut PgConnection,
    table: StopPairTable,
    keys: &[StopPairKey],
) -> Result<HashMap<StopPairKey, DateTime<Utc>>, sqlx::Error> {
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let (from_ids, to_ids, route_ids) = stop_pair_columns(keys);

    let rows = sqlx::query_as::<_, (String, String, String, DateTime<Utc>)>(table.select_sql())
        .bind(&from_ids)
        .bind(&to_ids)
        .bind(&route_ids)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .into_iter()
        .map(|(from_stop_id, to_stop_id, route_id, value)| {
            (
                StopPairKey {
                    from_stop_id,
                    to_stop_id,
                    route_id,
                },
                value,
            )
        })
        .collect())
}

pub async fn advance_stop_pair(
    conn: &mut PgConnection,
    table: StopPairTable,
    keys: &[StopPairKey],
    today: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    if keys.is_empty() {
        return Ok(0);
    }

    let (from_ids, to_ids, route_ids) = stop_pair_columns(keys);

    let result = sqlx::query(table.upsert_sql())
        .bind(&from_ids)
        .bind(&to_ids)
        .bind(&route_ids)
        .bind(today)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}
