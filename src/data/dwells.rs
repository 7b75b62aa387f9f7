//! The `dwell` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgConnection;
use ts_rs::TS;

use crate::data::convert;
use crate::data::stop_route_columns;
use crate::data::watermarks::StopRouteTable;
use crate::performance::models::{Dwell, DwellsResponse};
use crate::sync::entity::{CachedEntity, EntityKind, TimeRange};
use crate::sync::error::SyncError;
use crate::sync::key::StopRouteKey;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DwellRow {
    pub stop_id: String,
    pub route_id: String,
    pub direction: bool,
    pub arr_dt: DateTime<Utc>,
    pub dep_dt: DateTime<Utc>,
    pub dwell_time_sec: i32,
}

#[async_trait]
impl CachedEntity for Dwell {
    type Key = StopRouteKey;
    type Response = DwellsResponse;
    type Row = DwellRow;

    const KIND: EntityKind = EntityKind::Dwell;
    const WATERMARKS: StopRouteTable = StopRouteTable::Dwell;

    fn from_response(response: DwellsResponse, key: &StopRouteKey) -> Vec<Self> {
        response
            .dwell_times
            .into_iter()
            .map(|dwell| Dwell {
                stop_id: key.stop_id.clone(),
                route_id: key.route_id.clone(),
                ..dwell
            })
            .collect()
    }

    async fn insert(conn: &mut PgConnection, records: &[Self]) -> Result<u64, SyncError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut directions = Vec::with_capacity(records.len());
        let mut arrivals = Vec::with_capacity(records.len());
        let mut departures = Vec::with_capacity(records.len());
        let mut dwell_times = Vec::with_capacity(records.len());
        for record in records {
            directions.push(convert::direction("direction", &record.direction)?);
            arrivals.push(convert::epoch_seconds("arr_dt", &record.arr_dt)?);
            departures.push(convert::epoch_seconds("dep_dt", &record.dep_dt)?);
            dwell_times.push(convert::seconds("dwell_time_sec", &record.dwell_time_sec)?);
        }
        let stop_ids: Vec<&str> = records.iter().map(|r| r.stop_id.as_str()).collect();
        let route_ids: Vec<&str> = records.iter().map(|r| r.route_id.as_str()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO dwell (stop_id, route_id, direction, arr_dt, dep_dt, dwell_time_sec)
            SELECT * FROM UNNEST(
                $1::text[], $2::text[], $3::bool[],
                $4::timestamptz[], $5::timestamptz[], $6::int4[]
            )
            "#,
        )
        .bind(&stop_ids)
        .bind(&route_ids)
        .bind(&directions)
        .bind(&arrivals)
        .bind(&departures)
        .bind(&dwell_times)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    async fn select(
        conn: &mut PgConnection,
        keys: &[StopRouteKey],
        range: TimeRange,
    ) -> Result<Vec<DwellRow>, sqlx::Error> {
        let (stop_ids, route_ids) = stop_route_columns(keys);

        sqlx::query_as::<_, DwellRow>(
            r#"
            SELECT d.stop_id, d.route_id, d.direction, d.arr_dt, d.dep_dt, d.dwell_time_sec
            FROM dwell d
            JOIN UNNEST($1::text[], $2::text[]) AS k(stop_id, route_id)
              ON d.stop_id = k.stop_id AND d.route_id = k.route_id
            WHERE ($3::timestamptz IS NULL OR d.arr_dt >= $3)
              AND ($4::timestamptz IS NULL OR d.arr_dt <= $4)
            ORDER BY d.arr_dt
            "#,
        )
        .bind(&stop_ids)
        .bind(&route_ids)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&mut *conn)
        .await
    }

    async fn delete_outdated(
        conn: &mut PgConnection,
        horizon: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM dwell WHERE arr_dt < $1")
            .bind(horizon)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}
