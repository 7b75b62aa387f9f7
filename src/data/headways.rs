//! The `headway` table.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgConnection;
use ts_rs::TS;

use crate::data::convert;
use crate::data::stop_route_columns;
use crate::data::watermarks::StopRouteTable;
use crate::performance::models::{Headway, HeadwaysResponse};
use crate::sync::entity::{CachedEntity, EntityKind, TimeRange};
use crate::sync::error::SyncError;
use crate::sync::key::StopRouteKey;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HeadwayRow {
    pub stop_id: String,
    pub route_id: String,
    pub prev_route_id: String,
    pub direction: bool,
    pub current_dep_dt: DateTime<Utc>,
    pub previous_dep_dt: DateTime<Utc>,
    pub headway_time_sec: i32,
    pub benchmark_headway_time_sec: Option<i32>,
}

#[async_trait]
impl CachedEntity for Headway {
    type Key = StopRouteKey;
    type Response = HeadwaysResponse;
    type Row = HeadwayRow;

    const KIND: EntityKind = EntityKind::Headway;
    const WATERMARKS: StopRouteTable = StopRouteTable::Headway;

    fn from_response(response: HeadwaysResponse, key: &StopRouteKey) -> Vec<Self> {
        response
            .headways
            .into_iter()
            .map(|headway| Headway {
                stop_id: key.stop_id.clone(),
                route_id: key.route_id.clone(),
                ..headway
            })
            .collect()
    }

    async fn insert(conn: &mut PgConnection, records: &[Self]) -> Result<u64, SyncError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut directions = Vec::with_capacity(records.len());
        let mut current = Vec::with_capacity(records.len());
        let mut previous = Vec::with_capacity(records.len());
        let mut headway_times = Vec::with_capacity(records.len());
        let mut benchmarks = Vec::with_capacity(records.len());
        for record in records {
            directions.push(convert::direction("direction", &record.direction)?);
            current.push(convert::epoch_seconds("current_dep_dt", &record.current_dep_dt)?);
            previous.push(convert::epoch_seconds("previous_dep_dt", &record.previous_dep_dt)?);
            headway_times.push(convert::seconds("headway_time_sec", &record.headway_time_sec)?);
            benchmarks.push(convert::optional_seconds(
                "benchmark_headway_time_sec",
                record.benchmark_headway_time_sec.as_deref(),
            )?);
        }
        let stop_ids: Vec<&str> = records.iter().map(|r| r.stop_id.as_str()).collect();
        let route_ids: Vec<&str> = records.iter().map(|r| r.route_id.as_str()).collect();
        let prev_route_ids: Vec<&str> = records.iter().map(|r| r.prev_route_id.as_str()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO headway (
                stop_id, route_id, prev_route_id, direction,
                current_dep_dt, previous_dep_dt, headway_time_sec, benchmark_headway_time_sec
            )
            SELECT * FROM UNNEST(
                $1::text[], $2::text[], $3::text[], $4::bool[],
                $5::timestamptz[], $6::timestamptz[], $7::int4[], $8::int4[]
            )
            "#,
        )
        .bind(&stop_ids)
        .bind(&route_ids)
        .bind(&prev_route_ids)
        .bind(&directions)
        .bind(&current)
        .bind(&previous)
        .bind(&headway_times)
        .bind(&benchmarks)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    async fn select(
        conn: &mut PgConnection,
        keys: &[StopRouteKey],
        range: TimeRange,
    ) -> Result<Vec<HeadwayRow>, sqlx::Error> {
        let (stop_ids, route_ids) = stop_route_columns(keys);

        sqlx::query_as::<_, HeadwayRow>(
            r#"
            SELECT h.stop_id, h.route_id, h.prev_route_id, h.direction,
                   h.current_dep_dt, h.previous_dep_dt, h.headway_time_sec,
                   h.benchmark_headway_time_sec
            FROM headway h
            JOIN UNNEST($1::text[], $2::text[]) AS k(stop_id, route_id)
              ON h.stop_id = k.stop_id AND h.route_id = k.route_id
            WHERE ($3::timestamptz IS NULL OR h.current_dep_dt >= $3)
              AND ($4::timestamptz IS NULL OR h.current_dep_dt <= $4)
            ORDER BY h.current_dep_dt
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
        let result = sqlx::query("DELETE FROM headway WHERE current_dep_dt < $1")
            .bind(horizon)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}
