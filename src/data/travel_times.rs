//! The `travel_time` table, keyed by origin/destination stop pairs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgConnection;
use ts_rs::TS;

use crate::data::convert;
use crate::data::stop_pair_columns;
use crate::data::watermarks::StopPairTable;
use crate::performance::models::{TravelTime, TravelTimesResponse};
use crate::sync::entity::{CachedEntity, EntityKind, TimeRange};
use crate::sync::error::SyncError;
use crate::sync::key::StopPairKey;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct TravelTimeRow {
    pub from_stop_id: String,
    pub to_stop_id: String,
    pub route_id: String,
    pub direction: bool,
    pub dep_dt: DateTime<Utc>,
    pub arr_dt: DateTime<Utc>,
    pub travel_time_sec: i32,
    pub benchmark_travel_time_sec: Option<i32>,
}

#[async_trait]
impl CachedEntity for TravelTime {
    type Key = StopPairKey;
    type Response = TravelTimesResponse;
    type Row = TravelTimeRow;

    const KIND: EntityKind = EntityKind::TravelTime;
    const WATERMARKS: StopPairTable = StopPairTable::TravelTime;

    fn from_response(response: TravelTimesResponse, key: &StopPairKey) -> Vec<Self> {
        response
            .travel_times
            .into_iter()
            .map(|travel_time| TravelTime {
                from_stop_id: key.from_stop_id.clone(),
                to_stop_id: key.to_stop_id.clone(),
                route_id: key.route_id.clone(),
                ..travel_time
            })
            .collect()
    }

    async fn insert(conn: &mut PgConnection, records: &[Self]) -> Result<u64, SyncError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut directions = Vec::with_capacity(records.len());
        let mut departures = Vec::with_capacity(records.len());
        let mut arrivals = Vec::with_capacity(records.len());
        let mut travel_times = Vec::with_capacity(records.len());
        let mut benchmarks = Vec::with_capacity(records.len());
        for record in records {
            directions.push(convert::direction("direction", &record.direction)?);
            departures.push(convert::epoch_seconds("dep_dt", &record.dep_dt)?);
            arrivals.push(convert::epoch_seconds("arr_dt", &record.arr_dt)?);
            travel_times.push(convert::seconds("travel_time_sec", &record.travel_time_sec)?);
            benchmarks.push(convert::optional_seconds(
                "benchmark_travel_time_sec",
                record.benchmark_travel_time_sec.as_deref(),
            )?);
        }
        let from_ids: Vec<&str> = records.iter().map(|r| r.from_stop_id.as_str()).collect();
        let to_ids: Vec<&str> = records.iter().map(|r| r.to_stop_id.as_str()).collect();
        let route_ids: Vec<&str> = records.iter().map(|r| r.route_id.as_str()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO travel_time (
                from_stop_id, to_stop_id, route_id, direction,
                dep_dt, arr_dt, travel_time_sec, benchmark_travel_time_sec
            )
            SELECT * FROM UNNEST(
                $1::text[], $2::text[], $3::text[], $4::bool[],
                $5::timestamptz[], $6::timestamptz[], $7::int4[], $8::int4[]
            )
            "#,
        )
        .bind(&from_ids)
        .bind(&to_ids)
        .bind(&route_ids)
        .bind(&directions)
        .bind(&departures)
        .bind(&arrivals)
        .bind(&travel_times)
        .bind(&benchmarks)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected())
    }

    async fn select(
        conn: &mut PgConnection,
        keys: &[StopPairKey],
        range: TimeRange,
    ) -> Result<Vec<TravelTimeRow>, sqlx::Error> {
        let (from_ids, to_ids, route_ids) = stop_pair_columns(keys);

        sqlx::query_as::<_, TravelTimeRow>(
            r#"
            SELECT t.from_stop_id, t.to_stop_id, t.route_id, t.direction,
                   t.dep_dt, t.arr_dt, t.travel_time_sec, t.benchmark_travel_time_sec
            FROM travel_time t
            JOIN UNNEST($1::text[], $2::text[], $3::text[]) AS k(from_stop_id, to_stop_id, route_id)
              ON t.from_stop_id = k.from_stop_id
             AND t.to_stop_id = k.to_stop_id
             AND t.route_id = k.route_id
            WHERE ($4::timestamptz IS NULL OR t.dep_dt >= $4)
              AND ($5::timestamptz IS NULL OR t.dep_dt <= $5)
            ORDER BY t.dep_dt
            "#,
        )
        .bind(&from_ids)
        .bind(&to_ids)
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
        let result = sqlx::query("DELETE FROM travel_time WHERE dep_dt < $1")
            .bind(horizon)
            .execute(&mut *conn)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_response_stamps_pair() {
        let response: TravelTimesResponse = serde_json::from_str(
            r#"{"travel_times":[
                {"direction":"1","dep_dt":"1717000000","arr_dt":"1717000480",
                 "travel_time_sec":"480","benchmark_travel_time_sec":""}
            ]}"#,
        )
        .unwrap();

        let key = StopPairKey::new("70061", "70077", "Red");
        let travel_times = TravelTime::from_response(response, &key);
        assert_eq!(travel_times.len(), 1);
        assert_eq!(travel_times[0].from_stop_id, "70061");
        assert_eq!(travel_times[0].to_stop_id, "70077");
        assert_eq!(travel_times[0].route_id, "Red");
    }
}
