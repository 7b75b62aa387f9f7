//! Past alerts: the `alert_version` table and its `alert_informed_entity` and
//! `alert_active_period` children.
//!
//! Overlapping windows can return the same version twice, so versions are inserted with
//! `ON CONFLICT DO NOTHING` and only the newly inserted ones get children.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgConnection;
use sqlx::types::Json;
use std::collections::HashSet;
use ts_rs::TS;

use crate::data::convert;
use crate::data::stop_route_columns;
use crate::data::watermarks::StopRouteTable;
use crate::performance::models::{AlertVersion, InformedEntity, PastAlertsResponse};
use crate::sync::entity::{CachedEntity, EntityKind, TimeRange};
use crate::sync::error::SyncError;
use crate::sync::key::StopRouteKey;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct InformedEntityRow {
    pub agency_id: Option<String>,
    pub route_id: Option<String>,
    pub route_type: Option<String>,
    pub trip_id: Option<String>,
    pub stop_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ActivePeriodRow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AlertVersionRow {
    pub stop_id: String,
    pub route_id: String,
    pub alert_id: String,
    pub version_id: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: Option<DateTime<Utc>>,
    pub cause: String,
    pub effect: String,
    pub header_text: String,
    pub description_text: String,
    #[ts(as = "Vec<InformedEntityRow>")]
    pub informed_entities: Json<Vec<InformedEntityRow>>,
    #[ts(as = "Vec<ActivePeriodRow>")]
    pub active_periods: Json<Vec<ActivePeriodRow>>,
}

type VersionId = (String, String, String, String);

fn version_id(version: &AlertVersion) -> VersionId {
    (
        version.stop_id.clone(),
        version.route_id.clone(),
        version.alert_id.clone(),
        version.version_id.clone(),
    )
}

/// Child rows of the inserted versions, flattened into bindable columns.
#[derive(Default)]
struct Children<'a> {
    entity_parents: Vec<&'a AlertVersion>,
    entity_positions: Vec<i32>,
    entities: Vec<&'a InformedEntity>,
    period_parents: Vec<&'a AlertVersion>,
    period_starts: Vec<DateTime<Utc>>,
    period_ends: Vec<Option<DateTime<Utc>>>,
}

impl<'a> Children<'a> {
    fn collect(
        versions: &[&'a AlertVersion],
        inserted: &HashSet<VersionId>,
    ) -> Result<Self, SyncError> {
        let mut children = Self::default();
        for &version in versions {
            if !inserted.contains(&version_id(version)) {
                continue;
            }
            for (position, entity) in version.informed_entities.iter().enumerate() {
                children.entity_parents.push(version);
                children.entity_positions.push(position as i32);
                children.entities.push(entity);
            }
            for period in &version.active_periods {
                children.period_parents.push(version);
                children
                    .period_starts
                    .push(convert::epoch_seconds("active_period.start", &period.start)?);
                children.period_ends.push(convert::optional_epoch_seconds(
                    "active_period.end",
                    period.end.as_deref(),
                )?);
            }
        }
        Ok(children)
    }
}

fn parent_columns<'a>(parents: &[&'a AlertVersion]) -> [Vec<&'a str>; 4] {
    [
        parents.iter().map(|v| v.stop_id.as_str()).collect(),
        parents.iter().map(|v| v.route_id.as_str()).collect(),
        parents.iter().map(|v| v.alert_id.as_str()).collect(),
        parents.iter().map(|v| v.version_id.as_str()).collect(),
    ]
}

#[async_trait]
impl CachedEntity for AlertVersion {
    type Key = StopRouteKey;
    type Response = PastAlertsResponse;
    type Row = AlertVersionRow;

    const KIND: EntityKind = EntityKind::PastAlert;
    const WATERMARKS: StopRouteTable = StopRouteTable::PastAlert;

    fn from_response(response: PastAlertsResponse, key: &StopRouteKey) -> Vec<Self> {
        response
            .past_alerts
            .into_iter()
            .flat_map(|alert| {
                let alert_id = alert.alert_id;
                alert
                    .alert_versions
                    .into_iter()
                    .map(move |version| AlertVersion {
                        stop_id: key.stop_id.clone(),
                        route_id: key.route_id.clone(),
                        alert_id: alert_id.clone(),
                        ..version
                    })
            })
            .collect()
    }

    async fn insert(conn: &mut PgConnection, records: &[Self]) -> Result<u64, SyncError> {
        let mut seen = HashSet::new();
        let versions: Vec<&AlertVersion> = records
            .iter()
            .filter(|v| seen.insert(version_id(v)))
            .collect();
        if versions.is_empty() {
            return Ok(0);
        }

        let mut valid_from = Vec::with_capacity(versions.len());
        let mut valid_to = Vec::with_capacity(versions.len());
        for version in &versions {
            valid_from.push(convert::epoch_seconds("valid_from", &version.valid_from)?);
            valid_to.push(convert::optional_epoch_seconds(
                "valid_to",
                version.valid_to.as_deref(),
            )?);
        }
        let [stop_ids, route_ids, alert_ids, version_ids] = parent_columns(&versions);
        let causes: Vec<&str> = versions.iter().map(|v| v.cause.as_str()).collect();
        let effects: Vec<&str> = versions.iter().map(|v| v.effect.as_str()).collect();
        let headers: Vec<&str> = versions.iter().map(|v| v.header_text.as_str()).collect();
        let descriptions: Vec<&str> = versions
            .iter()
            .map(|v| v.description_text.as_str())
            .collect();

        let inserted: HashSet<VersionId> = sqlx::query_as::<_, VersionId>(
            r#"
            INSERT INTO alert_version (
                stop_id, route_id, alert_id, version_id, valid_from, valid_to,
                cause, effect, header_text, description_text
            )
            SELECT * FROM UNNEST(
                $1::text[], $2::text[], $3::text[], $4::text[],
                $5::timestamptz[], $6::timestamptz[],
                $7::text[], $8::text[], $9::text[], $10::text[]
            )
            ON CONFLICT (stop_id, route_id, alert_id, version_id) DO NOTHING
            RETURNING stop_id, route_id, alert_id, version_id
            "#,
        )
        .bind(&stop_ids)
        .bind(&route_ids)
        .bind(&alert_ids)
        .bind(&version_ids)
        .bind(&valid_from)
        .bind(&valid_to)
        .bind(&causes)
        .bind(&effects)
        .bind(&headers)
        .bind(&descriptions)
        .fetch_all(&mut *conn)
        .await?
        .into_iter()
        .collect();

        let children = Children::collect(&versions, &inserted)?;

        if !children.entities.is_empty() {
            let [stop_ids, route_ids, alert_ids, version_ids] =
                parent_columns(&children.entity_parents);
            let agency_ids: Vec<Option<&str>> = children
                .entities
                .iter()
                .map(|e| e.agency_id.as_deref())
                .collect();
            let informed_routes: Vec<Option<&str>> = children
                .entities
                .iter()
                .map(|e| e.route_id.as_deref())
                .collect();
            let route_types: Vec<Option<&str>> = children
                .entities
                .iter()
                .map(|e| e.route_type.as_deref())
                .collect();
            let trip_ids: Vec<Option<&str>> =
                children.entities.iter().map(|e| e.trip_id.as_deref()).collect();
            let informed_stops: Vec<Option<&str>> =
                children.entities.iter().map(|e| e.stop_id.as_deref()).collect();

            sqlx::query(
                r#"
                INSERT INTO alert_informed_entity (
                    stop_id, route_id, alert_id, version_id, position,
                    agency_id, informed_route_id, route_type, trip_id, informed_stop_id
                )
                SELECT * FROM UNNEST(
                    $1::text[], $2::text[], $3::text[], $4::text[], $5::int4[],
                    $6::text[], $7::text[], $8::text[], $9::text[], $10::text[]
                )
                "#,
            )
            .bind(&stop_ids)
            .bind(&route_ids)
            .bind(&alert_ids)
            .bind(&version_ids)
            .bind(&children.entity_positions)
            .bind(&agency_ids)
            .bind(&informed_routes)
            .bind(&route_types)
            .bind(&trip_ids)
            .bind(&informed_stops)
            .execute(&mut *conn)
            .await?;
        }

        if !children.period_starts.is_empty() {
            let [stop_ids, route_ids, alert_ids, version_ids] =
                parent_columns(&children.period_parents);

            sqlx::query(
                r#"
                INSERT INTO alert_active_period (
                    stop_id, route_id, alert_id, version_id, period_start, period_end
                )
                SELECT * FROM UNNEST(
                    $1::text[], $2::text[], $3::text[], $4::text[],
                    $5::timestamptz[], $6::timestamptz[]
                )
                "#,
            )
            .bind(&stop_ids)
            .bind(&route_ids)
            .bind(&alert_ids)
            .bind(&version_ids)
            .bind(&children.period_starts)
            .bind(&children.period_ends)
            .execute(&mut *conn)
            .await?;
        }

        Ok(inserted.len() as u64)
    }

    async fn select(
        conn: &mut PgConnection,
        keys: &[StopRouteKey],
        range: TimeRange,
    ) -> Result<Vec<AlertVersionRow>, sqlx::Error> {
        let (stop_ids, route_ids) = stop_route_columns(keys);

        sqlx::query_as::<_, AlertVersionRow>(
            r#"
            SELECT v.stop_id, v.route_id, v.alert_id, v.version_id, v.valid_from, v.valid_to,
                   v.cause, v.effect, v.header_text, v.description_text,
                   COALESCE((
                       SELECT jsonb_agg(jsonb_build_object(
                                  'agencyId', e.agency_id,
                                  'routeId', e.informed_route_id,
                                  'routeType', e.route_type,
                                  'tripId', e.trip_id,
                                  'stopId', e.informed_stop_id
                              ) ORDER BY e.position)
                       FROM alert_informed_entity e
                       WHERE e.stop_id = v.stop_id AND e.route_id = v.route_id
                         AND e.alert_id = v.alert_id AND e.version_id = v.version_id
                   ), '[]'::jsonb) AS informed_entities,
                   COALESCE((
                       SELECT jsonb_agg(jsonb_build_object(
                                  'start', p.period_start,
                                  'end', p.period_end
                              ) ORDER BY p.period_start)
                       FROM alert_active_period p
                       WHERE p.stop_id = v.stop_id AND p.route_id = v.route_id
                         AND p.alert_id = v.alert_id AND p.version_id = v.version_id
                   ), '[]'::jsonb) AS active_periods
            FROM alert_version v
            JOIN UNNEST($1::text[], $2::text[]) AS k(stop_id, route_id)
              ON v.stop_id = k.stop_id AND v.route_id = k.route_id
            WHERE ($3::timestamptz IS NULL OR v.valid_from >= $3)
              AND ($4::timestamptz IS NULL OR v.valid_from <= $4)
            ORDER BY v.valid_from, v.alert_id, v.version_id
            "#,
        )
        .bind(&stop_ids)
        .bind(&route_ids)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&mut *conn)
        .await
    }

    /// Retention follows the active periods: periods starting before `horizon` go first,
    /// then every version left with no period at or after it. A version that never had
    /// periods falls back to `valid_from`. Remaining children go through `ON DELETE CASCADE`.
    ///
    /// The outer `DELETE` sees the table as it was before the CTE ran, so surviving
    /// periods are matched on `period_start >= horizon` rather than on existence.
    async fn delete_outdated(
        conn: &mut PgConnection,
        horizon: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            WITH pruned AS (
                DELETE FROM alert_active_period
                WHERE period_start < $1
                RETURNING stop_id, route_id, alert_id, version_id
            )
            DELETE FROM alert_version v
            WHERE NOT EXISTS (
                SELECT 1 FROM alert_active_period p
                WHERE p.stop_id = v.stop_id AND p.route_id = v.route_id
                  AND p.alert_id = v.alert_id AND p.version_id = v.version_id
                  AND p.period_start >= $1
            )
              AND (
                EXISTS (
                    SELECT 1 FROM pruned d
                    WHERE d.stop_id = v.stop_id AND d.route_id = v.route_id
                      AND d.alert_id = v.alert_id AND d.version_id = v.version_id
                )
                OR (
                    v.valid_from < $1
                    AND NOT EXISTS (
                        SELECT 1 FROM alert_active_period p
                        WHERE p.stop_id = v.stop_id AND p.route_id = v.route_id
                          AND p.alert_id = v.alert_id AND p.version_id = v.version_id
                    )
                )
              )
            "#,
        )
        .bind(horizon)
        .execute(&mut *conn)
        .await?;
        Ok(result.rows_affected())
    }
}
