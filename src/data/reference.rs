//! The `route`, `stop` and `shape` reference tables.
//!
//! Seeded from the V3 API by `perfdash seed-reference`; refreshes validate their keys
//! against them.

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::{PgConnection, PgPool};
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, TS)]
#[ts(export)]
pub struct Route {
    pub id: String,
}

/// A stop as served on one route; the same stop id appears once per route.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Stop {
    pub id: String,
    pub route_id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Encoded polyline of a representative trip's path.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Shape {
    pub id: String,
    pub route_id: String,
    pub polyline: String,
}

pub async fn list_stops(pool: &PgPool) -> Result<Vec<Stop>, sqlx::Error> {
    sqlx::query_as::<_, Stop>(
        "SELECT id, route_id, name, latitude, longitude FROM stop ORDER BY route_id, id",
    )
    .fetch_all(pool)
    .await
}

pub async fn list_shapes(pool: &PgPool) -> Result<Vec<Shape>, sqlx::Error> {
    sqlx::query_as::<_, Shape>("SELECT id, route_id, polyline FROM shape ORDER BY route_id, id")
        .fetch_all(pool)
        .await
}

/// The ids in `ids` that no `stop` row has, in input order.
pub async fn missing_stop_ids(
    conn: &mut PgConnection,
    ids: &[&str],
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT k.id
        FROM UNNEST($1::text[]) WITH ORDINALITY AS k(id, ord)
        WHERE NOT EXISTS (SELECT 1 FROM stop s WHERE s.id = k.id)
        ORDER BY k.ord
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await
}

/// The ids in `ids` that no `route` row has, in input order.
pub async fn missing_route_ids(
    conn: &mut PgConnection,
    ids: &[&str],
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        SELECT k.id
        FROM UNNEST($1::text[]) WITH ORDINALITY AS k(id, ord)
        WHERE NOT EXISTS (SELECT 1 FROM route r WHERE r.id = k.id)
        ORDER BY k.ord
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await
}

/// Replace all three reference tables in one transaction.
pub async fn replace_all(
    pool: &PgPool,
    routes: &[Route],
    stops: &[Stop],
    shapes: &[Shape],
) -> Result<()> {
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM shape")
        .execute(&mut *tx)
        .await
        .context("failed to clear shapes")?;
    sqlx::query("DELETE FROM stop")
        .execute(&mut *tx)
        .await
        .context("failed to clear stops")?;
    sqlx::query("DELETE FROM route")
        .execute(&mut *tx)
        .await
        .context("failed to clear routes")?;

    let route_ids: Vec<&str> = routes.iter().map(|r| r.id.as_str()).collect();
    sqlx::query("INSERT INTO route (id) SELECT * FROM UNNEST($1::text[])")
        .bind(&route_ids)
        .execute(&mut *tx)
        .await
        .context("failed to insert routes")?;

    let stop_ids: Vec<&str> = stops.iter().map(|s| s.id.as_str()).collect();
    let stop_routes: Vec<&str> = stops.iter().map(|s| s.route_id.as_str()).collect();
    let names: Vec<&str> = stops.iter().map(|s| s.name.as_str()).collect();
    let latitudes: Vec<f64> = stops.iter().map(|s| s.latitude).collect();
    let longitudes: Vec<f64> = stops.iter().map(|s| s.longitude).collect();
    sqlx::query(
        r#"
        INSERT INTO stop (id, route_id, name, latitude, longitude)
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[], $4::float8[], $5::float8[])
        "#,
    )
    .bind(&stop_ids)
    .bind(&stop_routes)
    .bind(&names)
    .bind(&latitudes)
    .bind(&longitudes)
    .execute(&mut *tx)
    .await
    .context("failed to insert stops")?;

    let shape_ids: Vec<&str> = shapes.iter().map(|s| s.id.as_str()).collect();
    let shape_routes: Vec<&str> = shapes.iter().map(|s| s.route_id.as_str()).collect();
    let polylines: Vec<&str> = shapes.iter().map(|s| s.polyline.as_str()).collect();
    sqlx::query(
        r#"
        INSERT INTO shape (id, route_id, polyline)
        SELECT * FROM UNNEST($1::text[], $2::text[], $3::text[])
        "#,
    )
    .bind(&shape_ids)
    .bind(&shape_routes)
    .bind(&polylines)
    .execute(&mut *tx)
    .await
    .context("failed to insert shapes")?;

    tx.commit().await?;
    Ok(())
}
