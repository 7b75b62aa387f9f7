//! V3 API client used to seed the `route`, `stop` and `shape` reference tables.

use anyhow::{Context, Result};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::data::reference::{Route, Shape, Stop};
use crate::performance::json::parse_json_with_context;
use crate::performance::middleware::TransactionLogger;

/// Rapid-transit routes mirrored into the reference tables.
pub const RAPID_TRANSIT_ROUTES: [&str; 8] = [
    "Red", "Mattapan", "Orange", "Green-B", "Green-C", "Green-D", "Green-E", "Blue",
];

#[derive(Debug, Deserialize)]
struct RoutesResponse {
    #[serde(default)]
    included: Vec<RoutePattern>,
}

#[derive(Debug, Deserialize)]
struct RoutePattern {
    relationships: RoutePatternRelationships,
}

#[derive(Debug, Deserialize)]
struct RoutePatternRelationships {
    representative_trip: Relationship,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    data: ResourceId,
}

#[derive(Debug, Deserialize)]
struct ResourceId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct TripsResponse {
    #[serde(default)]
    included: Vec<Included>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Included {
    Shape {
        id: String,
        attributes: ShapeAttributes,
    },
    Stop {
        id: String,
        attributes: StopAttributes,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ShapeAttributes {
    polyline: String,
}

#[derive(Debug, Deserialize)]
struct StopAttributes {
    name: String,
    latitude: f64,
    longitude: f64,
}

/// Everything written by one reference seed.
#[derive(Debug, Default)]
pub struct ReferenceSnapshot {
    pub routes: Vec<Route>,
    pub stops: Vec<Stop>,
    pub shapes: Vec<Shape>,
}

pub struct V3Client {
    http: ClientWithMiddleware,
    base_url: String,
    api_key: Option<String>,
}

impl V3Client {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http = ClientBuilder::new(
            reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .context("failed to build V3 API HTTP client")?,
        )
        .with(TransactionLogger)
        .build();

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key,
        })
    }

    async fn get<R: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<R> {
        let url = format!("{}/{path}", self.base_url);
        let mut request = self.http.get(&url).query(query);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("{url} returned an error status"))?;
        let body = response
            .text()
            .await
            .with_context(|| format!("failed to read body from {url}"))?;

        parse_json_with_context(&body).with_context(|| format!("failed to parse {url}"))
    }

    /// Ids of the representative trip of every route pattern of `route_id`.
    pub async fn representative_trip_ids(&self, route_id: &str) -> Result<Vec<String>> {
        let response: RoutesResponse = self
            .get(
                "routes",
                &[
                    ("fields[route]", "id"),
                    ("include", "route_patterns"),
                    ("filter[id]", route_id),
                ],
            )
            .await?;

        Ok(response
            .included
            .into_iter()
            .map(|pattern| pattern.relationships.representative_trip.data.id)
            .collect())
    }

    /// Stops and shapes served by `trip_ids`, attributed to `route_id`.
    pub async fn stops_and_shapes(
        &self,
        route_id: &str,
        trip_ids: &[String],
    ) -> Result<(Vec<Stop>, Vec<Shape>)> {
        if trip_ids.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let filter = trip_ids.join(",");
        let response: TripsResponse = self
            .get("trips", &[("include", "shape,stops"), ("filter[id]", &filter)])
            .await?;

        let mut stops = Vec::new();
        let mut shapes = Vec::new();
        for entity in response.included {
            match entity {
                Included::Shape { id, attributes } => shapes.push(Shape {
                    id,
                    route_id: route_id.to_owned(),
                    polyline: attributes.polyline,
                }),
                Included::Stop { id, attributes } => stops.push(Stop {
                    id,
                    route_id: route_id.to_owned(),
                    name: attributes.name,
                    latitude: attributes.latitude,
                    longitude: attributes.longitude,
                }),
                Included::Other => {}
            }
        }
        Ok((stops, shapes))
    }

    /// Routes, stops and shapes for `route_ids`, deduplicated for the table keys.
    pub async fn fetch_reference(&self, route_ids: &[&str]) -> Result<ReferenceSnapshot> {
        let mut snapshot = ReferenceSnapshot::default();
        let mut seen_stops = HashSet::new();
        let mut seen_shapes = HashSet::new();

        for &route_id in route_ids {
            info!(route_id, "Fetching route reference data");
            let trip_ids = self.representative_trip_ids(route_id).await?;
            debug!(route_id, trips = trip_ids.len(), "Resolved representative trips");

            let (stops, shapes) = self.stops_and_shapes(route_id, &trip_ids).await?;
            snapshot.routes.push(Route {
                id: route_id.to_owned(),
            });
            snapshot.stops.extend(
                stops
                    .into_iter()
                    .filter(|s| seen_stops.insert((s.id.clone(), s.route_id.clone()))),
            );
            snapshot
                .shapes
                .extend(shapes.into_iter().filter(|s| seen_shapes.insert(s.id.clone())));
        }

        Ok(snapshot)
    }
}
