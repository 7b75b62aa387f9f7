//! Records as the Performance API returns them.
//!
//! Attributes stay in their upstream text encoding (`"direction": "1"`, epoch seconds as
//! strings) until the repository converts them at insert time. Key fields are stamped by
//! the fetcher because responses omit the ones used to filter the request.

use serde::Deserialize;

/// How long a train stood at a stop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Dwell {
    #[serde(default)]
    pub stop_id: String,
    #[serde(default)]
    pub route_id: String,
    pub direction: String,
    pub arr_dt: String,
    pub dep_dt: String,
    pub dwell_time_sec: String,
}

/// Time between the previous and the current departure at a stop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Headway {
    #[serde(default)]
    pub stop_id: String,
    #[serde(default)]
    pub route_id: String,
    #[serde(default)]
    pub prev_route_id: String,
    pub direction: String,
    pub current_dep_dt: String,
    pub previous_dep_dt: String,
    pub headway_time_sec: String,
    #[serde(default)]
    pub benchmark_headway_time_sec: Option<String>,
}

/// Time a train took between an origin and a destination stop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TravelTime {
    #[serde(default)]
    pub from_stop_id: String,
    #[serde(default)]
    pub to_stop_id: String,
    #[serde(default)]
    pub route_id: String,
    pub direction: String,
    pub dep_dt: String,
    pub arr_dt: String,
    pub travel_time_sec: String,
    #[serde(default)]
    pub benchmark_travel_time_sec: Option<String>,
}

/// A past service alert with every version it went through.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PastAlert {
    pub alert_id: String,
    #[serde(default)]
    pub alert_versions: Vec<AlertVersion>,
}

/// One version of an alert; upstream issues a new version whenever any property changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AlertVersion {
    #[serde(default)]
    pub stop_id: String,
    #[serde(default)]
    pub route_id: String,
    #[serde(default)]
    pub alert_id: String,
    pub version_id: String,
    pub valid_from: String,
    #[serde(default)]
    pub valid_to: Option<String>,
    #[serde(default)]
    pub cause: String,
    #[serde(default)]
    pub effect: String,
    #[serde(default)]
    pub header_text: String,
    #[serde(default)]
    pub description_text: String,
    #[serde(default, rename = "informed_entity")]
    pub informed_entities: Vec<InformedEntity>,
    #[serde(default, rename = "active_period")]
    pub active_periods: Vec<ActivePeriod>,
}

/// A service or facility an alert version affects.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InformedEntity {
    #[serde(default)]
    pub agency_id: Option<String>,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub route_type: Option<String>,
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(default)]
    pub stop_id: Option<String>,
}

/// A period during which an alert version was in effect; `end` is absent while open.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActivePeriod {
    pub start: String,
    #[serde(default)]
    pub end: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DwellsResponse {
    #[serde(default)]
    pub dwell_times: Vec<Dwell>,
}

#[derive(Debug, Deserialize)]
pub struct HeadwaysResponse {
    #[serde(default)]
    pub headways: Vec<Headway>,
}

#[derive(Debug, Deserialize)]
pub struct TravelTimesResponse {
    #[serde(default)]
    pub travel_times: Vec<TravelTime>,
}

#[derive(Debug, Deserialize)]
pub struct PastAlertsResponse {
    #[serde(default)]
    pub past_alerts: Vec<PastAlert>,
}
