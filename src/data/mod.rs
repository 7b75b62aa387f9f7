//! Postgres storage: one repository module per cached kind, plus watermarks and
//! reference tables.

pub mod alerts;
pub mod convert;
pub mod dwells;
pub mod headways;
pub mod health;
pub mod reference;
pub mod travel_times;
pub mod watermarks;

use crate::sync::key::{StopPairKey, StopRouteKey};

/// Column arrays for binding stop/route keys to `UNNEST($1::text[], $2::text[])`.
pub(crate) fn stop_route_columns(keys: &[StopRouteKey]) -> (Vec<&str>, Vec<&str>) {
    keys.iter()
        .map(|k| (k.stop_id.as_str(), k.route_id.as_str()))
        .unzip()
}

/// Column arrays for binding stop-pair keys to three `text[]` parameters.
pub(crate) fn stop_pair_columns(keys: &[StopPairKey]) -> (Vec<&str>, Vec<&str>, Vec<&str>) {
    let mut from_ids = Vec::with_capacity(keys.len());
    let mut to_ids = Vec::with_capacity(keys.len());
    let mut route_ids = Vec::with_capacity(keys.len());
    for key in keys {
        from_ids.push(key.from_stop_id.as_str());
        to_ids.push(key.to_stop_id.as_str());
        route_ids.push(key.route_id.as_str());
    }
    (from_ids, to_ids, route_ids)
}
