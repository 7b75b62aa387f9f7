//! Query-string parameters shared by the refresh and select handlers.

use serde::Deserialize;

use crate::data::convert;
use crate::sync::{StopPairKey, StopRouteKey, TimeRange};
use crate::utils::split_ids;
use crate::web::error::ApiError;

/// `?stop_ids=a,b&route_id=Red`
#[derive(Debug, Default, Deserialize)]
pub struct StopRouteParams {
    #[serde(default)]
    pub stop_ids: String,
    #[serde(default)]
    pub route_id: String,
    pub start_datetime: Option<String>,
    pub end_datetime: Option<String>,
}

impl StopRouteParams {
    pub fn keys(&self) -> Vec<StopRouteKey> {
        StopRouteKey::expand(&split_ids(&self.stop_ids), self.route_id.trim())
    }

    pub fn range(&self) -> Result<TimeRange, ApiError> {
        parse_range(self.start_datetime.as_deref(), self.end_datetime.as_deref())
    }
}

/// `?from_stop_ids=a&to_stop_ids=b,c&route_id=Red`
#[derive(Debug, Default, Deserialize)]
pub struct StopPairParams {
    #[serde(default)]
    pub from_stop_ids: String,
    #[serde(default)]
    pub to_stop_ids: String,
    #[serde(default)]
    pub route_id: String,
    pub start_datetime: Option<String>,
    pub end_datetime: Option<String>,
}

impl StopPairParams {
    pub fn keys(&self) -> Vec<StopPairKey> {
        StopPairKey::expand(
            &split_ids(&self.from_stop_ids),
            &split_ids(&self.to_stop_ids),
            self.route_id.trim(),
        )
    }

    pub fn range(&self) -> Result<TimeRange, ApiError> {
        parse_range(self.start_datetime.as_deref(), self.end_datetime.as_deref())
    }
}

/// Epoch-second bounds; absent or empty means unbounded.
fn parse_range(start: Option<&str>, end: Option<&str>) -> Result<TimeRange, ApiError> {
    Ok(TimeRange {
        start: convert::optional_epoch_seconds("start_datetime", start)?,
        end: convert::optional_epoch_seconds("end_datetime", end)?,
    })
}
