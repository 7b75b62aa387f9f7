//! The capability set every cached record kind provides to the refresh engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::PgConnection;
use sqlx::postgres::PgRow;
use std::fmt;
use ts_rs::TS;

use crate::sync::error::SyncError;
use crate::sync::key::CacheKey;

/// The four record kinds mirrored from the Performance API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum EntityKind {
    Dwell,
    Headway,
    TravelTime,
    PastAlert,
}

impl EntityKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Dwell => "dwell",
            Self::Headway => "headway",
            Self::TravelTime => "travel_time",
            Self::PastAlert => "past_alert",
        }
    }

    /// Path segment under the Performance API base URL.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Dwell => "dwells",
            Self::Headway => "headways",
            Self::TravelTime => "traveltimes",
            Self::PastAlert => "pastalerts",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Optional inclusive bounds on a kind's event time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// A record kind the engine can fetch, store, select and prune.
///
/// Every database operation runs on the caller's connection so the orchestrator can
/// hold one transaction across all of them.
#[async_trait]
pub trait CachedEntity: fmt::Debug + Send + Sync + Sized + 'static {
    type Key: CacheKey;
    /// Body of one upstream response.
    type Response: DeserializeOwned + Send;
    /// Typed row returned by [`CachedEntity::select`].
    type Row: Serialize + Send + Unpin + for<'r> sqlx::FromRow<'r, PgRow>;

    const KIND: EntityKind;
    const WATERMARKS: <Self::Key as CacheKey>::Table;

    /// Flatten a response into records stamped with the key that was requested.
    fn from_response(response: Self::Response, key: &Self::Key) -> Vec<Self>;

    /// Bulk insert in one statement. Returns the number of records written.
    async fn insert(conn: &mut PgConnection, records: &[Self]) -> Result<u64, SyncError>;

    /// Stored rows for `keys`, ordered by event time.
    async fn select(
        conn: &mut PgConnection,
        keys: &[Self::Key],
        range: TimeRange,
    ) -> Result<Vec<Self::Row>, sqlx::Error>;

    /// Delete every record whose event time precedes `horizon`, for all keys.
    async fn delete_outdated(
        conn: &mut PgConnection,
        horizon: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>;
}
