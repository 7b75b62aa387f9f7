//! Cache keys: the unit a watermark is tracked for.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

use crate::data::watermarks::{self, StopPairTable, StopRouteTable};

/// Identifies one synchronization unit and knows how to read and advance its watermark.
#[async_trait]
pub trait CacheKey: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static {
    /// Watermark table selector for this key shape.
    type Table: Copy + fmt::Debug + Send + Sync + 'static;

    /// Upstream filter parameters identifying this key.
    fn filter_params(&self) -> Vec<(&'static str, String)>;

    /// Stop ids that must exist in the `stop` reference table.
    fn stop_ids(&self) -> Vec<&str>;

    /// Route id that must exist in the `route` reference table.
    fn route_id(&self) -> &str;

    async fn read_watermarks(
        conn: &mut PgConnection,
        table: Self::Table,
        keys: &[Self],
    ) -> Result<HashMap<Self, DateTime<Utc>>, sqlx::Error>;

    /// Raise every key's watermark to `today`, creating missing rows. Never lowers one.
    async fn advance_watermarks(
        conn: &mut PgConnection,
        table: Self::Table,
        keys: &[Self],
        today: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error>;
}

/// A single stop on a route (dwells, headways, past alerts).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StopRouteKey {
    pub stop_id: String,
    pub route_id: String,
}

impl StopRouteKey {
    pub fn new(stop_id: impl Into<String>, route_id: impl Into<String>) -> Self {
        Self {
            stop_id: stop_id.into(),
            route_id: route_id.into(),
        }
    }

    /// One key per stop id, in request order, duplicates collapsed.
    pub fn expand(stop_ids: &[String], route_id: &str) -> Vec<Self> {
        dedup(stop_ids.iter().map(|stop| Self::new(stop, route_id)))
    }
}

impl fmt::Display for StopRouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.stop_id, self.route_id)
    }
}

#[async_trait]
impl CacheKey for StopRouteKey {
    type Table = StopRouteTable;

    fn filter_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("stop", self.stop_id.clone()),
            ("route", self.route_id.clone()),
        ]
    }

    fn stop_ids(&self) -> Vec<&str> {
        vec![self.stop_id.as_str()]
    }

    fn route_id(&self) -> &str {
        &self.route_id
    }

    async fn read_watermarks(
        conn: &mut PgConnection,
        table: StopRouteTable,
        keys: &[Self],
    ) -> Result<HashMap<Self, DateTime<Utc>>, sqlx::Error> {
        watermarks::read_stop_route(conn, table, keys).await
    }

    async fn advance_watermarks(
        conn: &mut PgConnection,
        table: StopRouteTable,
        keys: &[Self],
        today: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        watermarks::advance_stop_route(conn, table, keys, today).await
    }
}

/// An origin/destination stop pair on a route (travel times).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StopPairKey {
    pub from_stop_id: String,
    pub to_stop_id: String,
    pub route_id: String,
}

impl StopPairKey {
    pub fn new(
        from_stop_id: impl Into<String>,
        to_stop_id: impl Into<String>,
        route_id: impl Into<String>,
    ) -> Self {
        Self {
            from_stop_id: from_stop_id.into(),
            to_stop_id: to_stop_id.into(),
            route_id: route_id.into(),
        }
    }

    /// The cross product of origins and destinations, duplicates collapsed.
    pub fn expand(from_stop_ids: &[String], to_stop_ids: &[String], route_id: &str) -> Vec<Self> {
        dedup(from_stop_ids.iter().flat_map(|from| {
            to_stop_ids
                .iter()
                .map(move |to| Self::new(from, to, route_id))
        }))
    }
}

impl fmt::Display for StopPairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{}@{}",
            self.from_stop_id, self.to_stop_id, self.route_id
        )
    }
}

#[async_trait]
impl CacheKey for StopPairKey {
    type Table = StopPairTable;

    fn filter_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("from_stop", self.from_stop_id.clone()),
            ("to_stop", self.to_stop_id.clone()),
            ("route", self.route_id.clone()),
        ]
    }

    fn stop_ids(&self) -> Vec<&str> {
        vec![self.from_stop_id.as_str(), self.to_stop_id.as_str()]
    }

    fn route_id(&self) -> &str {
        &self.route_id
    }

    async fn read_watermarks(
        conn: &mut PgConnection,
        table: StopPairTable,
        keys: &[Self],
    ) -> Result<HashMap<Self, DateTime<Utc>>, sqlx::Error> {
        watermarks::read_stop_pair(conn, table, keys).await
    }

    async fn advance_watermarks(
        conn: &mut PgConnection,
        table: StopPairTable,
        keys: &[Self],
        today: DateTime<Utc>,
    ) -> Result<u64, sqlx::Error> {
        watermarks::advance_stop_pair(conn, table, keys, today).await
    }
}

fn dedup<K: Clone + Eq + Hash>(keys: impl Iterator<Item = K>) -> Vec<K> {
    let mut seen = HashSet::new();
    keys.filter(|key| seen.insert(key.clone())).collect()
}
