//! The incremental windowed cache-synchronization engine.
//!
//! A refresh plans the missing windows of each key ([`window`]), fetches them one task per
//! key ([`dispatch`]), and writes records, watermarks and the retention purge in a single
//! transaction ([`refresh`]). Record kinds plug in through [`entity::CachedEntity`].

pub mod dispatch;
pub mod entity;
pub mod error;
pub mod key;
pub mod refresh;
pub mod window;

pub use dispatch::Fetcher;
pub use entity::{CachedEntity, EntityKind, TimeRange};
pub use error::SyncError;
pub use key::{CacheKey, StopPairKey, StopRouteKey};
pub use refresh::{RefreshReport, Refresher};
