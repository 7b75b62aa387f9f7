//! HTTP surface: refresh and select per cached kind, reference listings, health.

mod cache;
pub mod error;
pub mod middleware;
mod params;
mod reference;
pub mod routes;
mod status;

pub use routes::create_router;
