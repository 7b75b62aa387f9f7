//! Client for the Performance API, the upstream source of every cached record.

pub mod api;
pub mod errors;
pub mod json;
pub mod middleware;
pub mod models;

pub use api::PerformanceApi;
pub use errors::PerformanceApiError;
