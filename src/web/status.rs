//! Health endpoint.

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use tracing::{trace, warn};
use ts_rs::TS;

use crate::data::health;
use crate::state::AppState;
use crate::utils::fmt_duration;
use crate::web::error::{ApiError, Envelope, success};

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    commit: &'static str,
    #[ts(type = "number")]
    uptime_secs: u64,
    database_latency: String,
}

/// Liveness plus a database round trip.
pub(super) async fn health(
    State(state): State<AppState>,
) -> Result<Json<Envelope<HealthResponse>>, ApiError> {
    trace!("health check requested");

    let latency = health::ping(&state.db_pool).await.map_err(|e| {
        warn!(error = %e, "Database ping failed");
        ApiError::Unavailable(format!("database unreachable: {e}"))
    })?;

    Ok(success(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        commit: env!("GIT_COMMIT_SHORT"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        database_latency: fmt_duration(latency),
    }))
}
