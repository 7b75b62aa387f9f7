//! Reference table listings for the dashboard map.

use axum::Json;
use axum::extract::State;

use crate::data::reference::{self, Shape, Stop};
use crate::state::AppState;
use crate::web::error::{ApiError, Envelope, success};

pub(super) async fn list_stops(
    State(state): State<AppState>,
) -> Result<Json<Envelope<Vec<Stop>>>, ApiError> {
    Ok(success(reference::list_stops(&state.db_pool).await?))
}

pub(super) async fn list_shapes(
    State(state): State<AppState>,
) -> Result<Json<Envelope<Vec<Shape>>>, ApiError> {
    Ok(success(reference::list_shapes(&state.db_pool).await?))
}
