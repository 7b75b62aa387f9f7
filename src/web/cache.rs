//! Refresh and select handlers, generic over the cached kind.

use axum::Json;
use axum::extract::{Query, State};

use crate::state::AppState;
use crate::sync::{CachedEntity, RefreshReport, StopPairKey, StopRouteKey};
use crate::web::error::{ApiError, Envelope, success};
use crate::web::params::{StopPairParams, StopRouteParams};

/// `GET /api/cache/{dwell|headway|alert}`
pub(super) async fn refresh_stop_route<E>(
    State(state): State<AppState>,
    Query(params): Query<StopRouteParams>,
) -> Result<Json<Envelope<RefreshReport>>, ApiError>
where
    E: CachedEntity<Key = StopRouteKey>,
{
    let report = state
        .refresher
        .refresh::<E>(state.performance_api.clone(), params.keys())
        .await?;
    Ok(success(report))
}

/// `GET /api/cache/travel_time`
pub(super) async fn refresh_stop_pair<E>(
    State(state): State<AppState>,
    Query(params): Query<StopPairParams>,
) -> Result<Json<Envelope<RefreshReport>>, ApiError>
where
    E: CachedEntity<Key = StopPairKey>,
{
    let report = state
        .refresher
        .refresh::<E>(state.performance_api.clone(), params.keys())
        .await?;
    Ok(success(report))
}

/// `GET /api/{dwell|headway|alert}`
pub(super) async fn select_stop_route<E>(
    State(state): State<AppState>,
    Query(params): Query<StopRouteParams>,
) -> Result<Json<Envelope<Vec<E::Row>>>, ApiError>
where
    E: CachedEntity<Key = StopRouteKey>,
{
    let range = params.range()?;
    let rows = state.refresher.select::<E>(params.keys(), range).await?;
    Ok(success(rows))
}

/// `GET /api/travel_time`
pub(super) async fn select_stop_pair<E>(
    State(state): State<AppState>,
    Query(params): Query<StopPairParams>,
) -> Result<Json<Envelope<Vec<E::Row>>>, ApiError>
where
    E: CachedEntity<Key = StopPairKey>,
{
    let range = params.range()?;
    let rows = state.refresher.select::<E>(params.keys(), range).await?;
    Ok(success(rows))
}
