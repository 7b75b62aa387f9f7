//! Web API router construction.

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::performance::models::{AlertVersion, Dwell, Headway, TravelTime};
use crate::state::AppState;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::{cache, reference, status};

/// Refreshes of many cold keys page through weeks of upstream data; they get a long leash.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    let api_router = Router::new()
        .route("/health", get(status::health))
        .route("/stop", get(reference::list_stops))
        .route("/shape", get(reference::list_shapes))
        .route("/cache/dwell", get(cache::refresh_stop_route::<Dwell>))
        .route("/cache/headway", get(cache::refresh_stop_route::<Headway>))
        .route("/cache/alert", get(cache::refresh_stop_route::<AlertVersion>))
        .route("/cache/travel_time", get(cache::refresh_stop_pair::<TravelTime>))
        .route("/dwell", get(cache::select_stop_route::<Dwell>))
        .route("/headway", get(cache::select_stop_route::<Headway>))
        .route("/alert", get(cache::select_stop_route::<AlertVersion>))
        .route("/travel_time", get(cache::select_stop_pair::<TravelTime>))
        .with_state(app_state);

    Router::new()
        .nest("/api", api_router)
        .layer((
            RequestIdLayer,
            TraceLayer::new_for_http(),
            timeout_layer(REQUEST_TIMEOUT),
            CorsLayer::permissive(),
        ))
}

/// Requests running past `duration` are answered with 408.
fn timeout_layer(duration: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::PerformanceApi;
    use crate::sync::Refresher;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use sqlx::postgres::PgPoolOptions;
    use std::num::NonZeroU32;
    use std::sync::Arc;
    use tower::ServiceExt;

    /// State whose pool never connects; only handlers that fail before touching it work.
    fn offline_state() -> AppState {
        let pool = PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy("postgres://perfdash@127.0.0.1:1/perfdash")
            .unwrap();
        let api = PerformanceApi::new(
            "http://127.0.0.1:1",
            "key",
            Duration::from_secs(1),
            NonZeroU32::new(1).unwrap(),
        )
        .unwrap();
        AppState::new(
            pool.clone(),
            Arc::new(api),
            Refresher::new(pool, chrono_tz::America::New_York),
        )
    }

    #[tokio::test]
    async fn test_invalid_datetime_is_bad_request() {
        let router = create_router(offline_state());
        let response = router
            .oneshot(
                Request::builder()
                    .uri("/api/dwell?stop_ids=70061&route_id=Red&start_datetime=soon")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(response.headers().contains_key("x-request-id"));
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["type"], "error");
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let router = create_router(offline_state());
        let response = router
            .oneshot(Request::builder().uri("/api/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_slow_request_times_out_with_408() {
        let router: Router = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .layer(timeout_layer(Duration::from_millis(20)));

        let response = router
            .oneshot(Request::builder().uri("/slow").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    }
}
