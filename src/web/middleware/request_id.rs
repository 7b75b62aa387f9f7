//! Per-request tracing spans keyed by a request id.
//!
//! A caller-supplied `x-request-id` is reused when it is a valid header value; otherwise a
//! ULID is generated. The resolved id is echoed on the response.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::response::Response;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::Instrument;

use crate::utils::fmt_duration;

static REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Longest caller-supplied id accepted as-is.
const MAX_INBOUND_ID_LEN: usize = 64;

#[derive(Clone)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

#[derive(Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

fn resolve_request_id(req: &Request) -> HeaderValue {
    req.headers()
        .get(&REQUEST_ID)
        .filter(|value| !value.is_empty() && value.len() <= MAX_INBOUND_ID_LEN)
        .cloned()
        .unwrap_or_else(|| {
            // A ULID is always valid header text.
            HeaderValue::from_str(&ulid::Ulid::new().to_string())
                .unwrap_or_else(|_| HeaderValue::from_static("unknown"))
        })
}

impl<S, B> Service<Request> for RequestIdService<S>
where
    S: Service<Request, Response = Response<B>> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: std::fmt::Debug,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let request_id = resolve_request_id(&req);
        let span = tracing::info_span!(
            "request",
            request_id = request_id.to_str().unwrap_or_default()
        );
        let method = req.method().clone();
        let path = req.uri().path().to_owned();
        let started = Instant::now();

        let future = self.inner.call(req);

        Box::pin(
            async move {
                let mut result = future.await;
                let duration = fmt_duration(started.elapsed());

                match &mut result {
                    Ok(response) => {
                        let status = response.status().as_u16();
                        if status >= 500 {
                            tracing::warn!(%method, path, status, duration, "Response");
                        } else {
                            tracing::debug!(%method, path, status, duration, "Response");
                        }
                        response.headers_mut().insert(REQUEST_ID.clone(), request_id);
                    }
                    Err(e) => {
                        tracing::error!(%method, path, error = ?e, duration, "Request failed");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}
