//! HTTP middleware for the upstream clients.

use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next};
use std::time::{Duration, Instant};
use tracing::{trace, warn};

use crate::performance::errors::without_url;
use crate::utils::fmt_duration;

/// Requests slower than this are logged at WARN.
const SLOW_REQUEST_THRESHOLD: Duration = Duration::from_secs(5);

/// Logs method, path, status and latency of every outgoing request.
///
/// The query string is never logged; it carries the API credential.
pub struct TransactionLogger;

#[async_trait::async_trait]
impl Middleware for TransactionLogger {
    async fn handle(
        &self,
        req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        let method = req.method().clone();
        let path = req.url().path().to_owned();
        let start = Instant::now();

        let result = next.run(req, extensions).await.map_err(without_url);
        let elapsed = start.elapsed();

        match &result {
            Ok(response) => {
                let status = response.status().as_u16();
                if elapsed > SLOW_REQUEST_THRESHOLD {
                    warn!(%method, path, status, duration = fmt_duration(elapsed), "slow upstream request");
                } else {
                    trace!(%method, path, status, duration = fmt_duration(elapsed), "upstream request");
                }
            }
            Err(error) => {
                warn!(%method, path, duration = fmt_duration(elapsed), error = %error, "upstream request failed");
            }
        }

        result
    }
}
