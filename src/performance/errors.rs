//! Error types for the Performance API client.

#[derive(Debug, thiserror::Error)]
pub enum PerformanceApiError {
    /// Transport failure, including the per-request timeout. Build with [`without_url`]
    /// so the query string never reaches messages or logs.
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest_middleware::Error,
    },
    #[error("{url} responded with {status}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("failed to parse response from {url}")]
    ParseFailed {
        url: String,
        #[source]
        source: anyhow::Error,
    },
}

impl PerformanceApiError {
    /// Whether the failure was the client-side timeout rather than an upstream answer.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Request { source, .. } => match source {
                reqwest_middleware::Error::Reqwest(e) => e.is_timeout(),
                reqwest_middleware::Error::Middleware(_) => false,
            },
            _ => false,
        }
    }
}

/// Drop the request URL from a transport error; its query string carries `api_key`.
pub fn without_url(error: reqwest_middleware::Error) -> reqwest_middleware::Error {
    match error {
        reqwest_middleware::Error::Reqwest(e) => reqwest_middleware::Error::Reqwest(e.without_url()),
        other => other,
    }
}
