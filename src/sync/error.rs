//! Failure taxonomy for refresh and select operations.

use crate::data::convert::ConversionError;
use crate::performance::PerformanceApiError;
use crate::sync::window::Window;
use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Rejected before any lock, transaction or upstream call.
    #[error("{0}")]
    Validation(String),
    /// At least one key could not be fetched; the whole refresh was rolled back.
    #[error("{}", format_failures(.0))]
    Upstream(Vec<KeyFailure>),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("database error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Why a single key's fetch task stopped.
#[derive(Debug, thiserror::Error)]
pub enum FailureCause {
    #[error(transparent)]
    Fetch(#[from] PerformanceApiError),
    #[error("fetch task aborted: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// One key's failure, with the window it was working on when known.
#[derive(Debug)]
pub struct KeyFailure {
    pub key: String,
    pub window: Option<Window>,
    pub cause: FailureCause,
}

impl fmt::Display for KeyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.window {
            Some(window) => write!(f, "{} {}: {}", self.key, window, self.cause),
            None => write!(f, "{}: {}", self.key, self.cause),
        }
    }
}

fn format_failures(failures: &[KeyFailure]) -> String {
    let details = failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    format!("upstream fetch failed for {} key(s): {details}", failures.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_lists_every_key() {
        let failures = vec![
            KeyFailure {
                key: "70061@Red".into(),
                window: None,
                cause: FailureCause::Fetch(PerformanceApiError::Status {
                    status: 503,
                    url: "https://upstream/dwells".into(),
                    body: "busy".into(),
                }),
            },
            KeyFailure {
                key: "70063@Red".into(),
                window: None,
                cause: FailureCause::Fetch(PerformanceApiError::Status {
                    status: 500,
                    url: "https://upstream/dwells".into(),
                    body: String::new(),
                }),
            },
        ];

        let message = SyncError::Upstream(failures).to_string();
        assert!(message.starts_with("upstream fetch failed for 2 key(s)"));
        assert!(message.contains("70061@Red"));
        assert!(message.contains("70063@Red"));
        assert!(message.contains("503"));
    }
}
