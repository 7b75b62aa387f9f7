//! Key-parallel fetch fan-out.
//!
//! One task per key walks that key's windows in order. Tasks share nothing but the record
//! channel; failures come back through the join handles.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::performance::PerformanceApiError;
use crate::sync::entity::CachedEntity;
use crate::sync::error::{FailureCause, KeyFailure};
use crate::sync::window::Window;
use crate::utils::fmt_duration;

/// Source of records for one key and one window.
#[async_trait]
pub trait Fetcher<E: CachedEntity>: Send + Sync {
    async fn fetch(&self, key: &E::Key, window: &Window) -> Result<Vec<E>, PerformanceApiError>;
}

/// The windows planned for a single key.
#[derive(Debug, Clone)]
pub struct KeyPlan<K> {
    pub key: K,
    pub windows: Vec<Window>,
}

#[derive(Debug)]
pub struct DispatchOutcome<E> {
    /// Records of every key, in window order within each key.
    pub records: Vec<E>,
    pub failures: Vec<KeyFailure>,
    pub windows_fetched: usize,
}

impl<E> DispatchOutcome<E> {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Fetch every planned window and wait for all keys to finish.
///
/// A failing key stops at its failing window; its siblings still run to completion.
pub async fn dispatch<E: CachedEntity>(
    fetcher: Arc<dyn Fetcher<E>>,
    plans: Vec<KeyPlan<E::Key>>,
) -> DispatchOutcome<E> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<E>>();
    let mut tasks = JoinSet::new();
    let mut labels = HashMap::new();

    for plan in plans {
        if plan.windows.is_empty() {
            continue;
        }

        let label = plan.key.to_string();
        let handle = tasks.spawn(fetch_key(fetcher.clone(), plan, tx.clone()));
        labels.insert(handle.id(), label);
    }
    drop(tx);

    let mut failures = Vec::new();
    let mut windows_fetched = 0;
    while let Some(joined) = tasks.join_next_with_id().await {
        match joined {
            Ok((_, Ok(fetched))) => windows_fetched += fetched,
            Ok((_, Err(failure))) => {
                let timed_out = matches!(&failure.cause, FailureCause::Fetch(e) if e.is_timeout());
                warn!(key = %failure.key, timed_out, error = %failure.cause, "Key fetch failed");
                failures.push(failure);
            }
            Err(join_error) => {
                let key = labels.remove(&join_error.id()).unwrap_or_default();
                warn!(key = %key, error = %join_error, "Key fetch task aborted");
                failures.push(KeyFailure {
                    key,
                    window: None,
                    cause: FailureCause::Task(join_error),
                });
            }
        }
    }

    let mut records = Vec::new();
    while let Some(batch) = rx.recv().await {
        records.extend(batch);
    }

    DispatchOutcome {
        records,
        failures,
        windows_fetched,
    }
}

async fn fetch_key<E: CachedEntity>(
    fetcher: Arc<dyn Fetcher<E>>,
    plan: KeyPlan<E::Key>,
    records: mpsc::UnboundedSender<Vec<E>>,
) -> Result<usize, KeyFailure> {
    let KeyPlan { key, windows } = plan;

    for window in &windows {
        let started = Instant::now();
        match fetcher.fetch(&key, window).await {
            Ok(batch) => {
                debug!(
                    kind = %E::KIND,
                    key = %key,
                    window = %window,
                    records = batch.len(),
                    duration = fmt_duration(started.elapsed()),
                    "Fetched window"
                );
                // The receiver is held until every task has been joined.
                let _ = records.send(batch);
            }
            Err(error) => {
                return Err(KeyFailure {
                    key: key.to_string(),
                    window: Some(*window),
                    cause: FailureCause::Fetch(error),
                });
            }
        }
    }

    debug!(kind = %E::KIND, key = %key, windows = windows.len(), "Key caught up");
    Ok(windows.len())
}
