//! Async entry points into the blocking store engines.
//!
//! Writes are retried with exponential backoff plus jitter; once the attempts
//! are spent the caller closes its connection and the chunk is requeued.

use super::ResultStore;
use super::types::ResultRow;
use crate::error::StoreError;

use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            base_delay: Duration::from_millis(150),
            max_delay: Duration::from_millis(1200),
        }
    }
}

pub async fn upsert_with_retry(
    store: Arc<dyn ResultStore>,
    row: ResultRow,
    policy: RetryPolicy,
) -> Result<(), StoreError> {
    let row = Arc::new(row);
    let mut delay = policy.base_delay;
    let mut last_error = String::from("no attempts made");

    for attempt in 0..policy.attempts {
        let store = store.clone();
        let row = row.clone();
        let outcome = tokio::task::spawn_blocking(move || store.upsert(&row))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))
            .and_then(|result| result);

        match outcome {
            Ok(()) => return Ok(()),
            Err(e) => {
                tracing::warn!(
                    "Store write attempt {}/{} failed: {}",
                    attempt + 1,
                    policy.attempts,
                    e
                );
                last_error = e.to_string();
                if attempt + 1 == policy.attempts {
                    break;
                }
                let jitter = Duration::from_millis(rand::random::<u64>() % 50);
                tokio::time::sleep(delay + jitter).await;
                delay = (delay * 2).min(policy.max_delay);
            }
        }
    }

    Err(StoreError::RetriesExhausted {
        attempts: policy.attempts,
        last: last_error,
    })
}

pub async fn scan_blocking(store: Arc<dyn ResultStore>) -> Result<Vec<ResultRow>, StoreError> {
    tokio::task::spawn_blocking(move || store.scan())
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
}
