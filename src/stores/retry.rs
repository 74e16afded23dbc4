//! Retry decorator for period stores.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::core::{Period, Project, Quarter};

use super::{PeriodStore, Revision, StoredPeriod, StoreError, WriteMode};

/// Wrapper that adds retry logic with exponential backoff to a period store.
///
/// Transient errors are retried until `max_retries` is reached; the delay
/// starts at `base_delay` and doubles after each failed attempt. Revision
/// conflicts and permanent errors pass straight through — the settlement
/// engine itself never retries, so whatever policy a host wants lives in
/// this decorator.
pub struct RetryingStore<S> {
    inner: S,
    max_retries: u32,
    base_delay: Duration,
}

impl<S> RetryingStore<S> {
    /// Create a new `RetryingStore` wrapping `inner`.
    pub fn new(inner: S, max_retries: u32, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
        }
    }

    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.mul_f64(2f64.powi(attempt as i32))
    }
}

#[async_trait]
impl<S: PeriodStore> PeriodStore for RetryingStore<S> {
    async fn project(&self, project_id: &str) -> Result<Option<Project>, StoreError> {
        let mut attempt = 0;
        loop {
            match self.inner.project(project_id).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    debug!(attempt, %e, "retrying project lookup");
                    tokio::time::sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn period(
        &self,
        project_id: &str,
        year: i32,
        quarter: Quarter,
    ) -> Result<Option<StoredPeriod>, StoreError> {
        let mut attempt = 0;
        loop {
            match self.inner.period(project_id, year, quarter).await {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    debug!(attempt, %e, "retrying period read");
                    tokio::time::sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    async fn put_period(
        &self,
        project_id: &str,
        year: i32,
        quarter: Quarter,
        doc: &Period,
        mode: WriteMode,
        expected: Option<Revision>,
    ) -> Result<(), StoreError> {
        let mut attempt = 0;
        loop {
            match self
                .inner
                .put_period(project_id, year, quarter, doc, mode, expected)
                .await
            {
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    debug!(attempt, %e, "retrying period write");
                    tokio::time::sleep(self.delay_for(attempt)).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}
