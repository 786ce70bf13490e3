//! Retry with backoff for SQLite write contention.
//!
//! [`BackoffPolicy`] is a pure description of when and how long to wait;
//! [`RetryingStore`] applies it around the write operations of another store.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::config::RetryConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{RepositoryDraft, RepositoryRecord, TechnologyCount};
use crate::store::RepositoryStore;

/// Bounded multiplicative backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    /// Total attempts, counting the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Growth factor applied after each further failure
    pub multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            multiplier: 1.5,
        }
    }
}

impl BackoffPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            multiplier: config.multiplier,
        }
    }

    /// Whether a failed `attempt` (1-based) should be followed by another one.
    ///
    /// Only write contention is retried.
    pub fn should_retry(&self, attempt: u32, error: &StoreError) -> bool {
        error.is_transient() && attempt < self.max_attempts
    }

    /// Wait before the attempt following `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.initial_delay
            .mul_f64(self.multiplier.powi(exponent))
    }

    /// Every delay the policy can produce, in order.
    pub fn schedule(&self) -> Vec<Duration> {
        (1..self.max_attempts)
            .map(|attempt| self.delay_after(attempt))
            .collect()
    }

    /// Runs `operation` until it succeeds, fails with a non-retryable error
    /// or runs out of attempts. The last error is returned.
    pub async fn run<T, F, Fut>(&self, name: &'static str, mut operation: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if self.should_retry(attempt, &err) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        operation = name,
                        attempt,
                        ?delay,
                        error = %err,
                        "Database is locked, retrying"
                    );
                    metrics::counter!("showcase_store_retries_total", "operation" => name)
                        .increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        error!(
                            operation = name,
                            attempts = attempt,
                            error = %err,
                            "Giving up after repeated write contention"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

/// Applies a [`BackoffPolicy`] to the writes of the wrapped store.
#[derive(Debug, Clone)]
pub struct RetryingStore<S> {
    inner: S,
    policy: BackoffPolicy,
}

impl<S> RetryingStore<S> {
    pub fn new(inner: S, policy: BackoffPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}

#[async_trait]
impl<S: RepositoryStore> RepositoryStore for RetryingStore<S> {
    async fn find_by_url(&self, url: &str) -> StoreResult<Option<RepositoryRecord>> {
        self.inner.find_by_url(url).await
    }

    async fn insert(&self, draft: RepositoryDraft) -> StoreResult<RepositoryRecord> {
        self.policy
            .run("insert", || self.inner.insert(draft.clone()))
            .await
    }

    async fn replace(&self, url: &str, draft: RepositoryDraft) -> StoreResult<RepositoryRecord> {
        self.policy
            .run("replace", || self.inner.replace(url, draft.clone()))
            .await
    }

    async fn list_all(&self) -> StoreResult<Vec<RepositoryRecord>> {
        self.inner.list_all().await
    }

    async fn delete_by_url(&self, url: &str) -> StoreResult<RepositoryRecord> {
        self.policy
            .run("delete_by_url", || self.inner.delete_by_url(url))
            .await
    }

    async fn upsert_tally_count(&self, name: &str, delta: i64) -> StoreResult<u64> {
        self.policy
            .run("upsert_tally_count", || {
                self.inner.upsert_tally_count(name, delta)
            })
            .await
    }

    async fn list_technologies(&self) -> StoreResult<Vec<TechnologyCount>> {
        self.inner.list_technologies().await
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }
}
