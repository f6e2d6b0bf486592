//! Optimistic-concurrency helpers
//!
//! [`update_with_retry`] is the read-modify-write loop used for every write to
//! a contended object (Clusters in the seed, Nodes in user clusters): fetch the
//! latest version, apply the mutation, write it back, and start over from a
//! fresh read when the write conflicts. [`poll_until`] is the bounded wait used
//! to observe a write round-trip through the store.

use std::future::Future;
use std::time::Duration;

use kube::Resource;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;
use tracing::warn;

use crate::client::{typed, ObjectClient};
use crate::error::{Error, Result};

/// Backoff settings for conflict retries
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failed attempt
    pub initial_delay: Duration,
    /// Upper bound for a single delay
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Extra random fraction added on top of each delay
    pub jitter: f64,
}

impl Default for RetryConfig {
    /// Four attempts, 10ms growing fivefold, 10% jitter
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            backoff_multiplier: 5.0,
            jitter: 0.1,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Delays to sleep between attempts; yields `max_attempts - 1` values
    pub fn backoff(&self) -> Backoff {
        Backoff {
            remaining: self.max_attempts.saturating_sub(1),
            next: self.initial_delay,
            config: self.clone(),
        }
    }
}

#[derive(Debug)]
pub struct Backoff {
    remaining: u32,
    next: Duration,
    config: RetryConfig,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        let base = self.next;
        self.next = Duration::from_secs_f64(
            (base.as_secs_f64() * self.config.backoff_multiplier)
                .min(self.config.max_delay.as_secs_f64()),
        );

        let jitter = if self.config.jitter > 0.0 {
            rand::thread_rng().gen_range(0.0..self.config.jitter)
        } else {
            0.0
        };
        Some(Duration::from_secs_f64(base.as_secs_f64() * (1.0 + jitter)))
    }
}

/// Re-fetch `name`, apply `mutate`, write back; retry on write conflicts
///
/// `mutate` may run several times, each time on a fresher copy, so it must
/// only depend on its argument and on values captured before the call.
pub async fn update_with_retry<K, F>(
    client: &dyn ObjectClient,
    config: &RetryConfig,
    namespace: Option<&str>,
    name: &str,
    mut mutate: F,
) -> Result<K>
where
    K: Resource<DynamicType = ()> + Serialize + DeserializeOwned,
    F: FnMut(&mut K),
{
    let mut backoff = config.backoff();
    let mut attempt = 0u32;
    loop {
        attempt += 1;

        let mut latest: K = typed::get(client, namespace, name).await?;
        mutate(&mut latest);

        match typed::replace(client, &latest).await {
            Ok(updated) => return Ok(updated),
            Err(e) if e.is_conflict() => match backoff.next() {
                Some(delay) => {
                    warn!(
                        kind = %K::kind(&()),
                        name = %name,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "Update conflicted, retrying on a fresh copy"
                    );
                    tokio::time::sleep(delay).await;
                }
                None => return Err(e),
            },
            Err(e) => return Err(e),
        }
    }
}

/// Evaluate `condition` every `interval` until it returns `true`
///
/// An error from `condition` aborts the wait. Returns [`Error::Timeout`] once
/// `timeout` has elapsed without success.
pub async fn poll_until<F, Fut>(
    interval: Duration,
    timeout: Duration,
    what: &str,
    mut condition: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        tokio::time::sleep(interval).await;
        if condition().await? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::Timeout(what.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::{FakeObjectClient, Failure, Op};
    use k8s_openapi::api::core::v1::Node;
    use kube::api::ObjectMeta;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn node(name: &str) -> Node {
        Node {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 4,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            jitter: 0.0,
        }
    }

    #[test]
    fn test_backoff_yields_attempts_minus_one_delays() {
        let delays: Vec<_> = RetryConfig {
            jitter: 0.0,
            ..Default::default()
        }
        .backoff()
        .collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(50),
                Duration::from_millis(250)
            ]
        );
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            backoff_multiplier: 10.0,
            jitter: 0.0,
        };
        assert!(config.backoff().all(|d| d <= Duration::from_millis(300)));
    }

    #[tokio::test]
    async fn test_update_retries_conflicts_on_fresh_copy() {
        let client = FakeObjectClient::new();
        client.add(&node("worker-1"));
        client.fail(Op::Replace, "Node", 2, Failure::Conflict);

        let runs = AtomicU32::new(0);
        let updated: Node = update_with_retry(&client, &fast(), None, "worker-1", |n: &mut Node| {
            runs.fetch_add(1, Ordering::SeqCst);
            n.metadata
                .annotations
                .get_or_insert_with(Default::default)
                .insert("touched".into(), "true".into());
        })
        .await
        .unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(client.count(Op::Get, "Node"), 3);
        assert_eq!(
            updated.metadata.annotations.unwrap().get("touched").map(String::as_str),
            Some("true")
        );
    }

    #[tokio::test]
    async fn test_update_gives_up_after_max_attempts() {
        let client = FakeObjectClient::new();
        client.add(&node("worker-1"));
        client.fail(Op::Replace, "Node", 10, Failure::Conflict);

        let err = update_with_retry::<Node, _>(&client, &fast(), None, "worker-1", |_| {})
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(client.count(Op::Replace, "Node"), 4);
    }

    #[tokio::test]
    async fn test_update_does_not_retry_other_errors() {
        let client = FakeObjectClient::new();
        client.add(&node("worker-1"));
        client.fail(Op::Replace, "Node", 1, Failure::Internal);

        assert!(
            update_with_retry::<Node, _>(&client, &fast(), None, "worker-1", |_| {})
                .await
                .is_err()
        );
        assert_eq!(client.count(Op::Replace, "Node"), 1);
    }

    #[tokio::test]
    async fn test_poll_until_times_out() {
        let err = poll_until(
            Duration::from_millis(1),
            Duration::from_millis(10),
            "never",
            || async { Ok(false) },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }

    #[test]
    fn test_poll_until_stops_on_condition_error() {
        let calls = AtomicU32::new(0);
        let err = tokio_test::block_on(poll_until(
            Duration::from_millis(1),
            Duration::from_secs(1),
            "failing",
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<bool, _>(Error::ConfigError("boom".into())) }
            },
        ))
        .unwrap_err();

        assert!(matches!(err, Error::ConfigError(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_poll_until_succeeds_eventually() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        poll_until(
            Duration::from_millis(1),
            Duration::from_secs(1),
            "third poll",
            move || {
                let c = c.clone();
                async move { Ok(c.fetch_add(1, Ordering::SeqCst) >= 2) }
            },
        )
        .await
        .unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
