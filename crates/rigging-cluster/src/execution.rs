//! Deferred, re-runnable computations and the retry discipline around them.
//!
//! An [`Execution`] wraps a zero-argument operation. Nothing runs when it is
//! created or composed; every call to [`Execution::execute`] runs the
//! operation from scratch, which is what makes poll-until-success loops
//! over cluster state meaningful.

use crate::{Error, Result};
use rigging_config::RetrySettings;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

type Operation<V> = Arc<dyn Fn() -> Result<V> + Send + Sync>;

/// A deferred computation that can be evaluated any number of times.
pub struct Execution<V> {
    operation: Operation<V>,
    label: Option<String>,
}

impl<V> Clone for Execution<V> {
    fn clone(&self) -> Self {
        Self {
            operation: Arc::clone(&self.operation),
            label: self.label.clone(),
        }
    }
}

impl<V> fmt::Debug for Execution<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Execution")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

impl<V: 'static> Execution<V> {
    /// Wraps `operation` without running it.
    pub fn new<F>(operation: F) -> Self
    where
        F: Fn() -> Result<V> + Send + Sync + 'static,
    {
        Self {
            operation: Arc::new(operation),
            label: None,
        }
    }

    /// An execution that always yields `value`.
    pub fn ready(value: V) -> Self
    where
        V: Clone + Send + Sync,
    {
        Self::new(move || Ok(value.clone()))
    }

    /// Attaches a human-readable description used in failures.
    pub fn labeled(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    fn description(&self) -> &str {
        self.label().unwrap_or("unlabeled execution")
    }

    /// Runs the operation once.
    pub fn execute(&self) -> Result<V> {
        (self.operation)()
    }

    /// Transforms the result of every future evaluation. The label is kept.
    pub fn map<U, F>(self, f: F) -> Execution<U>
    where
        U: 'static,
        F: Fn(V) -> U + Send + Sync + 'static,
    {
        let operation = self.operation;
        Execution {
            operation: Arc::new(move || operation().map(&f)),
            label: self.label,
        }
    }

    /// Evaluates until success, sleeping the calling thread between attempts.
    pub fn retry(&self, policy: &RetryPolicy) -> Result<V> {
        let attempts = policy.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.execute() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err(self.exhausted(attempts, e)),
                Err(e) => {
                    let delay = policy.delay_after(attempt);
                    tracing::debug!(
                        label = self.description(),
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "execution failed, retrying"
                    );
                    std::thread::sleep(delay);
                }
            }
        }
    }

    /// Evaluates until success, yielding to the runtime between attempts.
    pub async fn retry_async(&self, policy: &RetryPolicy) -> Result<V> {
        let attempts = policy.attempts();
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.execute() {
                Ok(value) => return Ok(value),
                Err(e) if attempt >= attempts => return Err(self.exhausted(attempts, e)),
                Err(e) => {
                    let delay = policy.delay_after(attempt);
                    tracing::debug!(
                        label = self.description(),
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "execution failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn exhausted(&self, attempts: u32, last: Error) -> Error {
        tracing::warn!(
            label = self.description(),
            attempts,
            error = %last,
            "giving up"
        );
        Error::RetriesExhausted {
            label: self.description().to_string(),
            attempts,
            last: Box::new(last),
        }
    }
}

impl Execution<bool> {
    /// Fails with [`Error::ConditionNotMet`] while the predicate is false,
    /// so the predicate itself can be polled with [`Execution::retry`].
    pub fn require(self) -> Execution<()> {
        let label = self.description().to_string();
        let operation = self.operation;
        Execution {
            operation: Arc::new(move || {
                if operation()? {
                    Ok(())
                } else {
                    Err(Error::ConditionNotMet {
                        label: label.clone(),
                    })
                }
            }),
            label: self.label,
        }
    }
}

/// How often, and how patiently, to re-evaluate an [`Execution`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    interval: Duration,
    max_interval: Duration,
}

impl RetryPolicy {
    /// `attempts` evaluations with a constant pause between them.
    pub fn fixed(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts,
            interval,
            max_interval: interval,
        }
    }

    /// Pause starts at `initial` and doubles after every failure, up to `max`.
    pub fn exponential(attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            attempts,
            interval: initial,
            max_interval: max.max(initial),
        }
    }

    /// Evaluate exactly once.
    pub fn once() -> Self {
        Self::fixed(1, Duration::ZERO)
    }

    /// Total number of evaluations, never less than one.
    pub fn attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Pause after the `attempt`-th failed evaluation (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.interval
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(self.max_interval)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self::exponential(
            settings.attempts,
            settings.interval(),
            settings.max_interval(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(fail_first: usize) -> (Execution<usize>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let execution = Execution::new(move || {
            let call = counter.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= fail_first {
                Err(anyhow::anyhow!("call {call} not ready").into())
            } else {
                Ok(call)
            }
        });
        (execution, calls)
    }

    #[test]
    fn test_creation_and_mapping_are_lazy() {
        let (execution, calls) = counting(0);
        let mapped = execution.map(|n| n * 10).labeled("tenfold");

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(mapped.execute().unwrap(), 10);
        assert_eq!(mapped.execute().unwrap(), 20);
        assert_eq!(mapped.label(), Some("tenfold"));
    }

    #[test]
    fn test_map_keeps_label() {
        let execution = Execution::ready(2).labeled("two").map(|n| n + 1);
        assert_eq!(execution.label(), Some("two"));
        assert_eq!(execution.execute().unwrap(), 3);
    }

    #[test]
    fn test_retry_until_success() {
        let (execution, calls) = counting(3);
        let value = execution
            .retry(&RetryPolicy::fixed(5, Duration::ZERO))
            .unwrap();

        assert_eq!(value, 4);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_retry_gives_up() {
        let (execution, calls) = counting(usize::MAX);
        let err = execution
            .labeled("broker ready")
            .retry(&RetryPolicy::fixed(3, Duration::ZERO))
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match err {
            Error::RetriesExhausted {
                label,
                attempts,
                last,
            } => {
                assert_eq!(label, "broker ready");
                assert_eq!(attempts, 3);
                assert!(last.to_string().contains("call 3 not ready"));
            }
            other => panic!("expected RetriesExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_async_waits_between_attempts() {
        let (execution, calls) = counting(2);
        let started = tokio::time::Instant::now();

        let value = execution
            .retry_async(&RetryPolicy::fixed(5, Duration::from_secs(1)))
            .await
            .unwrap();

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_require_turns_false_into_failure() {
        let flag = Arc::new(AtomicUsize::new(0));
        let probe = Arc::clone(&flag);
        let condition = Execution::new(move || Ok(probe.load(Ordering::SeqCst) > 0))
            .labeled("flag raised")
            .require();

        let err = condition.execute().unwrap_err();
        assert!(matches!(err, Error::ConditionNotMet { ref label } if label == "flag raised"));

        flag.store(1, Ordering::SeqCst);
        assert!(condition.execute().is_ok());
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy =
            RetryPolicy::exponential(10, Duration::from_millis(100), Duration::from_millis(500));

        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(40), Duration::from_millis(500));
    }

    #[test]
    fn test_policy_from_settings() {
        let policy = RetryPolicy::from(&RetrySettings {
            attempts: 4,
            interval_ms: 250,
            max_interval_ms: 250,
        });
        assert_eq!(policy, RetryPolicy::fixed(4, Duration::from_millis(250)));
        assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).attempts(), 1);
    }
}
