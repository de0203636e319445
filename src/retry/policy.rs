/// Generic retry state machine with eligibility filters and failure observers
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

type Filter<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;
type Observer<E> = Box<dyn Fn(&E, u32) + Send + Sync>;

/// Configuration for retrying a fallible operation.
///
/// A policy is immutable once built: the failed-attempt counter lives inside
/// each [`run`](RetryPolicy::run) / [`run_async`](RetryPolicy::run_async)
/// call, so a single policy value can drive any number of independent
/// executions, concurrently, each with the full attempt budget.
///
/// `max_attempts` counts *retries*: an operation that keeps failing with an
/// eligible failure is invoked `max_attempts + 1` times in total. A budget of
/// `0` disables the retry machinery entirely: the operation runs once and
/// any failure propagates untouched, without filters or observers firing.
/// Negative budgets and delays are unrepresentable (`u32` / `Duration`).
///
/// ```no_run
/// use std::time::Duration;
/// use aegis::RetryPolicy;
///
/// let policy: RetryPolicy<std::io::Error> = RetryPolicy::new(3, Duration::from_millis(250))
///     .filter(|e: &std::io::Error| e.kind() == std::io::ErrorKind::TimedOut)
///     .on_failure(|e, n| eprintln!("attempt {n} failed: {e}"));
///
/// let data = policy.run(|| std::fs::read("artifact.bin"))?;
/// # Ok::<_, std::io::Error>(())
/// ```
pub struct RetryPolicy<E> {
    max_attempts: u32,
    delay: Duration,
    filters: Vec<Filter<E>>,
    observers: Vec<Observer<E>>,
}

impl<E> RetryPolicy<E> {
    /// Create a policy with an empty filter and observer set.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            filters: Vec::new(),
            observers: Vec::new(),
        }
    }

    /// Maximum number of retries after the initial attempt.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait between attempts.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Register a predicate marking failures as eligible for retry.
    ///
    /// May be chained repeatedly; a failure is eligible if *any* registered
    /// predicate accepts it. With no predicates registered, every failure
    /// is eligible.
    pub fn filter<F>(mut self, pred: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.filters.push(Box::new(pred));
        self
    }

    /// Register a two-stage predicate: `narrow` selects the failure shape
    /// of interest, `refine` then decides over the narrowed value.
    ///
    /// Joins the same OR set as [`filter`](RetryPolicy::filter).
    pub fn filter_with<N, F, G>(mut self, narrow: F, refine: G) -> Self
    where
        N: ?Sized,
        F: Fn(&E) -> Option<&N> + Send + Sync + 'static,
        G: Fn(&N) -> bool + Send + Sync + 'static,
    {
        self.filters
            .push(Box::new(move |err| narrow(err).map(&refine).unwrap_or(false)));
        self
    }

    /// Register a callback invoked on every failed attempt, retryable or
    /// fatal, with the failure and the 1-based count of attempts that have
    /// failed so far. Observers run synchronously in registration order and
    /// cannot suppress or alter propagation.
    pub fn on_failure<F>(mut self, observer: F) -> Self
    where
        F: Fn(&E, u32) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
        self
    }

    fn is_eligible(&self, err: &E) -> bool {
        // No filters registered means every failure is retryable
        self.filters.is_empty() || self.filters.iter().any(|pred| pred(err))
    }

    /// Record a failed attempt: notify observers, then decide whether the
    /// budget and filters permit another try. `failed` is the 1-based count
    /// including this failure.
    fn register_failure(&self, err: &E, failed: u32) -> bool {
        for observer in &self.observers {
            observer(err, failed);
        }

        self.is_eligible(err) && failed <= self.max_attempts
    }

    /// Execute `operation`, blocking the calling thread through retries and
    /// backoff waits, until it succeeds, fails with an ineligible failure,
    /// or exhausts the budget. The failure handed back is always the one
    /// from the final invocation, untouched.
    pub fn run<T, Op>(&self, mut operation: Op) -> Result<T, E>
    where
        Op: FnMut() -> Result<T, E>,
        E: Display,
    {
        if self.max_attempts == 0 {
            return operation();
        }

        let mut failed = 0u32;
        loop {
            match operation() {
                Ok(value) => {
                    if failed > 0 {
                        debug!("Operation succeeded after {} failed attempts", failed);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    failed += 1;
                    if !self.register_failure(&err, failed) {
                        return Err(err);
                    }

                    warn!(
                        "Attempt {}/{} failed: {}. Retrying in {:?}",
                        failed,
                        self.max_attempts + 1,
                        err,
                        self.delay
                    );
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                }
            }
        }
    }

    /// Suspending variant of [`run`](RetryPolicy::run): identical decision
    /// logic, but the backoff wait is a timer suspension point and never
    /// blocks a worker thread. Attempts stay strictly sequential; the only
    /// suspension points are the backoff wait and whatever the operation
    /// itself awaits.
    pub async fn run_async<T, Fut, Op>(&self, mut operation: Op) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        if self.max_attempts == 0 {
            return operation().await;
        }

        let mut failed = 0u32;
        loop {
            match operation().await {
                Ok(value) => {
                    if failed > 0 {
                        debug!("Async operation succeeded after {} failed attempts", failed);
                    }
                    return Ok(value);
                }
                Err(err) => {
                    failed += 1;
                    if !self.register_failure(&err, failed) {
                        return Err(err);
                    }

                    warn!(
                        "Async attempt {}/{} failed: {}. Retrying in {:?}",
                        failed,
                        self.max_attempts + 1,
                        err,
                        self.delay
                    );
                    if !self.delay.is_zero() {
                        tokio::time::sleep(self.delay).await;
                    }
                }
            }
        }
    }
}
