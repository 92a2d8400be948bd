//! Retriable task execution
//!
//! Every store call made by the engine runs through a [`RetryExecutor`]:
//! retryable failures are retried with exponential backoff up to the policy's
//! attempt limit, each retry is announced to the registered listeners, and a
//! [`FaultInjector`] may force an attempt to fail before it reaches the store.

use crate::error::{Error, ErrorClass, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default number of attempts per task
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// Default delay before the first retry
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(300);
/// Default cap on the delay between retries
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(20);

/// Operation category, used for fault injection and retry events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Upload,
    Download,
    Copy,
    Delete,
    Metadata,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Download => "download",
            Self::Copy => "copy",
            Self::Delete => "delete",
            Self::Metadata => "metadata",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry limits and backoff
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for any delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }
}

impl RetryPolicy {
    /// Policy with the default backoff and the given attempt limit (at least 1)
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Default::default()
        }
    }

    /// Set the backoff bounds
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }

    /// Delay before retry number `retry` (1-based): doubles each time, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(31);
        self.initial_backoff
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }
}

/// Announced to listeners each time a failed attempt is about to be retried
#[derive(Clone, Debug)]
pub struct RetryEvent {
    pub operation: OperationKind,
    pub call_id: String,
    /// The attempt that just failed (1-based)
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: String,
}

/// Callback invoked for every retry
pub type RetryListener = Arc<dyn Fn(&RetryEvent) + Send + Sync>;

/// Shared, append-only set of retry listeners
#[derive(Clone, Default)]
pub struct RetryListeners {
    inner: Arc<RwLock<Vec<RetryListener>>>,
}

impl RetryListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener
    pub fn add(&self, listener: RetryListener) {
        self.inner.write().push(listener);
    }

    /// Notify every listener
    pub fn notify(&self, event: &RetryEvent) {
        for listener in self.inner.read().iter() {
            listener(event);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl fmt::Debug for RetryListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryListeners")
            .field("count", &self.len())
            .finish()
    }
}

/// Decides whether an attempt is forced to fail before it runs
pub trait FaultInjector: Send + Sync {
    /// Return true to fail this attempt with [`Error::AbortInjected`]
    fn should_abort(&self, kind: OperationKind, call_id: &str) -> bool;
}

/// Injector that never aborts
#[derive(Clone, Copy, Debug, Default)]
pub struct NoFaults;

impl FaultInjector for NoFaults {
    fn should_abort(&self, _kind: OperationKind, _call_id: &str) -> bool {
        false
    }
}

/// How abort counts are shared between calls
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AbortScope {
    /// Every call id gets its own budget of aborts
    #[default]
    PerCall,
    /// One budget shared by all calls of the operation kind
    Global,
}

#[derive(Debug)]
struct AbortBudget {
    count: u32,
    scope: AbortScope,
    remaining: HashMap<String, u32>,
}

/// Counter-based fault injector: the first N attempts of each call (or of
/// all calls, in global scope) of an operation kind are aborted.
#[derive(Debug, Default)]
pub struct AbortCounters {
    budgets: Mutex<HashMap<OperationKind, AbortBudget>>,
}

impl AbortCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort the first `count` attempts of `kind`, resetting any earlier state
    pub fn set(&self, kind: OperationKind, count: u32, scope: AbortScope) {
        self.budgets.lock().insert(
            kind,
            AbortBudget {
                count,
                scope,
                remaining: HashMap::new(),
            },
        );
    }

    /// Stop injecting aborts for `kind`
    pub fn clear(&self, kind: OperationKind) {
        self.budgets.lock().remove(&kind);
    }

    /// Aborts still pending for a call
    pub fn remaining(&self, kind: OperationKind, call_id: &str) -> u32 {
        let budgets = self.budgets.lock();
        match budgets.get(&kind) {
            Some(budget) => {
                let id = budget_id(budget.scope, call_id);
                budget.remaining.get(id).copied().unwrap_or(budget.count)
            }
            None => 0,
        }
    }
}

fn budget_id(scope: AbortScope, call_id: &str) -> &str {
    match scope {
        AbortScope::PerCall => call_id,
        AbortScope::Global => "",
    }
}

impl FaultInjector for AbortCounters {
    fn should_abort(&self, kind: OperationKind, call_id: &str) -> bool {
        let mut budgets = self.budgets.lock();
        let Some(budget) = budgets.get_mut(&kind) else {
            return false;
        };
        let count = budget.count;
        let id = budget_id(budget.scope, call_id).to_string();
        let remaining = budget.remaining.entry(id).or_insert(count);
        if *remaining == 0 {
            return false;
        }
        *remaining -= 1;
        true
    }
}

/// Identity of one retriable unit of work
#[derive(Clone, Debug)]
pub struct RetriableTask {
    pub kind: OperationKind,
    /// Groups the attempts of one logical call for per-call fault injection
    pub call_id: String,
    /// Skip fault injection, used for cleanup work
    pub ignore_abort_injection: bool,
}

impl RetriableTask {
    pub fn new(kind: OperationKind, call_id: impl Into<String>) -> Self {
        Self {
            kind,
            call_id: call_id.into(),
            ignore_abort_injection: false,
        }
    }

    pub fn ignore_abort_injection(mut self, ignore: bool) -> Self {
        self.ignore_abort_injection = ignore;
        self
    }
}

/// Runs tasks under a retry policy
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    listeners: RetryListeners,
    injector: Arc<dyn FaultInjector>,
}

impl fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("policy", &self.policy)
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            listeners: RetryListeners::new(),
            injector: Arc::new(NoFaults),
        }
    }

    pub fn with_fault_injector(mut self, injector: Arc<dyn FaultInjector>) -> Self {
        self.injector = injector;
        self
    }

    pub fn with_listeners(mut self, listeners: RetryListeners) -> Self {
        self.listeners = listeners;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn listeners(&self) -> &RetryListeners {
        &self.listeners
    }

    /// Run `operation` until it succeeds, fails fatally, or the attempt
    /// limit is reached. Exhaustion yields [`Error::RetriesExhausted`]
    /// wrapping the last error.
    pub async fn execute<T, F, Fut>(&self, task: &RetriableTask, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let outcome = if !task.ignore_abort_injection
                && self.injector.should_abort(task.kind, &task.call_id)
            {
                Err(Error::AbortInjected(task.kind))
            } else {
                operation().await
            };

            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(e) if e.class() == ErrorClass::Fatal => return Err(e),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                warn!(
                    kind = %task.kind,
                    call_id = %task.call_id,
                    attempts = attempt,
                    "Giving up: {}",
                    error
                );
                return Err(Error::RetriesExhausted {
                    attempts: attempt,
                    source: Box::new(error),
                });
            }

            let event = RetryEvent {
                operation: task.kind,
                call_id: task.call_id.clone(),
                attempt,
                max_attempts,
                error: error.to_string(),
            };
            self.listeners.notify(&event);

            let delay = self.policy.delay_for(attempt);
            debug!(
                kind = %task.kind,
                call_id = %task.call_id,
                attempt,
                ?delay,
                "Retrying after error: {}",
                error
            );
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudstore_store::StoreError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts).with_backoff(Duration::ZERO, Duration::ZERO)
    }

    fn counting_listener(executor: &RetryExecutor) -> Arc<AtomicU32> {
        let count = Arc::new(AtomicU32::new(0));
        let seen = count.clone();
        executor.listeners().add(Arc::new(move |_event: &RetryEvent| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        count
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(300));
        assert_eq!(policy.delay_for(2), Duration::from_millis(600));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1200));
        assert_eq!(policy.delay_for(20), Duration::from_secs(20));
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_aborts_below_limit_succeed() {
        let injector = Arc::new(AbortCounters::new());
        injector.set(OperationKind::Copy, 3, AbortScope::PerCall);
        let executor = RetryExecutor::new(fast_policy(10)).with_fault_injector(injector);
        let retries = counting_listener(&executor);

        let calls = AtomicU32::new(0);
        let calls = &calls;
        let task = RetriableTask::new(OperationKind::Copy, "s3://b/k");
        let result = executor
            .execute(&task, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(7)
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(retries.load(Ordering::SeqCst), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_aborts_at_limit_exhaust() {
        let injector = Arc::new(AbortCounters::new());
        injector.set(OperationKind::Copy, 10, AbortScope::PerCall);
        let executor = RetryExecutor::new(fast_policy(10)).with_fault_injector(injector);
        let retries = counting_listener(&executor);

        let task = RetriableTask::new(OperationKind::Copy, "s3://b/k");
        let err = executor
            .execute(&task, || async { Ok::<_, Error>(()) })
            .await
            .unwrap_err();

        assert!(matches!(err, Error::RetriesExhausted { attempts: 10, .. }));
        assert!(err.to_string().contains("forcing copy abort"));
        assert_eq!(retries.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn test_fatal_error_is_not_retried() {
        let executor = RetryExecutor::new(fast_policy(5));
        let retries = counting_listener(&executor);
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let task = RetriableTask::new(OperationKind::Delete, "id");
        let err = executor
            .execute(&task, || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(Error::usage("nope"))
            })
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "nope");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(retries.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transient_store_errors_are_retried() {
        let executor = RetryExecutor::new(fast_policy(5));
        let calls = AtomicU32::new(0);
        let calls = &calls;

        let task = RetriableTask::new(OperationKind::Upload, "id");
        let value = executor
            .execute(&task, || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Store(StoreError::Unavailable("busy".into())))
                } else {
                    Ok("done")
                }
            })
            .await
            .unwrap();

        assert_eq!(value, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_ignore_abort_injection() {
        let injector = Arc::new(AbortCounters::new());
        injector.set(OperationKind::Delete, 100, AbortScope::Global);
        let executor = RetryExecutor::new(fast_policy(2)).with_fault_injector(injector.clone());

        let task = RetriableTask::new(OperationKind::Delete, "cleanup").ignore_abort_injection(true);
        executor
            .execute(&task, || async { Ok::<_, Error>(()) })
            .await
            .unwrap();
        assert_eq!(injector.remaining(OperationKind::Delete, "cleanup"), 100);
    }

    #[test]
    fn test_abort_scopes() {
        let counters = AbortCounters::new();
        counters.set(OperationKind::Upload, 1, AbortScope::PerCall);
        assert!(counters.should_abort(OperationKind::Upload, "a"));
        assert!(!counters.should_abort(OperationKind::Upload, "a"));
        assert!(counters.should_abort(OperationKind::Upload, "b"));
        assert!(!counters.should_abort(OperationKind::Copy, "a"));

        counters.set(OperationKind::Upload, 1, AbortScope::Global);
        assert!(counters.should_abort(OperationKind::Upload, "a"));
        assert!(!counters.should_abort(OperationKind::Upload, "b"));

        counters.clear(OperationKind::Upload);
        assert_eq!(counters.remaining(OperationKind::Upload, "a"), 0);
    }
}
