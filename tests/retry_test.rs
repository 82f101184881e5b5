use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use huginn::random::{FixedRandom, StdRandom};
use huginn::{ErrorCategory, HuginnError, Provider, Result, RetryOrchestrator, RetryPolicy};

/// Fails with `fail_with` for the first `failures` calls, then succeeds.
struct FailThenSucceed {
    failures: u32,
    fail_with: fn() -> HuginnError,
    calls: AtomicU32,
}

impl FailThenSucceed {
    fn new(failures: u32, fail_with: fn() -> HuginnError) -> Self {
        Self {
            failures,
            fail_with,
            calls: AtomicU32::new(0),
        }
    }

    async fn call(&self) -> Result<&'static str> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n < self.failures {
            Err((self.fail_with)())
        } else {
            Ok("ok")
        }
    }

    fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

fn server_error() -> HuginnError {
    HuginnError::Api {
        status: 503,
        message: "service unavailable".into(),
    }
}

fn unauthorized() -> HuginnError {
    HuginnError::Api {
        status: 401,
        message: "invalid api key".into(),
    }
}

fn orchestrator(policy: RetryPolicy) -> RetryOrchestrator {
    RetryOrchestrator::new(Arc::new(StdRandom::seeded(7))).with_policy(Provider::Gemini, policy)
}

// ============================================================================
// Success after transient failures
// ============================================================================

#[tokio::test(start_paused = true)]
async fn two_rate_limits_then_success() {
    let initial = Duration::from_millis(1000);
    let retry = orchestrator(
        RetryPolicy::new()
            .max_retries(3)
            .initial_delay(initial)
            .backoff_multiplier(2.0)
            .jitter(false),
    );
    let op = FailThenSucceed::new(2, || HuginnError::RateLimited { retry_after: None });

    let start = Instant::now();
    let outcome = retry
        .execute_with_retry(Provider::Gemini, || op.call())
        .await
        .unwrap();

    assert_eq!(outcome.value, "ok");
    assert_eq!(outcome.attempts, 3);
    assert_eq!(op.call_count(), 3);
    assert!(start.elapsed() >= initial + initial * 2);
    assert!(outcome.elapsed >= Duration::from_millis(3000));

    let stats = retry.stats(Provider::Gemini);
    assert_eq!(stats.attempts, 3);
    assert_eq!(stats.successes, 1);
    assert_eq!(stats.by_category.get(&ErrorCategory::RateLimited), Some(&2));
}

#[tokio::test(start_paused = true)]
async fn rate_limit_hint_extends_the_delay() {
    let retry = orchestrator(
        RetryPolicy::new()
            .initial_delay(Duration::from_millis(100))
            .jitter(false),
    );
    let op = FailThenSucceed::new(1, || HuginnError::RateLimited {
        retry_after: Some(Duration::from_secs(5)),
    });

    let start = Instant::now();
    retry
        .execute_with_retry(Provider::Gemini, || op.call())
        .await
        .unwrap();

    assert!(start.elapsed() >= Duration::from_secs(5));
    let history = retry.history();
    assert_eq!(history[0].next_delay, Some(Duration::from_secs(5)));
}

// ============================================================================
// Giving up
// ============================================================================

#[tokio::test(start_paused = true)]
async fn unauthorized_is_surfaced_immediately() {
    let retry = orchestrator(RetryPolicy::new().max_retries(5));
    let op = FailThenSucceed::new(10, unauthorized);

    let start = Instant::now();
    let err = retry
        .execute_with_retry(Provider::Gemini, || op.call())
        .await
        .unwrap_err();

    assert_eq!(op.call_count(), 1);
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(err.category(), Some(ErrorCategory::Unauthorized));
    assert_eq!(err.attempts(), Some(1));
    assert!(matches!(err.root(), HuginnError::Api { status: 401, .. }));
}

#[tokio::test(start_paused = true)]
async fn attempts_never_exceed_the_budget() {
    for max_retries in [0, 1, 2, 4] {
        let retry = orchestrator(
            RetryPolicy::new()
                .max_retries(max_retries)
                .initial_delay(Duration::from_millis(10)),
        );
        let op = FailThenSucceed::new(u32::MAX, server_error);

        let err = retry
            .execute_with_retry(Provider::Gemini, || op.call())
            .await
            .unwrap_err();

        let expected = max_retries.max(1);
        assert_eq!(op.call_count(), expected, "max_retries = {max_retries}");
        assert_eq!(err.attempts(), Some(expected));
        assert_eq!(err.category(), Some(ErrorCategory::ServerError));
    }
}

#[tokio::test(start_paused = true)]
async fn unclassified_errors_are_not_retried() {
    let retry = orchestrator(RetryPolicy::new());
    let op = FailThenSucceed::new(1, || HuginnError::Persistence("disk full".into()));

    let err = retry
        .execute_with_retry(Provider::Gemini, || op.call())
        .await
        .unwrap_err();

    assert_eq!(err.category(), Some(ErrorCategory::Unknown));
    assert_eq!(op.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn custom_retryable_set_is_honoured() {
    let retry = orchestrator(
        RetryPolicy::new()
            .retryable([ErrorCategory::Unauthorized])
            .non_retryable([])
            .initial_delay(Duration::from_millis(10)),
    );
    let op = FailThenSucceed::new(1, unauthorized);

    let outcome = retry
        .execute_with_retry(Provider::Gemini, || op.call())
        .await
        .unwrap();
    assert_eq!(outcome.attempts, 2);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test(start_paused = true)]
async fn cancel_during_backoff_stops_retrying() {
    let retry = Arc::new(orchestrator(
        RetryPolicy::new()
            .max_retries(5)
            .initial_delay(Duration::from_secs(10))
            .jitter(false),
    ));
    let op = Arc::new(FailThenSucceed::new(u32::MAX, server_error));
    let token = CancellationToken::new();

    let task = {
        let (retry, op, token) = (retry.clone(), op.clone(), token.clone());
        tokio::spawn(async move {
            retry
                .execute_with_retry_cancellable(Provider::Gemini, &token, || op.call())
                .await
                .map(|o| o.value)
        })
    };

    tokio::time::sleep(Duration::from_secs(1)).await;
    token.cancel();
    let err = task.await.unwrap().unwrap_err();

    assert!(matches!(err, HuginnError::Cancelled));
    assert_eq!(op.call_count(), 1);
}

// ============================================================================
// Adaptive behaviour
// ============================================================================

#[tokio::test(start_paused = true)]
async fn poor_recent_success_rate_slows_retries_down() {
    let policy = RetryPolicy::new()
        .max_retries(1)
        .initial_delay(Duration::from_millis(100))
        .jitter(false);
    let retry = RetryOrchestrator::new(Arc::new(FixedRandom(0.5)))
        .with_policy(Provider::Gemini, policy.clone());

    for _ in 0..6 {
        let op = FailThenSucceed::new(1, server_error);
        let _ = retry.execute_with_retry(Provider::Gemini, || op.call()).await;
    }
    assert_eq!(retry.recent_success_rate(Provider::Gemini), Some(0.0));

    retry.set_policy(Provider::Gemini, policy.max_retries(2));
    let op = FailThenSucceed::new(1, server_error);
    retry
        .execute_with_retry(Provider::Gemini, || op.call())
        .await
        .unwrap();

    let last_failure = retry
        .history()
        .into_iter()
        .rev()
        .find(|a| !a.success)
        .unwrap();
    assert_eq!(last_failure.next_delay, Some(Duration::from_millis(150)));
}

#[tokio::test(start_paused = true)]
async fn tune_backs_off_a_struggling_provider() {
    let retry = orchestrator(RetryPolicy::new().max_retries(1).jitter(false));
    let before = retry.policy(Provider::Gemini);
    assert_eq!(retry.tune(Provider::Gemini), None);

    for _ in 0..6 {
        let op = FailThenSucceed::new(1, server_error);
        let _ = retry.execute_with_retry(Provider::Gemini, || op.call()).await;
    }

    let tuned = retry.tune(Provider::Gemini).unwrap();
    assert_eq!(tuned.initial_delay, before.initial_delay.mul_f64(1.5));
    assert_eq!(tuned.max_retries, before.max_retries);
    assert_eq!(retry.policy(Provider::Gemini), tuned);
}
