//! Per-provider adaptive retry orchestration.
//!
//! [`RetryOrchestrator::execute_with_retry`] runs a provider call until it
//! succeeds, fails with a non-retryable [`ErrorCategory`], or exhausts the
//! provider's [`RetryPolicy`]. Between attempts it sleeps on the tokio
//! timer (other in-flight calls keep running) for an exponentially growing
//! delay, jittered from the injected [`RandomSource`] and scaled by the
//! provider's recent success rate.
//!
//! Every attempt is appended to a bounded [`AttemptHistory`]. The history
//! drives [`stats`](RetryOrchestrator::stats), delay scaling and the
//! explicit [`tune`](RetryOrchestrator::tune) operation; it never decides
//! whether the current call is retried.

mod classify;
mod history;
mod policy;

pub use classify::{ErrorCategory, categorize};
pub use history::{AttemptHistory, RetryAttempt, RetryStats};
pub use policy::{AdaptiveConfig, JITTER_FRACTION, RetryPolicy};

use policy::scale;

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, SystemTime};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::random::{RandomSource, StdRandom};
use crate::telemetry;
use crate::types::Provider;
use crate::{HuginnError, Result};

/// Default number of attempts kept in the history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Successful result of [`RetryOrchestrator::execute_with_retry`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryOutcome<T> {
    pub value: T,
    /// Attempts made, including the successful one.
    pub attempts: u32,
    /// Wall time across all attempts and sleeps.
    pub elapsed: Duration,
}

/// Shared retry executor holding one [`RetryPolicy`] per provider.
pub struct RetryOrchestrator {
    policies: RwLock<HashMap<Provider, RetryPolicy>>,
    adaptive: AdaptiveConfig,
    history: Mutex<AttemptHistory>,
    random: Arc<dyn RandomSource>,
}

impl Default for RetryOrchestrator {
    fn default() -> Self {
        Self::new(Arc::new(StdRandom::default()))
    }
}

impl RetryOrchestrator {
    /// Orchestrator with [`RetryPolicy::for_provider`] defaults.
    pub fn new(random: Arc<dyn RandomSource>) -> Self {
        let policies = Provider::ALL
            .into_iter()
            .map(|p| (p, RetryPolicy::for_provider(p)))
            .collect();
        Self {
            policies: RwLock::new(policies),
            adaptive: AdaptiveConfig::default(),
            history: Mutex::new(AttemptHistory::new(DEFAULT_HISTORY_CAPACITY)),
            random,
        }
    }

    /// Replace the policy for one provider.
    pub fn with_policy(self, provider: Provider, policy: RetryPolicy) -> Self {
        self.set_policy(provider, policy);
        self
    }

    pub fn with_adaptive(mut self, adaptive: AdaptiveConfig) -> Self {
        self.adaptive = adaptive;
        self
    }

    pub fn with_history_capacity(self, capacity: usize) -> Self {
        Self {
            history: Mutex::new(AttemptHistory::new(capacity)),
            ..self
        }
    }

    pub fn policy(&self, provider: Provider) -> RetryPolicy {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&provider)
            .cloned()
            .unwrap_or_else(|| RetryPolicy::for_provider(provider))
    }

    pub fn set_policy(&self, provider: Provider, policy: RetryPolicy) {
        self.policies
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(provider, policy);
    }

    pub fn adaptive(&self) -> &AdaptiveConfig {
        &self.adaptive
    }

    fn history_lock(&self) -> MutexGuard<'_, AttemptHistory> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the retained attempt history, oldest first.
    pub fn history(&self) -> Vec<RetryAttempt> {
        self.history_lock().iter().cloned().collect()
    }

    pub fn stats(&self, provider: Provider) -> RetryStats {
        self.history_lock().stats(provider)
    }

    /// Success rate over the adaptive window, `None` below the minimum
    /// sample size.
    pub fn recent_success_rate(&self, provider: Provider) -> Option<f64> {
        self.history_lock()
            .recent_success_rate(provider, self.adaptive.window, self.adaptive.min_samples)
    }

    /// Adjust the provider's initial delay from its recent success rate.
    ///
    /// A poor rate grows the delay (capped at `max_delay`), an excellent one
    /// shrinks it (floored at [`AdaptiveConfig::min_initial_delay`]).
    /// Returns the updated policy, or `None` when nothing changed.
    pub fn tune(&self, provider: Provider) -> Option<RetryPolicy> {
        let rate = self.recent_success_rate(provider)?;
        let a = &self.adaptive;
        let mut policies = self.policies.write().unwrap_or_else(PoisonError::into_inner);
        let policy = policies
            .entry(provider)
            .or_insert_with(|| RetryPolicy::for_provider(provider));

        let current = policy.initial_delay;
        let tuned = if rate < a.low_success_rate {
            scale(current, a.tune_grow_factor).min(policy.max_delay)
        } else if rate > a.tune_high_success_rate {
            scale(current, a.tune_shrink_factor).max(a.min_initial_delay.min(current))
        } else {
            current
        };
        if tuned == current {
            return None;
        }

        policy.initial_delay = tuned;
        info!(
            provider = %provider,
            success_rate = rate,
            from_ms = current.as_millis() as u64,
            to_ms = tuned.as_millis() as u64,
            "retry policy tuned"
        );
        Some(policy.clone())
    }

    /// Run `op` under the provider's policy.
    ///
    /// On final failure returns [`HuginnError::RetryFailed`] wrapping the
    /// last provider error with its category, the attempt count and the
    /// elapsed time.
    pub async fn execute_with_retry<F, Fut, T>(&self, provider: Provider, op: F) -> Result<RetryOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_with_retry_cancellable(provider, &CancellationToken::new(), op)
            .await
    }

    /// [`execute_with_retry`](Self::execute_with_retry) that gives up with
    /// [`HuginnError::Cancelled`] once `cancel` fires: checked before every
    /// attempt and raced against every backoff sleep.
    pub async fn execute_with_retry_cancellable<F, Fut, T>(
        &self,
        provider: Provider,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<RetryOutcome<T>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let policy = self.policy(provider);
        let budget = policy.attempt_budget();
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                debug!(provider = %provider, attempt, "cancelled before attempt");
                return Err(HuginnError::Cancelled);
            }
            attempt += 1;

            let error = match op().await {
                Ok(value) => {
                    self.record(provider, attempt, None, None, true);
                    return Ok(RetryOutcome {
                        value,
                        attempts: attempt,
                        elapsed: start.elapsed(),
                    });
                }
                Err(HuginnError::Cancelled) => return Err(HuginnError::Cancelled),
                Err(e) => e,
            };

            let category = categorize(provider, &error);
            if category == ErrorCategory::Unknown {
                warn!(provider = %provider, error = %error, "unclassified provider error");
            }

            if attempt >= budget || !policy.should_retry(category) {
                self.record(provider, attempt, Some((category, &error)), None, false);
                debug!(
                    provider = %provider,
                    attempt,
                    category = %category,
                    "giving up"
                );
                return Err(HuginnError::RetryFailed {
                    category,
                    attempts: attempt,
                    elapsed: start.elapsed(),
                    source: Box::new(error),
                });
            }

            let delay = self.next_delay(provider, &policy, attempt, error.retry_after());
            self.record(provider, attempt, Some((category, &error)), Some(delay), false);
            metrics::counter!(telemetry::RETRIES_TOTAL,
                "provider" => provider.as_str(),
                "category" => category.as_str(),
            )
            .increment(1);
            warn!(
                provider = %provider,
                attempt,
                max_attempts = budget,
                category = %category,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying after transient error"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(provider = %provider, attempt, "cancelled during backoff");
                    return Err(HuginnError::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Delay before the attempt following failed attempt `attempt`.
    fn next_delay(
        &self,
        provider: Provider,
        policy: &RetryPolicy,
        attempt: u32,
        retry_after: Option<Duration>,
    ) -> Duration {
        let mut delay = policy.delay_for_attempt(attempt);
        if policy.jitter {
            let offset = (self.random.next_f64() * 2.0 - 1.0) * JITTER_FRACTION;
            delay = scale(delay, 1.0 + offset);
        }

        if let Some(rate) = self.recent_success_rate(provider) {
            if rate < self.adaptive.low_success_rate {
                delay = scale(delay, self.adaptive.slow_down_factor);
            } else if rate > self.adaptive.high_success_rate && attempt == 1 {
                delay = scale(delay, self.adaptive.speed_up_factor);
            }
        }

        if let Some(hint) = retry_after {
            delay = delay.max(hint);
        }
        delay.min(policy.max_delay)
    }

    fn record(
        &self,
        provider: Provider,
        attempt_number: u32,
        failure: Option<(ErrorCategory, &HuginnError)>,
        next_delay: Option<Duration>,
        success: bool,
    ) {
        self.history_lock().record(RetryAttempt {
            provider,
            attempt_number,
            timestamp: SystemTime::now(),
            category: failure.map(|(c, _)| c),
            message: failure.map(|(_, e)| e.to_string()),
            next_delay,
            success,
        });
    }
}
