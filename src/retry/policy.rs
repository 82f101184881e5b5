//! Per-provider retry policies.

use std::collections::BTreeSet;
use std::time::Duration;

use super::ErrorCategory;
use crate::types::Provider;

/// Symmetric jitter applied to backoff delays, as a fraction of the delay.
pub const JITTER_FRACTION: f64 = 0.1;

/// Backoff and retryability rules for one provider.
///
/// ```rust
/// # use huginn::RetryPolicy;
/// # use std::time::Duration;
/// let policy = RetryPolicy::new()
///     .max_retries(5)
///     .initial_delay(Duration::from_millis(200))
///     .jitter(false);
/// assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one.
    /// 1 = no retry. Default: 3.
    pub max_retries: u32,
    /// Delay before the second attempt. Default: 1s.
    pub initial_delay: Duration,
    /// Growth factor between successive delays. Default: 2.0.
    pub backoff_multiplier: f64,
    /// Upper bound for any single delay. Default: 30s.
    pub max_delay: Duration,
    /// ±10% random jitter on every delay. Default: true.
    pub jitter: bool,
    pub retryable: BTreeSet<ErrorCategory>,
    /// Wins over `retryable` when a category is in both.
    pub non_retryable: BTreeSet<ErrorCategory>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            jitter: true,
            retryable: ErrorCategory::default_retryable().iter().copied().collect(),
            non_retryable: ErrorCategory::default_non_retryable().iter().copied().collect(),
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults tuned to each provider's rate-limit behaviour.
    pub fn for_provider(provider: Provider) -> Self {
        match provider {
            // Gemini's free tier rate-limits aggressively but recovers fast.
            Provider::Gemini => Self::new()
                .max_retries(4)
                .initial_delay(Duration::from_millis(1000))
                .max_delay(Duration::from_secs(30)),
            Provider::OpenAi => Self::new()
                .max_retries(3)
                .initial_delay(Duration::from_millis(1000))
                .max_delay(Duration::from_secs(20)),
            Provider::Mistral => Self::new()
                .max_retries(3)
                .initial_delay(Duration::from_millis(1500))
                .backoff_multiplier(1.5)
                .max_delay(Duration::from_secs(15)),
        }
    }

    /// Single attempt, never retried.
    pub fn disabled() -> Self {
        Self {
            max_retries: 1,
            ..Self::default()
        }
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn jitter(mut self, enabled: bool) -> Self {
        self.jitter = enabled;
        self
    }

    pub fn retryable(mut self, categories: impl IntoIterator<Item = ErrorCategory>) -> Self {
        self.retryable = categories.into_iter().collect();
        self
    }

    pub fn non_retryable(mut self, categories: impl IntoIterator<Item = ErrorCategory>) -> Self {
        self.non_retryable = categories.into_iter().collect();
        self
    }

    /// Attempts actually allowed; a zero budget still makes one attempt.
    pub fn attempt_budget(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn should_retry(&self, category: ErrorCategory) -> bool {
        self.retryable.contains(&category) && !self.non_retryable.contains(&category)
    }

    /// Backoff after failed attempt `attempt` (1-based), before jitter and
    /// adaptive scaling: `initial_delay * multiplier^(attempt - 1)`, capped
    /// at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        let secs = self.initial_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_nanos((secs.max(0.0) * 1e9).round() as u64)
    }
}

/// `d * factor`, rounded to the nanosecond. Negative or NaN factors yield zero.
pub(crate) fn scale(d: Duration, factor: f64) -> Duration {
    let nanos = d.as_nanos() as f64 * factor;
    if nanos.is_nan() || nanos <= 0.0 {
        Duration::ZERO
    } else if nanos >= u64::MAX as f64 {
        Duration::from_nanos(u64::MAX)
    } else {
        Duration::from_nanos(nanos.round() as u64)
    }
}

/// Thresholds for success-rate-driven delay scaling and policy tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct AdaptiveConfig {
    /// Recent attempts considered per provider. Default: 20.
    pub window: usize,
    /// Below this many samples no adjustment happens. Default: 5.
    pub min_samples: usize,
    /// Success rate under which delays grow. Default: 0.3.
    pub low_success_rate: f64,
    /// Success rate over which the first retry delay shrinks. Default: 0.8.
    pub high_success_rate: f64,
    /// Default: 1.5.
    pub slow_down_factor: f64,
    /// Default: 0.7.
    pub speed_up_factor: f64,
    /// Success rate over which [`tune`](super::RetryOrchestrator::tune)
    /// shrinks the initial delay. Default: 0.9.
    pub tune_high_success_rate: f64,
    /// Default: 1.5.
    pub tune_grow_factor: f64,
    /// Default: 0.8.
    pub tune_shrink_factor: f64,
    /// Floor for a tuned initial delay. Default: 100ms.
    pub min_initial_delay: Duration,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            window: 20,
            min_samples: 5,
            low_success_rate: 0.3,
            high_success_rate: 0.8,
            slow_down_factor: 1.5,
            speed_up_factor: 0.7,
            tune_high_success_rate: 0.9,
            tune_grow_factor: 1.5,
            tune_shrink_factor: 0.8,
            min_initial_delay: Duration::from_millis(100),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_geometrically_until_capped() {
        let policy = RetryPolicy::new()
            .initial_delay(Duration::from_millis(100))
            .backoff_multiplier(2.0)
            .max_delay(Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn delays_never_decrease() {
        for provider in Provider::ALL {
            let policy = RetryPolicy::for_provider(provider);
            let mut prev = Duration::ZERO;
            for attempt in 1..=40 {
                let delay = policy.delay_for_attempt(attempt);
                assert!(delay >= prev);
                assert!(delay <= policy.max_delay);
                prev = delay;
            }
        }
    }

    #[test]
    fn shrinking_multiplier_is_treated_as_constant_backoff() {
        let policy = RetryPolicy::new().backoff_multiplier(0.5);
        assert_eq!(policy.delay_for_attempt(3), policy.initial_delay);
    }

    #[test]
    fn non_retryable_wins() {
        let policy = RetryPolicy::new()
            .retryable([ErrorCategory::RateLimited, ErrorCategory::Unknown])
            .non_retryable([ErrorCategory::Unknown]);
        assert!(policy.should_retry(ErrorCategory::RateLimited));
        assert!(!policy.should_retry(ErrorCategory::Unknown));
        assert!(!policy.should_retry(ErrorCategory::Timeout));
    }

    #[test]
    fn provider_defaults_differ() {
        let gemini = RetryPolicy::for_provider(Provider::Gemini);
        let mistral = RetryPolicy::for_provider(Provider::Mistral);
        assert_eq!(gemini.max_retries, 4);
        assert_eq!(mistral.backoff_multiplier, 1.5);
        assert!(!gemini.should_retry(ErrorCategory::Unauthorized));
    }

    #[test]
    fn zero_budget_still_attempts_once() {
        assert_eq!(RetryPolicy::new().max_retries(0).attempt_budget(), 1);
    }
}
