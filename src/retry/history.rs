//! Bounded attempt history and derived statistics.
//!
//! The history only feeds [`RetryStats`] and adaptive tuning; it never
//! influences whether an individual call is retried.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::ErrorCategory;
use crate::types::Provider;

/// One provider attempt as seen by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryAttempt {
    pub provider: Provider,
    /// 1-based.
    pub attempt_number: u32,
    pub timestamp: SystemTime,
    /// `None` for successful attempts.
    pub category: Option<ErrorCategory>,
    pub message: Option<String>,
    /// Sleep scheduled before the next attempt, if one follows.
    pub next_delay: Option<Duration>,
    pub success: bool,
}

/// Aggregate counters over the retained history of one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetryStats {
    pub attempts: usize,
    pub successes: usize,
    pub failures: usize,
    /// `successes / attempts`, 0 without attempts.
    pub success_rate: f64,
    pub by_category: BTreeMap<ErrorCategory, usize>,
}

/// Ring buffer of recent attempts across all providers; the oldest record
/// is dropped once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct AttemptHistory {
    capacity: usize,
    attempts: VecDeque<RetryAttempt>,
}

impl AttemptHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            attempts: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, attempt: RetryAttempt) {
        if self.attempts.len() == self.capacity {
            self.attempts.pop_front();
        }
        self.attempts.push_back(attempt);
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &RetryAttempt> {
        self.attempts.iter()
    }

    pub fn stats(&self, provider: Provider) -> RetryStats {
        let mut stats = RetryStats::default();
        for attempt in self.iter().filter(|a| a.provider == provider) {
            stats.attempts += 1;
            if attempt.success {
                stats.successes += 1;
            } else {
                stats.failures += 1;
            }
            if let Some(category) = attempt.category {
                *stats.by_category.entry(category).or_default() += 1;
            }
        }
        if stats.attempts > 0 {
            stats.success_rate = stats.successes as f64 / stats.attempts as f64;
        }
        stats
    }

    /// Success rate over the last `window` attempts for `provider`, or
    /// `None` with fewer than `min_samples` of them.
    pub fn recent_success_rate(&self, provider: Provider, window: usize, min_samples: usize) -> Option<f64> {
        let (total, ok) = self
            .attempts
            .iter()
            .rev()
            .filter(|a| a.provider == provider)
            .take(window)
            .fold((0usize, 0usize), |(total, ok), a| (total + 1, ok + usize::from(a.success)));
        if total == 0 || total < min_samples {
            return None;
        }
        Some(ok as f64 / total as f64)
    }
}
