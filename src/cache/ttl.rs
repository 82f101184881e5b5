//! Dynamic time-to-live for cache entries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{RequestClassification, RequestType};

/// Per-request-type TTL multipliers.
///
/// Factual answers stay valid longer than creative output, which users
/// usually want regenerated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TtlMultipliers {
    pub question: f64,
    pub task: f64,
    pub analysis: f64,
    pub conversation: f64,
    pub creative: f64,
    /// Extra factor per complexity step above 1.
    pub complexity_step: f64,
    /// Applied when any side-context backed the answer.
    pub with_context: f64,
}

impl Default for TtlMultipliers {
    fn default() -> Self {
        Self {
            question: 2.0,
            task: 1.5,
            analysis: 1.5,
            conversation: 0.5,
            creative: 0.25,
            complexity_step: 0.1,
            with_context: 0.5,
        }
    }
}

impl TtlMultipliers {
    fn for_type(&self, request_type: RequestType) -> f64 {
        match request_type {
            RequestType::Question => self.question,
            RequestType::Task => self.task,
            RequestType::Analysis => self.analysis,
            RequestType::Conversation => self.conversation,
            RequestType::Creative => self.creative,
        }
    }
}

/// `base × type × complexity × context`, clamped to `[min, max]`.
#[derive(Debug, Clone, PartialEq)]
pub struct TtlPolicy {
    pub base: Duration,
    pub min: Duration,
    pub max: Duration,
    pub multipliers: TtlMultipliers,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60 * 60),
            min: Duration::from_secs(5 * 60),
            max: Duration::from_secs(24 * 60 * 60),
            multipliers: TtlMultipliers::default(),
        }
    }
}

impl TtlPolicy {
    /// TTL for a response to a request with this classification.
    pub fn ttl_for(&self, classification: &RequestClassification) -> Duration {
        let m = &self.multipliers;
        let complexity = f64::from(classification.complexity.max(1) - 1);
        let mut factor = m.for_type(classification.request_type) * (1.0 + m.complexity_step * complexity);
        if classification.context.any() {
            factor *= m.with_context;
        }
        let factor = if factor.is_finite() { factor.max(0.0) } else { 0.0 };
        self.clamp(self.base.mul_f64(factor))
    }

    /// Clamp an explicit TTL into the legal range.
    pub fn clamp(&self, ttl: Duration) -> Duration {
        ttl.clamp(self.min, self.max.max(self.min))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContextFlags, DesiredLength};

    fn classification(request_type: RequestType, complexity: u8, context: ContextFlags) -> RequestClassification {
        RequestClassification {
            request_type,
            complexity,
            desired_length: DesiredLength::Medium,
            language: "en".into(),
            context,
        }
    }

    #[test]
    fn question_at_base_complexity_doubles_base() {
        let policy = TtlPolicy::default();
        let ttl = policy.ttl_for(&classification(RequestType::Question, 1, ContextFlags::default()));
        assert_eq!(ttl, Duration::from_secs(2 * 60 * 60));
    }

    #[test]
    fn creative_expires_before_factual() {
        let policy = TtlPolicy::default();
        let none = ContextFlags::default();
        for complexity in 1..=5 {
            let creative = policy.ttl_for(&classification(RequestType::Creative, complexity, none));
            for factual in [RequestType::Question, RequestType::Task, RequestType::Analysis] {
                assert!(creative < policy.ttl_for(&classification(factual, complexity, none)));
            }
        }
    }

    #[test]
    fn context_shortens_ttl() {
        let policy = TtlPolicy::default();
        let with = ContextFlags::new().web(true);
        let without = ContextFlags::default();
        for t in [RequestType::Question, RequestType::Task, RequestType::Analysis] {
            assert!(
                policy.ttl_for(&classification(t, 3, with)) < policy.ttl_for(&classification(t, 3, without))
            );
        }
    }

    #[test]
    fn ttl_never_below_minimum() {
        let policy = TtlPolicy {
            base: Duration::from_secs(1),
            ..TtlPolicy::default()
        };
        let ttl = policy.ttl_for(&classification(RequestType::Creative, 1, ContextFlags::new().images(true)));
        assert_eq!(ttl, policy.min);
    }

    #[test]
    fn ttl_never_above_maximum() {
        let policy = TtlPolicy {
            base: Duration::from_secs(365 * 24 * 60 * 60),
            ..TtlPolicy::default()
        };
        let ttl = policy.ttl_for(&classification(RequestType::Question, 5, ContextFlags::default()));
        assert_eq!(ttl, policy.max);
    }

    #[test]
    fn explicit_ttl_is_clamped() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.clamp(Duration::from_secs(1)), policy.min);
        assert_eq!(policy.clamp(Duration::from_secs(600)), Duration::from_secs(600));
    }
}
