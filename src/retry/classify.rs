//! Error taxonomy and per-provider error classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::HuginnError;
use crate::types::Provider;

/// Retry-relevant category of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    RateLimited,
    ServerError,
    Timeout,
    NetworkError,
    Unauthorized,
    QuotaExceeded,
    BadRequest,
    Unknown,
}

impl ErrorCategory {
    pub const ALL: [ErrorCategory; 8] = [
        ErrorCategory::RateLimited,
        ErrorCategory::ServerError,
        ErrorCategory::Timeout,
        ErrorCategory::NetworkError,
        ErrorCategory::Unauthorized,
        ErrorCategory::QuotaExceeded,
        ErrorCategory::BadRequest,
        ErrorCategory::Unknown,
    ];

    /// Metric/log label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::RateLimited => "rate_limited",
            ErrorCategory::ServerError => "server_error",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::NetworkError => "network_error",
            ErrorCategory::Unauthorized => "unauthorized",
            ErrorCategory::QuotaExceeded => "quota_exceeded",
            ErrorCategory::BadRequest => "bad_request",
            ErrorCategory::Unknown => "unknown",
        }
    }

    /// Transient failures worth another attempt.
    pub const fn default_retryable() -> &'static [ErrorCategory] {
        &[
            ErrorCategory::RateLimited,
            ErrorCategory::ServerError,
            ErrorCategory::Timeout,
            ErrorCategory::NetworkError,
        ]
    }

    /// Failures surfaced immediately. `Unknown` is here on purpose: an
    /// unrecognised failure is not retried until it has been classified.
    pub const fn default_non_retryable() -> &'static [ErrorCategory] {
        &[
            ErrorCategory::Unauthorized,
            ErrorCategory::QuotaExceeded,
            ErrorCategory::BadRequest,
            ErrorCategory::Unknown,
        ]
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorize a provider error.
///
/// Status codes take precedence; message substrings fill in for
/// transport-level errors and for providers that overload a status (both
/// OpenAI and Gemini report exhausted billing quota as a 429).
pub fn categorize(provider: Provider, error: &HuginnError) -> ErrorCategory {
    match error.root() {
        HuginnError::RateLimited { .. } => ErrorCategory::RateLimited,
        HuginnError::Timeout(_) => ErrorCategory::Timeout,
        HuginnError::Http(msg) => {
            let msg = msg.to_lowercase();
            if mentions_timeout(&msg) {
                ErrorCategory::Timeout
            } else {
                ErrorCategory::NetworkError
            }
        }
        HuginnError::Api { status, message } => categorize_api(provider, *status, message),
        HuginnError::Stream(msg) => categorize_message(&msg.to_lowercase()),
        HuginnError::EmptyResponse => ErrorCategory::ServerError,
        HuginnError::InvalidInput(_) => ErrorCategory::BadRequest,
        _ => ErrorCategory::Unknown,
    }
}

fn categorize_api(provider: Provider, status: u16, message: &str) -> ErrorCategory {
    let msg = message.to_lowercase();
    match (provider, status) {
        (Provider::OpenAi, 429) if msg.contains("insufficient_quota") => ErrorCategory::QuotaExceeded,
        (Provider::Gemini, 429) if msg.contains("billing") => ErrorCategory::QuotaExceeded,
        (Provider::Gemini, 400) if msg.contains("api_key_invalid") || msg.contains("api key not valid") => {
            ErrorCategory::Unauthorized
        }
        (_, 429) => ErrorCategory::RateLimited,
        (_, 401 | 403) => ErrorCategory::Unauthorized,
        (_, 402) => ErrorCategory::QuotaExceeded,
        (_, 408 | 504) => ErrorCategory::Timeout,
        (_, 400 | 404 | 413 | 422) => ErrorCategory::BadRequest,
        (_, 500..=599) => ErrorCategory::ServerError,
        _ => categorize_message(&msg),
    }
}

/// Fallback on the lowercased message alone.
fn categorize_message(msg: &str) -> ErrorCategory {
    if msg.contains("rate limit") || msg.contains("too many requests") {
        ErrorCategory::RateLimited
    } else if msg.contains("quota") || msg.contains("billing") {
        ErrorCategory::QuotaExceeded
    } else if msg.contains("unauthorized")
        || msg.contains("invalid api key")
        || msg.contains("api key not valid")
    {
        ErrorCategory::Unauthorized
    } else if mentions_timeout(msg) {
        ErrorCategory::Timeout
    } else if ["network", "connection", "dns", "fetch failed"]
        .iter()
        .any(|m| msg.contains(m))
    {
        ErrorCategory::NetworkError
    } else {
        ErrorCategory::Unknown
    }
}

fn mentions_timeout(msg: &str) -> bool {
    msg.contains("timeout") || msg.contains("timed out") || msg.contains("deadline")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(status: u16, message: &str) -> HuginnError {
        HuginnError::Api {
            status,
            message: message.into(),
        }
    }

    #[test]
    fn status_codes() {
        for provider in Provider::ALL {
            assert_eq!(categorize(provider, &api(429, "slow down")), ErrorCategory::RateLimited);
            assert_eq!(categorize(provider, &api(401, "")), ErrorCategory::Unauthorized);
            assert_eq!(categorize(provider, &api(403, "")), ErrorCategory::Unauthorized);
            assert_eq!(categorize(provider, &api(400, "bad")), ErrorCategory::BadRequest);
            assert_eq!(categorize(provider, &api(503, "")), ErrorCategory::ServerError);
            assert_eq!(categorize(provider, &api(504, "")), ErrorCategory::Timeout);
        }
    }

    #[test]
    fn provider_specific_quota_signals() {
        let openai = api(429, "You exceeded your current quota (insufficient_quota)");
        assert_eq!(categorize(Provider::OpenAi, &openai), ErrorCategory::QuotaExceeded);
        assert_eq!(categorize(Provider::Mistral, &openai), ErrorCategory::RateLimited);

        let gemini = api(429, "Quota exceeded, check your plan and billing details");
        assert_eq!(categorize(Provider::Gemini, &gemini), ErrorCategory::QuotaExceeded);
    }

    #[test]
    fn gemini_invalid_key_is_unauthorized() {
        let err = api(400, "API key not valid. Please pass a valid API key. [API_KEY_INVALID]");
        assert_eq!(categorize(Provider::Gemini, &err), ErrorCategory::Unauthorized);
        assert_eq!(categorize(Provider::OpenAi, &err), ErrorCategory::BadRequest);
    }

    #[test]
    fn transport_errors() {
        assert_eq!(
            categorize(Provider::Gemini, &HuginnError::Http("connection reset".into())),
            ErrorCategory::NetworkError
        );
        assert_eq!(
            categorize(Provider::Gemini, &HuginnError::Http("operation timed out".into())),
            ErrorCategory::Timeout
        );
        assert_eq!(
            categorize(Provider::Mistral, &HuginnError::RateLimited { retry_after: None }),
            ErrorCategory::RateLimited
        );
    }

    #[test]
    fn unrecognised_is_unknown() {
        assert_eq!(categorize(Provider::OpenAi, &api(418, "teapot")), ErrorCategory::Unknown);
        assert_eq!(categorize(Provider::OpenAi, &HuginnError::Unsupported), ErrorCategory::Unknown);
    }

    #[test]
    fn unknown_status_falls_back_to_message() {
        assert_eq!(
            categorize(Provider::Mistral, &api(499, "Too Many Requests")),
            ErrorCategory::RateLimited
        );
    }

    #[test]
    fn default_sets_are_disjoint_and_complete() {
        for c in ErrorCategory::ALL {
            let r = ErrorCategory::default_retryable().contains(&c);
            let n = ErrorCategory::default_non_retryable().contains(&c);
            assert!(r ^ n, "{c} must be in exactly one default set");
        }
    }
}
