use std::time::Duration;

use huginn::retry::categorize;
use huginn::{ErrorCategory, HuginnError, Provider, Result};

fn api(status: u16, message: &str) -> HuginnError {
    HuginnError::Api {
        status,
        message: message.into(),
    }
}

#[test]
fn test_error_display() {
    let err = api(503, "service unavailable");
    assert!(err.to_string().contains("503"));
    assert!(err.to_string().contains("service unavailable"));
}

#[test]
fn test_result_alias() {
    fn returns_error() -> Result<()> {
        Err(HuginnError::NoProvider)
    }
    assert!(returns_error().is_err());
}

// ============================================================================
// Categorization
// ============================================================================

#[test]
fn transient_errors() {
    let cases = [
        (HuginnError::RateLimited { retry_after: None }, ErrorCategory::RateLimited),
        (api(429, "slow down"), ErrorCategory::RateLimited),
        (api(500, "internal"), ErrorCategory::ServerError),
        (api(502, "bad gateway"), ErrorCategory::ServerError),
        (api(503, "unavailable"), ErrorCategory::ServerError),
        (api(504, "gateway timeout"), ErrorCategory::Timeout),
        (api(408, "request timeout"), ErrorCategory::Timeout),
        (HuginnError::Timeout("30s elapsed".into()), ErrorCategory::Timeout),
        (HuginnError::Http("connection reset".into()), ErrorCategory::NetworkError),
        (HuginnError::Http("operation timed out".into()), ErrorCategory::Timeout),
        (HuginnError::EmptyResponse, ErrorCategory::ServerError),
    ];
    for (err, expected) in cases {
        let category = categorize(Provider::Mistral, &err);
        assert_eq!(category, expected, "{err}");
        assert!(ErrorCategory::default_retryable().contains(&category));
    }
}

#[test]
fn permanent_errors() {
    let cases = [
        (api(400, "bad request"), ErrorCategory::BadRequest),
        (api(401, "unauthorized"), ErrorCategory::Unauthorized),
        (api(403, "forbidden"), ErrorCategory::Unauthorized),
        (api(404, "model not found"), ErrorCategory::BadRequest),
        (api(402, "payment required"), ErrorCategory::QuotaExceeded),
        (HuginnError::InvalidInput("x".into()), ErrorCategory::BadRequest),
        (HuginnError::Configuration("x".into()), ErrorCategory::Unknown),
    ];
    for (err, expected) in cases {
        let category = categorize(Provider::Mistral, &err);
        assert_eq!(category, expected, "{err}");
        assert!(ErrorCategory::default_non_retryable().contains(&category));
    }
}

#[test]
fn provider_specific_conventions() {
    let openai_quota = api(429, "You exceeded your current quota: insufficient_quota");
    assert_eq!(categorize(Provider::OpenAi, &openai_quota), ErrorCategory::QuotaExceeded);
    assert_eq!(categorize(Provider::Mistral, &openai_quota), ErrorCategory::RateLimited);

    let gemini_key = api(400, "API key not valid. Please pass a valid API key.");
    assert_eq!(categorize(Provider::Gemini, &gemini_key), ErrorCategory::Unauthorized);
    assert_eq!(categorize(Provider::OpenAi, &gemini_key), ErrorCategory::BadRequest);

    let gemini_billing = api(429, "Billing account not active");
    assert_eq!(categorize(Provider::Gemini, &gemini_billing), ErrorCategory::QuotaExceeded);
}

#[test]
fn wrapped_errors_are_categorized_by_their_root() {
    let err = HuginnError::RetryFailed {
        category: ErrorCategory::ServerError,
        attempts: 3,
        elapsed: Duration::from_secs(3),
        source: Box::new(api(500, "internal")),
    };
    assert_eq!(categorize(Provider::Gemini, &err), ErrorCategory::ServerError);
    assert!(matches!(err.root(), HuginnError::Api { status: 500, .. }));
}

// ============================================================================
// retry_after extraction
// ============================================================================

#[test]
fn retry_after_from_rate_limited() {
    let duration = Duration::from_secs(5);
    let err = HuginnError::RateLimited {
        retry_after: Some(duration),
    };
    assert_eq!(err.retry_after(), Some(duration));
}

#[test]
fn retry_after_survives_retry_wrapping() {
    let err = HuginnError::RetryFailed {
        category: ErrorCategory::RateLimited,
        attempts: 4,
        elapsed: Duration::from_secs(10),
        source: Box::new(HuginnError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        }),
    };
    assert_eq!(err.retry_after(), Some(Duration::from_secs(30)));
    assert_eq!(err.attempts(), Some(4));
}

#[test]
fn retry_after_none_for_non_rate_limit_errors() {
    assert_eq!(HuginnError::Http("timeout".into()).retry_after(), None);
    assert_eq!(api(401, "unauthorized").retry_after(), None);
}
