//! Supported LLM providers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::HuginnError;

/// Hosted LLM provider a request is routed to.
///
/// Each provider has its own parameter ranges ([`ParamLimits`](super::ParamLimits)),
/// its own default retry policy and its own error-signalling conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Gemini,
    OpenAi,
    Mistral,
}

impl Provider {
    /// All known providers, in a stable order.
    pub const ALL: [Provider; 3] = [Provider::Gemini, Provider::OpenAi, Provider::Mistral];

    /// Canonical lowercase name, used in logs, metrics and cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::OpenAi => "openai",
            Provider::Mistral => "mistral",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = HuginnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Provider::Gemini),
            "openai" => Ok(Provider::OpenAi),
            "mistral" => Ok(Provider::Mistral),
            other => Err(HuginnError::UnknownProvider(other.to_string())),
        }
    }
}
