//! Provider-specific generation parameters.
//!
//! Each provider gets its own parameter struct carrying the knobs it
//! actually understands. [`ProviderParams`] joins them in a tagged union and
//! the [`GenerationParameters`] trait exposes the sampling surface every
//! provider shares (temperature, top-p, token budget), which is all the
//! optimizer and the cache need to reason about.

use serde::{Deserialize, Serialize};

use super::Provider;

/// Sampling parameters common to every provider.
pub trait GenerationParameters {
    fn temperature(&self) -> f32;
    fn top_p(&self) -> f32;
    fn max_tokens(&self) -> u32;
}

/// Legal parameter ranges for a provider (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamLimits {
    pub temperature: (f32, f32),
    pub top_p: (f32, f32),
    pub max_tokens: (u32, u32),
}

impl ParamLimits {
    /// Ranges accepted by the provider's API.
    pub fn for_provider(provider: Provider) -> Self {
        match provider {
            Provider::Gemini => Self {
                temperature: (0.0, 2.0),
                top_p: (0.0, 1.0),
                max_tokens: (1, 8192),
            },
            Provider::OpenAi => Self {
                temperature: (0.0, 2.0),
                top_p: (0.0, 1.0),
                max_tokens: (1, 4096),
            },
            Provider::Mistral => Self {
                temperature: (0.0, 1.0),
                top_p: (0.0, 1.0),
                max_tokens: (1, 8192),
            },
        }
    }

    pub fn clamp_temperature(&self, t: f32) -> f32 {
        clamp_f32(t, self.temperature)
    }

    pub fn clamp_top_p(&self, p: f32) -> f32 {
        clamp_f32(p, self.top_p)
    }

    pub fn clamp_max_tokens(&self, n: u32) -> u32 {
        n.clamp(self.max_tokens.0, self.max_tokens.1)
    }
}

/// NaN collapses to the lower bound so a broken computation can never
/// produce an illegal request.
fn clamp_f32(v: f32, (lo, hi): (f32, f32)) -> f32 {
    if v.is_nan() { lo } else { v.clamp(lo, hi) }
}

/// Google Gemini `generationConfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeminiParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    pub top_k: u32,
}

impl Default for GeminiParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            max_output_tokens: 2048,
            top_k: 40,
        }
    }
}

/// OpenAI chat completion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenAiParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

impl Default for OpenAiParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 1.0,
            max_tokens: 1024,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
        }
    }
}

/// Mistral chat completion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MistralParams {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub safe_prompt: bool,
}

impl Default for MistralParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 1.0,
            max_tokens: 1024,
            safe_prompt: false,
        }
    }
}

/// Generation parameters for one provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "lowercase")]
pub enum ProviderParams {
    Gemini(GeminiParams),
    OpenAi(OpenAiParams),
    Mistral(MistralParams),
}

impl ProviderParams {
    /// Provider defaults.
    pub fn defaults_for(provider: Provider) -> Self {
        match provider {
            Provider::Gemini => ProviderParams::Gemini(GeminiParams::default()),
            Provider::OpenAi => ProviderParams::OpenAi(OpenAiParams::default()),
            Provider::Mistral => ProviderParams::Mistral(MistralParams::default()),
        }
    }

    /// Provider these parameters belong to.
    pub fn provider(&self) -> Provider {
        match self {
            ProviderParams::Gemini(_) => Provider::Gemini,
            ProviderParams::OpenAi(_) => Provider::OpenAi,
            ProviderParams::Mistral(_) => Provider::Mistral,
        }
    }

    /// Replace the shared sampling parameters, clamped to the provider's
    /// legal ranges. Provider-specific fields are kept.
    pub fn with_sampling(mut self, temperature: f32, top_p: f32, max_tokens: u32) -> Self {
        let limits = ParamLimits::for_provider(self.provider());
        let (t, p, n) = (
            limits.clamp_temperature(temperature),
            limits.clamp_top_p(top_p),
            limits.clamp_max_tokens(max_tokens),
        );
        match &mut self {
            ProviderParams::Gemini(g) => {
                g.temperature = t;
                g.top_p = p;
                g.max_output_tokens = n;
            }
            ProviderParams::OpenAi(o) => {
                o.temperature = t;
                o.top_p = p;
                o.max_tokens = n;
            }
            ProviderParams::Mistral(m) => {
                m.temperature = t;
                m.top_p = p;
                m.max_tokens = n;
            }
        }
        self
    }

    /// Same parameters with every shared field clamped to legal ranges.
    pub fn clamped(self) -> Self {
        let (t, p, n) = (self.temperature(), self.top_p(), self.max_tokens());
        self.with_sampling(t, p, n)
    }
}

impl GenerationParameters for ProviderParams {
    fn temperature(&self) -> f32 {
        match self {
            ProviderParams::Gemini(g) => g.temperature,
            ProviderParams::OpenAi(o) => o.temperature,
            ProviderParams::Mistral(m) => m.temperature,
        }
    }

    fn top_p(&self) -> f32 {
        match self {
            ProviderParams::Gemini(g) => g.top_p,
            ProviderParams::OpenAi(o) => o.top_p,
            ProviderParams::Mistral(m) => m.top_p,
        }
    }

    fn max_tokens(&self) -> u32 {
        match self {
            ProviderParams::Gemini(g) => g.max_output_tokens,
            ProviderParams::OpenAi(o) => o.max_tokens,
            ProviderParams::Mistral(m) => m.max_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_provider() {
        for p in Provider::ALL {
            assert_eq!(ProviderParams::defaults_for(p).provider(), p);
        }
    }

    #[test]
    fn with_sampling_clamps_to_provider_limits() {
        let params = ProviderParams::defaults_for(Provider::Mistral).with_sampling(1.8, 1.4, 50_000);
        assert_eq!(params.temperature(), 1.0);
        assert_eq!(params.top_p(), 1.0);
        assert_eq!(params.max_tokens(), 8192);

        let params = ProviderParams::defaults_for(Provider::OpenAi).with_sampling(-1.0, 0.5, 0);
        assert_eq!(params.temperature(), 0.0);
        assert_eq!(params.top_p(), 0.5);
        assert_eq!(params.max_tokens(), 1);
    }

    #[test]
    fn with_sampling_keeps_provider_specific_fields() {
        let params = ProviderParams::Gemini(GeminiParams {
            top_k: 7,
            ..GeminiParams::default()
        })
        .with_sampling(0.2, 0.9, 512);
        match params {
            ProviderParams::Gemini(g) => {
                assert_eq!(g.top_k, 7);
                assert_eq!(g.max_output_tokens, 512);
            }
            other => panic!("unexpected params: {other:?}"),
        }
    }

    #[test]
    fn nan_temperature_collapses_to_lower_bound() {
        let params = ProviderParams::defaults_for(Provider::Gemini).with_sampling(f32::NAN, 0.9, 10);
        assert_eq!(params.temperature(), 0.0);
    }

    #[test]
    fn serializes_with_provider_tag() {
        let json = serde_json::to_value(ProviderParams::defaults_for(Provider::OpenAi)).unwrap();
        assert_eq!(json["provider"], "openai");
        assert_eq!(json["max_tokens"], 1024);
    }
}
