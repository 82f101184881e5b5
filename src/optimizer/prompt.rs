//! Prompt rewriting and generation parameter derivation.

use serde::{Deserialize, Serialize};

use crate::device::DeviceProfile;
use crate::types::{
    ContextFlags, DesiredLength, GenerationParameters, Provider, ProviderParams,
    RequestClassification, RequestType,
};

/// Prompt and parameters ready to send to a provider.
///
/// Built fresh for every request and dropped once the call completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizedPrompt {
    pub rewritten_prompt: String,
    pub generation_params: ProviderParams,
    /// System-level instructions, in the order they should be applied.
    pub provider_instructions: Vec<String>,
    /// Qualities the response is expected to show.
    pub expected_quality_signals: Vec<String>,
}

/// Tunables for [`PromptOptimizer`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Token budget multiplier applied once per available context source.
    pub context_token_factor: f32,
    /// Token budget multiplier on low-end devices.
    pub low_end_token_factor: f32,
    /// Token budget growth per complexity step above 1.
    pub complexity_token_step: f32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            context_token_factor: 1.15,
            low_end_token_factor: 0.75,
            complexity_token_step: 0.25,
        }
    }
}

/// Per-type scaffolding and sampling baseline.
struct Template {
    scaffold: &'static str,
    temperature: f32,
    top_p: f32,
    /// Temperature change per complexity step above 1.
    complexity_temperature_step: f32,
    quality_signals: &'static [&'static str],
}

fn template(request_type: RequestType) -> Template {
    match request_type {
        RequestType::Question => Template {
            scaffold: "Answer the following question accurately and directly. \
                       If a fact is uncertain, say so.",
            temperature: 0.3,
            top_p: 0.8,
            complexity_temperature_step: -0.05,
            quality_signals: &["accuracy", "directness"],
        },
        RequestType::Task => Template {
            scaffold: "Complete the following task. Follow the instructions precisely \
                       and present the result in a directly usable form.",
            temperature: 0.4,
            top_p: 0.85,
            complexity_temperature_step: -0.05,
            quality_signals: &["completeness", "actionability"],
        },
        RequestType::Creative => Template {
            scaffold: "Respond creatively to the following request. Favour vivid, \
                       original language and a coherent structure.",
            temperature: 0.9,
            top_p: 0.95,
            complexity_temperature_step: 0.03,
            quality_signals: &["originality", "coherence"],
        },
        RequestType::Analysis => Template {
            scaffold: "Analyse the following request. Examine the relevant factors, \
                       weigh them against each other and state a reasoned conclusion.",
            temperature: 0.5,
            top_p: 0.9,
            complexity_temperature_step: 0.0,
            quality_signals: &["depth", "structure", "reasoning"],
        },
        RequestType::Conversation => Template {
            scaffold: "Continue the conversation naturally and helpfully.",
            temperature: 0.7,
            top_p: 0.9,
            complexity_temperature_step: 0.0,
            quality_signals: &["relevance", "tone"],
        },
    }
}

fn base_tokens(length: DesiredLength) -> f32 {
    match length {
        DesiredLength::Short => 256.0,
        DesiredLength::Medium => 1024.0,
        DesiredLength::Long => 2048.0,
    }
}

fn length_hint(length: DesiredLength) -> Option<&'static str> {
    match length {
        DesiredLength::Short => Some("Keep the answer brief."),
        DesiredLength::Medium => None,
        DesiredLength::Long => Some("Give a thorough, well-structured answer."),
    }
}

fn language_name(code: &str) -> Option<&'static str> {
    match code {
        "fr" => Some("French"),
        "en" => Some("English"),
        "es" => Some("Spanish"),
        "de" => Some("German"),
        _ => None,
    }
}

fn provider_style(provider: Provider) -> &'static str {
    match provider {
        Provider::Gemini => "Use Markdown formatting where it helps readability.",
        Provider::OpenAi => "Use Markdown for lists and code blocks.",
        Provider::Mistral => "Be concise and avoid unnecessary preamble.",
    }
}

/// Scale a token budget for the device it will be rendered on.
///
/// Low-end devices get a reduced budget; everything else is unchanged.
pub fn device_adjusted_params(
    params: &ProviderParams,
    device: &DeviceProfile,
    config: &OptimizerConfig,
) -> ProviderParams {
    if !device.is_low_end() {
        return params.clone();
    }
    let max_tokens = (params.max_tokens() as f32 * config.low_end_token_factor).round() as u32;
    params
        .clone()
        .with_sampling(params.temperature(), params.top_p(), max_tokens)
}

/// Rewrites prompts and derives generation parameters from a classification.
///
/// Deterministic: identical inputs always produce an identical
/// [`OptimizedPrompt`].
#[derive(Debug, Clone, Default)]
pub struct PromptOptimizer {
    config: OptimizerConfig,
}

impl PromptOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Build the prompt and parameters for one provider call.
    pub fn optimize(
        &self,
        provider: Provider,
        raw_prompt: &str,
        classification: &RequestClassification,
        context: ContextFlags,
        device: &DeviceProfile,
    ) -> OptimizedPrompt {
        let context = classification.context.merge(context);
        let template = template(classification.request_type);
        let steps = f32::from(classification.complexity.clamp(1, 5) - 1);

        let temperature = template.temperature + template.complexity_temperature_step * steps;
        let mut tokens = base_tokens(classification.desired_length)
            * (1.0 + self.config.complexity_token_step * steps);

        let mut instructions = Vec::new();
        if let Some(name) = language_name(&classification.language) {
            instructions.push(format!("Respond in {name}, the language of the request."));
        }
        if context.has_document_context {
            instructions.push(
                "Base your answer on the provided documents and cite them where relevant."
                    .to_string(),
            );
            tokens *= self.config.context_token_factor;
        }
        if context.has_web_context {
            instructions.push(
                "Use the provided web results, mention their sources and prefer the most recent information."
                    .to_string(),
            );
            tokens *= self.config.context_token_factor;
        }
        if context.has_image_context {
            instructions.push("Take the attached images into account.".to_string());
            tokens *= self.config.context_token_factor;
        }
        instructions.push(provider_style(provider).to_string());

        let mut rewritten_prompt = format!("{}\n\n{}", template.scaffold, raw_prompt.trim());
        if let Some(hint) = length_hint(classification.desired_length) {
            rewritten_prompt.push_str("\n\n");
            rewritten_prompt.push_str(hint);
        }

        let mut expected_quality_signals: Vec<String> = template
            .quality_signals
            .iter()
            .map(|s| (*s).to_string())
            .collect();
        if context.has_document_context || context.has_web_context {
            expected_quality_signals.push("grounding".to_string());
        }

        let params = ProviderParams::defaults_for(provider).with_sampling(
            temperature,
            template.top_p,
            tokens.round() as u32,
        );

        OptimizedPrompt {
            rewritten_prompt,
            generation_params: device_adjusted_params(&params, device, &self.config),
            provider_instructions: instructions,
            expected_quality_signals,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::NetworkTier;
    use crate::optimizer::classify;

    fn mid_device() -> DeviceProfile {
        DeviceProfile {
            tier: 6,
            estimated_memory_mb: 8192,
            network_tier: NetworkTier::Fast,
            supports_parallelism: true,
        }
    }

    fn optimize(text: &str, context: ContextFlags) -> OptimizedPrompt {
        PromptOptimizer::default().optimize(
            Provider::Gemini,
            text,
            &classify(text),
            context,
            &mid_device(),
        )
    }

    #[test]
    fn creative_runs_hotter_than_question() {
        let poem = optimize("Écris-moi un poème sur l'automne", ContextFlags::default());
        let capital = optimize("Quelle est la capitale de la France ?", ContextFlags::default());
        assert!(
            poem.generation_params.temperature() > capital.generation_params.temperature()
        );
    }

    #[test]
    fn each_type_has_distinct_scaffolding_and_temperature() {
        let types = [
            RequestType::Question,
            RequestType::Task,
            RequestType::Creative,
            RequestType::Analysis,
            RequestType::Conversation,
        ];
        let templates: Vec<_> = types.iter().map(|t| template(*t)).collect();
        for (i, a) in templates.iter().enumerate() {
            for b in &templates[i + 1..] {
                assert_ne!(a.scaffold, b.scaffold);
                assert_ne!(a.temperature, b.temperature);
            }
        }
    }

    #[test]
    fn complexity_grows_budget_and_cools_tasks() {
        let mut c = classify("Write a function that parses dates");
        assert_eq!(c.request_type, RequestType::Task);
        c.complexity = 1;
        let simple = PromptOptimizer::default().optimize(
            Provider::OpenAi,
            "x",
            &c,
            ContextFlags::default(),
            &mid_device(),
        );
        c.complexity = 4;
        let hard = PromptOptimizer::default().optimize(
            Provider::OpenAi,
            "x",
            &c,
            ContextFlags::default(),
            &mid_device(),
        );
        assert!(hard.generation_params.max_tokens() > simple.generation_params.max_tokens());
        assert!(hard.generation_params.temperature() < simple.generation_params.temperature());
    }

    #[test]
    fn context_adds_instructions_and_widens_budget() {
        let text = "Summarize the attached report";
        let plain = optimize(text, ContextFlags::default());
        let grounded = optimize(text, ContextFlags::new().documents(true).web(true));
        assert!(grounded.provider_instructions.len() == plain.provider_instructions.len() + 2);
        assert!(grounded.generation_params.max_tokens() > plain.generation_params.max_tokens());
        assert!(grounded.expected_quality_signals.contains(&"grounding".to_string()));
    }

    #[test]
    fn parameters_respect_provider_limits() {
        let mut c = classify("Écris-moi un poème sur l'automne");
        c.complexity = 5;
        c.desired_length = DesiredLength::Long;
        let all = ContextFlags::new().documents(true).web(true).images(true);
        let out = PromptOptimizer::default().optimize(Provider::Mistral, "x", &c, all, &mid_device());
        assert!(out.generation_params.temperature() <= 1.0);
        assert!(out.generation_params.max_tokens() <= 8192);
        let out = PromptOptimizer::default().optimize(Provider::OpenAi, "x", &c, all, &mid_device());
        assert!(out.generation_params.max_tokens() <= 4096);
    }

    #[test]
    fn low_end_device_shrinks_budget() {
        let c = classify("Explain how vaccines work");
        let strong = PromptOptimizer::default().optimize(
            Provider::Gemini,
            "x",
            &c,
            ContextFlags::default(),
            &mid_device(),
        );
        let weak = PromptOptimizer::default().optimize(
            Provider::Gemini,
            "x",
            &c,
            ContextFlags::default(),
            &DeviceProfile::conservative(),
        );
        assert!(weak.generation_params.max_tokens() < strong.generation_params.max_tokens());
    }

    #[test]
    fn rewritten_prompt_contains_request_and_language_instruction() {
        let out = optimize("Quelle est la capitale de la France ?", ContextFlags::default());
        assert!(out.rewritten_prompt.contains("Quelle est la capitale de la France ?"));
        assert_eq!(
            out.provider_instructions[0],
            "Respond in French, the language of the request."
        );
        assert_eq!(out.generation_params.provider(), Provider::Gemini);
    }

    #[test]
    fn optimize_is_deterministic() {
        let text = "Analyse the trade offs of microservices";
        let flags = ContextFlags::new().web(true);
        assert_eq!(optimize(text, flags), optimize(text, flags));
    }
}
