use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use huginn::device::StaticSignals;
use huginn::{
    ChatRequest, ContextFlags, DeviceProfile, GenerationParameters, Huginn, Message, NetworkTier,
    PromptOptimizer, Provider, ProviderParams, ProviderPort, ProviderRequest, RequestType, Result,
    classify,
};

/// Records the parameters of every call.
#[derive(Default)]
struct RecordingPort {
    params: Mutex<Vec<ProviderParams>>,
}

#[async_trait]
impl ProviderPort for RecordingPort {
    async fn call(&self, request: &ProviderRequest) -> Result<String> {
        self.params.lock().unwrap().push(request.params.clone());
        Ok("Done.".to_string())
    }
}

fn device(cpus: usize, memory_mb: u64, latency_ms: Option<u64>) -> Arc<StaticSignals> {
    Arc::new(StaticSignals::new(
        Some(cpus),
        Some(memory_mb),
        latency_ms.map(Duration::from_millis),
    ))
}

#[tokio::test]
async fn creative_requests_are_sent_hotter_than_questions() {
    let port = Arc::new(RecordingPort::default());
    let huginn = Huginn::builder()
        .provider(port.clone())
        .device_signals(device(8, 16 * 1024, Some(30)))
        .build()
        .unwrap();
    let request = ChatRequest::new(Provider::Gemini, "gemini-2.0-flash");

    for prompt in ["Écris-moi un poème sur l'automne", "Quelle est la capitale de la France ?"] {
        huginn
            .send_message(&request, &[Message::user(prompt)], &[], None)
            .await
            .unwrap();
    }

    let params = port.params.lock().unwrap();
    assert!(params[0].temperature() > params[1].temperature());
}

#[tokio::test]
async fn low_end_devices_get_smaller_token_budgets() {
    let prompt = "Explain how a hash map handles collisions";
    let mut budgets = Vec::new();
    for signals in [device(8, 16 * 1024, Some(30)), device(1, 512, None)] {
        let port = Arc::new(RecordingPort::default());
        let huginn = Huginn::builder()
            .provider(port.clone())
            .device_signals(signals)
            .build()
            .unwrap();
        huginn
            .send_message(
                &ChatRequest::new(Provider::OpenAi, "gpt-4o-mini"),
                &[Message::user(prompt)],
                &[],
                None,
            )
            .await
            .unwrap();
        budgets.push(port.params.lock().unwrap()[0].max_tokens());
    }
    assert!(budgets[1] < budgets[0]);
}

#[test]
fn optimization_is_deterministic() {
    let optimizer = PromptOptimizer::default();
    let device = DeviceProfile {
        tier: 5,
        estimated_memory_mb: 4096,
        network_tier: NetworkTier::Medium,
        supports_parallelism: true,
    };
    let text = "Compare the pros and cons of Rust and Go for web services";
    let classification = classify(text);
    let context = ContextFlags::new().web(true);

    let a = optimizer.optimize(Provider::Mistral, text, &classification, context, &device);
    let b = optimizer.optimize(Provider::Mistral, text, &classification, context, &device);
    assert_eq!(a, b);
    assert_eq!(a.generation_params.provider(), Provider::Mistral);
    assert!(a.rewritten_prompt.contains(text));
}

#[test]
fn classifier_recognises_each_type() {
    let cases = [
        ("What time is it in Tokyo?", RequestType::Question),
        ("Write a haiku about rain", RequestType::Creative),
        ("Translate this sentence into German", RequestType::Task),
        ("Compare the pros and cons of Rust and Go", RequestType::Analysis),
        ("Thanks, that helps a lot", RequestType::Conversation),
    ];
    for (text, expected) in cases {
        assert_eq!(classify(text).request_type, expected, "{text}");
    }
}
