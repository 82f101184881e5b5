//! Huginn - request optimization, response caching and adaptive retry for
//! LLM chat clients
//!
//! Huginn sits between a chat application and its hosted LLM providers
//! (Gemini, OpenAI, Mistral). For every request it profiles the device,
//! classifies the prompt, consults a quality-aware response cache, rewrites
//! the prompt and sampling parameters, and calls the provider through a
//! per-provider retry policy that adapts to recent success rates.
//!
//! Provider HTTP is not part of this crate: hosts implement
//! [`ProviderPort`] for whatever transport they use.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use huginn::{ChatRequest, Huginn, Message, Provider, ProviderPort, ProviderRequest};
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ProviderPort for Echo {
//!     async fn call(&self, request: &ProviderRequest) -> huginn::Result<String> {
//!         Ok(format!("{} says hi", request.model))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let huginn = Huginn::builder().provider(Arc::new(Echo)).build()?;
//!     huginn.init().await?;
//!
//!     let request = ChatRequest::new(Provider::Gemini, "gemini-2.0-flash");
//!     let response = huginn
//!         .send_message(&request, &[Message::user("What is the capital of France?")], &[], None)
//!         .await?;
//!
//!     println!("{} (cached: {})", response.content, response.metadata.from_cache);
//!     huginn.shutdown().await
//! }
//! ```

pub mod cache;
pub mod config;
pub mod device;
pub mod error;
pub mod gateway;
pub mod optimizer;
pub mod persistence;
pub mod providers;
pub mod random;
pub mod retry;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use cache::{CacheConfig, CacheEntry, CacheStats, ManualClock, ResponseCache};
pub use config::HuginnConfig;
pub use device::{DeviceProfile, DeviceProfiler, NetworkTier, ProfilerConfig};
pub use error::{HuginnError, Result};
pub use gateway::{ChatRequest, Huginn, HuginnBuilder};
pub use optimizer::{OptimizedPrompt, OptimizerConfig, PromptOptimizer, classify};
pub use persistence::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use providers::{ProviderPort, ProviderRequest, StreamConfig, TokenStream};
pub use retry::{AdaptiveConfig, ErrorCategory, RetryOrchestrator, RetryPolicy};

// Re-export all types
pub use types::{
    ChatResponse, ContextFlags, DesiredLength, GeminiParams, GenerationParameters, ImageAttachment,
    Message, MessageContent, MistralParams, OpenAiParams, ParamLimits, Provider, ProviderParams,
    RequestClassification, RequestType, ResponseMetadata, Role,
};
