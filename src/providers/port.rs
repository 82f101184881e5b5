//! Provider call port.
//!
//! huginn never speaks a vendor wire protocol. The host application wraps
//! its Gemini/OpenAI/Mistral clients in a [`ProviderPort`] and reports
//! failures as [`HuginnError`] values the retry layer can categorize
//! (`Api { status, message }`, `Http`, `Timeout`, `RateLimited`).

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::types::{ImageAttachment, Message, Provider, ProviderParams};
use crate::{HuginnError, Result};

/// Incremental response text.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One fully prepared provider call.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub provider: Provider,
    pub model: String,
    pub messages: Vec<Message>,
    pub system_prompt: Option<String>,
    pub params: ProviderParams,
    pub images: Vec<ImageAttachment>,
}

/// Outbound LLM call, implemented by the host for each vendor it supports.
#[async_trait]
pub trait ProviderPort: Send + Sync {
    /// Complete response text for `request`.
    async fn call(&self, request: &ProviderRequest) -> Result<String>;

    /// Token stream for `request`.
    ///
    /// Default: [`HuginnError::Unsupported`], which makes the facade fall
    /// back to [`call`](Self::call) and a synthesized chunk stream.
    async fn stream_call(&self, request: &ProviderRequest) -> Result<TokenStream> {
        let _ = request;
        Err(HuginnError::Unsupported)
    }
}
