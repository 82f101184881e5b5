//! Public types for the Huginn API.

mod classification;
mod message;
mod params;
mod provider;
mod response;

pub use classification::{ContextFlags, DesiredLength, RequestClassification, RequestType};
pub use message::{ImageAttachment, Message, MessageContent, Role};
pub use params::{
    GeminiParams, GenerationParameters, MistralParams, OpenAiParams, ParamLimits, ProviderParams,
};
pub use provider::Provider;
pub use response::{ChatResponse, ResponseMetadata};
