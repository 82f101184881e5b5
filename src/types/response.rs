//! Facade response types

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::RequestClassification;

/// Response returned by [`Huginn::send_message`](crate::Huginn::send_message)
/// and [`Huginn::stream_message`](crate::Huginn::stream_message).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub content: String,
    pub metadata: ResponseMetadata,
}

/// What the pipeline did to produce a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMetadata {
    /// Served from the response cache without a provider call.
    pub from_cache: bool,
    /// Prompt and parameters were rewritten by the optimizer.
    pub optimization_applied: bool,
    /// Provider attempts made (0 for a cache hit).
    pub retry_attempts: u32,
    /// Wall-clock time spent in the pipeline.
    pub response_time: Duration,
    /// Heuristic 0–10 quality rating of the response.
    pub quality_score: f32,
    /// Classification the pipeline worked from.
    pub classification: RequestClassification,
}
