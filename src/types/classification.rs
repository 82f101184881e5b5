//! Structured request signal produced by the classifier.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Broad intent of a user request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestType {
    Question,
    Task,
    Creative,
    Analysis,
    Conversation,
}

impl RequestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestType::Question => "question",
            RequestType::Task => "task",
            RequestType::Creative => "creative",
            RequestType::Analysis => "analysis",
            RequestType::Conversation => "conversation",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How long an answer the user expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DesiredLength {
    Short,
    Medium,
    Long,
}

/// Side-context available to the request (RAG documents, web results, images).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContextFlags {
    #[serde(default)]
    pub has_document_context: bool,
    #[serde(default)]
    pub has_web_context: bool,
    #[serde(default)]
    pub has_image_context: bool,
}

impl ContextFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn documents(mut self, enabled: bool) -> Self {
        self.has_document_context = enabled;
        self
    }

    pub fn web(mut self, enabled: bool) -> Self {
        self.has_web_context = enabled;
        self
    }

    pub fn images(mut self, enabled: bool) -> Self {
        self.has_image_context = enabled;
        self
    }

    /// Whether any side-context is available.
    pub fn any(&self) -> bool {
        self.has_document_context || self.has_web_context || self.has_image_context
    }

    /// Flag-wise OR of two flag sets.
    pub fn merge(self, other: ContextFlags) -> Self {
        Self {
            has_document_context: self.has_document_context || other.has_document_context,
            has_web_context: self.has_web_context || other.has_web_context,
            has_image_context: self.has_image_context || other.has_image_context,
        }
    }
}

/// Classifier output for a single request.
///
/// A plain value: produced once by [`classify`](crate::optimizer::classify)
/// and never mutated afterwards (use [`with_context`](Self::with_context) to
/// derive a copy carrying caller-supplied context flags).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestClassification {
    pub request_type: RequestType,
    /// 1 (trivial) to 5 (very involved).
    pub complexity: u8,
    pub desired_length: DesiredLength,
    /// ISO 639-1 language code.
    pub language: String,
    #[serde(default)]
    pub context: ContextFlags,
}

impl RequestClassification {
    /// Copy of this classification with `flags` merged into its context.
    pub fn with_context(&self, flags: ContextFlags) -> Self {
        Self {
            context: self.context.merge(flags),
            ..self.clone()
        }
    }
}
