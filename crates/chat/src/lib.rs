//! Chat-completion client abstraction
//!
//! Defines the `ChatClient` trait that decouples key rotation from the HTTP
//! call itself. `OpenAiCompatClient` talks to any OpenAI-compatible
//! `/chat/completions` endpoint (Groq by default); tests and alternative
//! backends implement the same trait.
//!
//! The crate also owns the model catalog (which models exist and which the
//! user picked) and prompt shaping for OCR output.

pub mod client;
pub mod models;
pub mod prompt;

pub use client::{OpenAiCompatClient, SamplingParams, sampling_for};
pub use models::{ModelCatalog, ModelInfo};
pub use prompt::{build_ocr_prompt, clean_extracted_text};

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;

/// Classification of upstream errors to determine the failover strategy.
///
/// - QuotaExceeded quarantines the key and moves on to the next one
/// - Permanent quarantines the key (revoked or invalid)
/// - Transient retries with the next key without quarantining
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClassification {
    /// Retryable (timeouts, 5xx, per-minute rate limits)
    Transient,
    /// Daily quota for this key is spent
    QuotaExceeded,
    /// Invalid credentials (401/403)
    Permanent,
}

/// Errors from a chat-completion call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChatError {
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Result alias for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn in a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single prompt for a single model, with optional prior turns.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub prompt: String,
    /// Earlier user/assistant turns, oldest first. Empty in single-shot mode.
    pub history: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            history: Vec::new(),
        }
    }
}

/// Sends a prompt upstream using one API key.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn ChatClient>`).
pub trait ChatClient: Send + Sync {
    /// Identifier for logging (e.g. "groq")
    fn id(&self) -> &str;

    /// Send `request` authenticated with `api_key` and return the reply text.
    fn send<'a>(
        &'a self,
        request: &'a ChatRequest,
        api_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;
}
