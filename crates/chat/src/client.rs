//! OpenAI-compatible chat-completion client
//!
//! POSTs to `{base_url}/chat/completions` with a Bearer key and returns the
//! first choice's message content. Non-2xx responses come back as
//! `ChatError::Status` with the raw body so the caller can classify them.

use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::{ChatClient, ChatError, ChatMessage, ChatRequest, Result, Role};

/// Default upstream: Groq's OpenAI-compatible API.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// System message sent ahead of every conversation.
pub const SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Respond in English by default. \
Only respond in another language if the user explicitly asks for it or the question is about \
that language. For all other queries, give clear and helpful answers in English.";

/// Sampling parameters sent with each request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
}

/// Per-model sampling parameters.
///
/// The large versatile models run hot with short outputs; everything else
/// gets a cooler, longer configuration.
pub fn sampling_for(model: &str) -> SamplingParams {
    match model {
        "llama-3.3-70b-versatile" | "mistral-saba-24b" => SamplingParams {
            temperature: 1.0,
            max_tokens: 1024,
            top_p: 1.0,
        },
        _ => SamplingParams {
            temperature: 0.3,
            max_tokens: 4096,
            top_p: 0.95,
        },
    }
}

/// Build the JSON body for a chat-completion request.
pub fn request_body(request: &ChatRequest) -> serde_json::Value {
    let mut messages = Vec::with_capacity(request.history.len() + 2);
    messages.push(ChatMessage {
        role: Role::System,
        content: SYSTEM_PROMPT.to_string(),
    });
    messages.extend(request.history.iter().cloned());
    messages.push(ChatMessage::user(request.prompt.clone()));

    let params = sampling_for(&request.model);
    serde_json::json!({
        "model": request.model,
        "messages": messages,
        "temperature": params.temperature,
        "max_tokens": params.max_tokens,
        "top_p": params.top_p,
    })
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// HTTP client for an OpenAI-compatible API.
#[derive(Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
}

impl OpenAiCompatClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// List the model ids the key has access to.
    pub async fn fetch_models(&self, api_key: &str) -> Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(api_key)
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("model list request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            warn!(status = status.as_u16(), "model list request rejected");
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let list = response
            .json::<ModelList>()
            .await
            .map_err(|e| ChatError::InvalidResponse(format!("invalid model list: {e}")))?;
        debug!(models = list.data.len(), "fetched model list");
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }

    async fn complete(&self, request: &ChatRequest, api_key: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            model = %request.model,
            history = request.history.len(),
            prompt_len = request.prompt.len(),
            "sending chat completion"
        );

        let response = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&request_body(request))
            .send()
            .await
            .map_err(|e| ChatError::Transport(format!("chat request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));
            return Err(ChatError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let completion = response
            .json::<CompletionResponse>()
            .await
            .map_err(|e| ChatError::InvalidResponse(format!("invalid completion: {e}")))?;

        completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ChatError::InvalidResponse("completion has no choices".into()))
    }
}

impl ChatClient for OpenAiCompatClient {
    fn id(&self) -> &str {
        "openai-compat"
    }

    fn send<'a>(
        &'a self,
        request: &'a ChatRequest,
        api_key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(self.complete(request, api_key))
    }
}
