use async_trait::async_trait;
use recipe_core::TokenUsage;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::LlmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A single synchronous prompt→completion request. Temperature is explicit
/// because the Intent Classifier needs "low" and free-form generation needs
/// a higher value — the gateway itself has no notion of a default.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: TokenUsage,
}

/// Uniform request path to the completion service (§2 component 1). Every
/// call is a suspension point and must honor `CancellationToken`.
#[async_trait]
pub trait LlmGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest, cancel: &CancellationToken) -> Result<ChatResponse, LlmError>;
}

/// Generic HTTP JSON completion gateway. The spec describes the LLM Gateway
/// purely by its contract (a synchronous prompt→completion call that may
/// report token usage), not by a specific vendor — this keeps the provider
/// abstraction rather than hard-coding one (see DESIGN.md open-question
/// resolution).
pub struct HttpLlmGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpLlmGateway {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
        }
    }
}

/// The three usage-metadata shapes a provider might return, normalized here
/// at the gateway boundary so no downstream component branches on them
/// (§9 Design Notes).
#[derive(Debug, Deserialize, Default)]
struct RawUsage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: Option<u32>,
    #[serde(default)]
    prompt_tokens: Option<u32>,
    #[serde(default)]
    completion_tokens: Option<u32>,
    #[serde(default)]
    total_tokens: Option<u32>,
}

fn normalize_usage(raw: Option<RawUsage>) -> TokenUsage {
    let Some(raw) = raw else {
        return TokenUsage::ZERO;
    };
    let prompt = raw.input_tokens.or(raw.prompt_tokens).unwrap_or(0);
    let completion = raw.output_tokens.or(raw.completion_tokens).unwrap_or(0);
    let total = raw.total_tokens.unwrap_or(prompt + completion);
    TokenUsage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: total,
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    content: String,
    #[serde(default)]
    usage: Option<RawUsage>,
}

#[async_trait]
impl LlmGateway for HttpLlmGateway {
    async fn chat(&self, req: ChatRequest, cancel: &CancellationToken) -> Result<ChatResponse, LlmError> {
        let body = serde_json::json!({
            "model": self.model,
            "temperature": req.temperature,
            "max_tokens": req.max_tokens,
            "messages": req.messages.iter().map(|m| serde_json::json!({
                "role": match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                "content": m.content,
            })).collect::<Vec<_>>(),
        });

        let url = format!("{}/v1/chat/completions", self.base_url);
        let send = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send();

        let resp = tokio::select! {
            r = send => r?,
            _ = cancel.cancelled() => return Err(LlmError::Cancelled),
        };

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::MalformedResponse(format!("{status}: {text}")));
        }

        let parsed: CompletionResponse = resp
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        Ok(ChatResponse {
            content: parsed.content,
            usage: normalize_usage(parsed.usage),
        })
    }
}

/// Stands in when no LLM provider is configured. Every call fails immediately
/// so the classifier/extractor/pipeline fallback paths (keyword heuristics,
/// pass-through rewrite, regex extraction) take over instead of the process
/// hanging or panicking on a missing provider.
pub struct NullLlmGateway;

#[async_trait]
impl LlmGateway for NullLlmGateway {
    async fn chat(&self, _req: ChatRequest, _cancel: &CancellationToken) -> Result<ChatResponse, LlmError> {
        Err(LlmError::MalformedResponse("no LLM provider configured".into()))
    }
}
