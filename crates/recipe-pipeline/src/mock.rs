//! In-process fakes for the three external gateways, used by the dialog
//! controller's scripted-scenario tests (S1-S6) and by integration tests in
//! the gateway binary. Not compiled out of the normal build — the teacher
//! keeps its `tests/` fixtures similarly lightweight rather than behind a
//! feature flag.

use async_trait::async_trait;
use recipe_core::{Document, TokenUsage};
use tokio_util::sync::CancellationToken;

use crate::error::{LlmError, RetrievalError, WebSearchError};
use crate::gateway::{ChatRequest, ChatResponse, LlmGateway, RetrievalGateway, WebSearchGateway};

/// Replies with a fixed script of responses, consumed in order. Panics if
/// exhausted, so a test's assertions name exactly how many calls it expects.
pub struct ScriptedLlmGateway {
    replies: std::sync::Mutex<std::collections::VecDeque<String>>,
}

impl ScriptedLlmGateway {
    pub fn new(replies: impl IntoIterator<Item = &'static str>) -> Self {
        Self {
            replies: std::sync::Mutex::new(replies.into_iter().map(String::from).collect()),
        }
    }
}

#[async_trait]
impl LlmGateway for ScriptedLlmGateway {
    async fn chat(&self, _req: ChatRequest, _cancel: &CancellationToken) -> Result<ChatResponse, LlmError> {
        let mut replies = self.replies.lock().unwrap();
        let content = replies
            .pop_front()
            .expect("ScriptedLlmGateway exhausted its script");
        Ok(ChatResponse {
            content,
            usage: TokenUsage::new(10, 5),
        })
    }
}

/// Always fails — exercises transport-failure fallback paths.
pub struct FailingLlmGateway;

#[async_trait]
impl LlmGateway for FailingLlmGateway {
    async fn chat(&self, _req: ChatRequest, _cancel: &CancellationToken) -> Result<ChatResponse, LlmError> {
        Err(LlmError::MalformedResponse("simulated failure".into()))
    }
}

/// Never resolves until cancelled — exercises deadline/cancellation paths.
pub struct HangingLlmGateway;

#[async_trait]
impl LlmGateway for HangingLlmGateway {
    async fn chat(&self, _req: ChatRequest, cancel: &CancellationToken) -> Result<ChatResponse, LlmError> {
        cancel.cancelled().await;
        Err(LlmError::Cancelled)
    }
}

pub struct FixedRetrievalGateway {
    pub documents: Vec<Document>,
}

#[async_trait]
impl RetrievalGateway for FixedRetrievalGateway {
    async fn search(
        &self,
        _query: &str,
        top_k: usize,
        _rerank: bool,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Document>, RetrievalError> {
        Ok(self.documents.iter().take(top_k).cloned().collect())
    }
}

pub struct FixedWebSearchGateway {
    pub documents: Vec<Document>,
}

#[async_trait]
impl WebSearchGateway for FixedWebSearchGateway {
    async fn search(
        &self,
        _query: &str,
        top_k: usize,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Document>, WebSearchError> {
        Ok(self.documents.iter().take(top_k).cloned().collect())
    }
}
