use async_trait::async_trait;
use recipe_core::Document;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::RetrievalError;

/// Dense-vector search with optional reranking (§2 component 2).
#[async_trait]
pub trait RetrievalGateway: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        rerank: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>, RetrievalError>;
}

pub struct HttpRetrievalGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpRetrievalGateway {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    documents: Vec<Document>,
}

#[async_trait]
impl RetrievalGateway for HttpRetrievalGateway {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        rerank: bool,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>, RetrievalError> {
        let mut builder = self.client.post(format!("{}/search", self.base_url)).json(
            &serde_json::json!({ "query": query, "top_k": top_k, "rerank": rerank }),
        );
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = tokio::select! {
            r = builder.send() => r?,
            _ = cancel.cancelled() => return Err(RetrievalError::Cancelled),
        };

        if !resp.status().is_success() {
            return Err(RetrievalError::MalformedResponse(resp.status().to_string()));
        }

        let parsed: SearchResponse = resp
            .json()
            .await
            .map_err(|e| RetrievalError::MalformedResponse(e.to_string()))?;
        Ok(parsed.documents)
    }
}

/// Stands in when no retrieval index is configured. Always reports a
/// transport failure so the search pipeline's existing retrieval-failure
/// path (route to web search) runs instead of a dedicated "unconfigured"
/// branch.
pub struct NullRetrievalGateway;

#[async_trait]
impl RetrievalGateway for NullRetrievalGateway {
    async fn search(
        &self,
        _query: &str,
        _top_k: usize,
        _rerank: bool,
        _cancel: &CancellationToken,
    ) -> Result<Vec<Document>, RetrievalError> {
        Err(RetrievalError::MalformedResponse("no retrieval provider configured".into()))
    }
}
