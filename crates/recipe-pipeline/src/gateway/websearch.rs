use async_trait::async_trait;
use recipe_core::Document;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::error::WebSearchError;

/// Fallback text search for queries the index cannot satisfy (§2 component 3).
#[async_trait]
pub trait WebSearchGateway: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>, WebSearchError>;
}

pub struct HttpWebSearchGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpWebSearchGateway {
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
        }
    }
}

#[derive(Deserialize)]
struct Snippet {
    title: String,
    content: String,
}

#[derive(Deserialize)]
struct WebSearchResponse {
    results: Vec<Snippet>,
}

#[async_trait]
impl WebSearchGateway for HttpWebSearchGateway {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        cancel: &CancellationToken,
    ) -> Result<Vec<Document>, WebSearchError> {
        let mut builder = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&serde_json::json!({ "query": query, "top_k": top_k }));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let resp = tokio::select! {
            r = builder.send() => r?,
            _ = cancel.cancelled() => return Err(WebSearchError::Cancelled),
        };

        if !resp.status().is_success() {
            return Err(WebSearchError::MalformedResponse(resp.status().to_string()));
        }

        let parsed: WebSearchResponse = resp
            .json()
            .await
            .map_err(|e| WebSearchError::MalformedResponse(e.to_string()))?;

        Ok(parsed
            .results
            .into_iter()
            .take(3)
            .map(|s| Document {
                title: s.title,
                content: s.content,
                cook_time: None,
                difficulty: None,
                recipe_id: None,
                constraint_warning: String::new(),
            })
            .collect())
    }
}
