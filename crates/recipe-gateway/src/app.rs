use axum::{routing::get, Router};
use recipe_core::RecipeConfig;
use recipe_pipeline::gateway::{LlmGateway, RetrievalGateway, WebSearchGateway};
use recipe_sessions::{ChatLogStore, SessionRegistry};
use std::sync::Arc;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: RecipeConfig,
    pub llm: Box<dyn LlmGateway>,
    pub retrieval: Box<dyn RetrievalGateway>,
    pub web_search: Option<Box<dyn WebSearchGateway>>,
    pub store: Box<dyn ChatLogStore>,
    /// Live session id -> cancellation token, so a disconnect or an explicit
    /// deadline can cancel whatever pipeline is in flight for that session.
    pub sessions: SessionRegistry,
}

impl AppState {
    pub fn new(
        config: RecipeConfig,
        llm: Box<dyn LlmGateway>,
        retrieval: Box<dyn RetrievalGateway>,
        web_search: Option<Box<dyn WebSearchGateway>>,
        store: Box<dyn ChatLogStore>,
    ) -> Self {
        Self {
            config,
            llm,
            retrieval,
            web_search,
            store,
            sessions: SessionRegistry::new(),
        }
    }
}

/// Assemble the full Axum router. The recipe dialog lives entirely on the WS
/// connection — there is no chat/webhook/OAuth HTTP surface here.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/ws", get(crate::ws::connection::ws_handler))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
