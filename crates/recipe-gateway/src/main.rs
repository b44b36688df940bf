use std::net::SocketAddr;
use std::sync::Arc;

use recipe_core::RecipeConfig;
use recipe_pipeline::gateway::{
    HttpLlmGateway, HttpRetrievalGateway, HttpWebSearchGateway, LlmGateway, NullLlmGateway,
    NullRetrievalGateway, RetrievalGateway, WebSearchGateway,
};
use recipe_sessions::{ChatLogStore, NoopChatLogStore, SqliteChatLogStore};
use rusqlite::Connection;
use tracing::{info, warn};

mod app;
mod http;
mod ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "recipe_gateway=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path > RECIPE_CONFIG env > ~/.recipe-assistant/recipe.toml
    let config_path = std::env::var("RECIPE_CONFIG").ok();
    let config = RecipeConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!(error = %e, "config load failed, using defaults");
        RecipeConfig::default()
    });

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let llm = build_llm_gateway(&config);
    let retrieval = build_retrieval_gateway(&config);
    let web_search = build_web_search_gateway(&config);
    let store = build_chat_log_store(&config);

    let state = Arc::new(app::AppState::new(config, llm, retrieval, web_search, store));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!(%addr, "recipe gateway listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

fn build_llm_gateway(config: &RecipeConfig) -> Box<dyn LlmGateway> {
    match &config.providers.llm {
        Some(p) => Box::new(HttpLlmGateway::new(p.base_url.clone(), p.api_key.clone(), p.model.clone())),
        None => {
            warn!("no LLM provider configured, running in degraded (keyword-fallback) mode");
            Box::new(NullLlmGateway)
        }
    }
}

fn build_retrieval_gateway(config: &RecipeConfig) -> Box<dyn RetrievalGateway> {
    match &config.providers.retrieval {
        Some(p) => Box::new(HttpRetrievalGateway::new(p.base_url.clone(), p.api_key.clone())),
        None => {
            warn!("no retrieval provider configured, every search routes straight to web search");
            Box::new(NullRetrievalGateway)
        }
    }
}

fn build_web_search_gateway(config: &RecipeConfig) -> Option<Box<dyn WebSearchGateway>> {
    config
        .providers
        .web_search
        .as_ref()
        .map(|p| Box::new(HttpWebSearchGateway::new(p.base_url.clone(), p.api_key.clone())) as Box<dyn WebSearchGateway>)
}

fn build_chat_log_store(config: &RecipeConfig) -> Box<dyn ChatLogStore> {
    let path = &config.database.path;
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    match Connection::open(path).map_err(|e| e.to_string()).and_then(|conn| {
        SqliteChatLogStore::new(conn).map_err(|e| e.to_string())
    }) {
        Ok(store) => Box::new(store),
        Err(e) => {
            warn!(error = %e, path = %path, "failed to open chat log database, persistence disabled");
            Box::new(NoopChatLogStore)
        }
    }
}
