use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health — liveness probe. Reports process metadata and the count of
/// currently open dialog sessions; does not reach into any external gateway
/// (the core never blocks startup or health checks on provider reachability).
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "open_sessions": state.sessions.len(),
        "pipeline_deadline_secs": state.config.pipeline.deadline_secs,
        "retrieval_top_k": state.config.pipeline.retrieval_top_k,
        "web_search_configured": state.web_search.is_some(),
    }))
}
