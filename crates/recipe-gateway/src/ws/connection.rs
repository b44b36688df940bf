use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use recipe_core::SessionId;
use recipe_pipeline::{DialogController, StageTracker};
use recipe_protocol::{InboundFrame, OutboundFrame};
use recipe_sessions::DialogSession;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::AppState;

const PROGRESS_TICK_SECS: u64 = 1;

/// Axum handler — upgrades HTTP to WebSocket at GET /ws. Each connection
/// drives one dialog session end to end (§2, §5): the client opens the
/// channel, sends `init_context`, then a sequence of `user_message` /
/// `*_confirmation` frames, each of which gets exactly one terminal reply.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_connection(socket, state))
}

/// Per-connection task — lives for the entire WS session lifetime. Owns the
/// `DialogSession` itself; nothing about a session's domain state is ever
/// published outside this task (§5, §9).
async fn handle_connection(socket: WebSocket, state: Arc<AppState>) {
    let session_id = SessionId::new();
    info!(session_id = %session_id, "new WS connection");

    // Cancelled on disconnect by `SessionRegistry::remove`. A per-request
    // child token (see `dispatch`) is what a deadline expiry cancels, so a
    // single pipeline timeout never tears down frames the client sends after it.
    let conn_cancel = state.sessions.insert(session_id.clone());
    let mut session = DialogSession::new(session_id.clone());

    let (mut tx, mut rx) = socket.split();

    loop {
        let msg = tokio::select! {
            msg = rx.next() => msg,
            _ = conn_cancel.cancelled() => break,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                let text_ref: &str = &text;
                if text_ref.len() > recipe_core::config::MAX_PAYLOAD_BYTES {
                    warn!(%session_id, size = text_ref.len(), "payload too large, dropping connection");
                    break;
                }

                let frame: InboundFrame = match serde_json::from_str(text_ref) {
                    Ok(f) => f,
                    Err(e) => {
                        // Protocol violation (§7 category 4): logged, ignored, session state unchanged.
                        warn!(%session_id, error = %e, "malformed inbound frame, ignoring");
                        continue;
                    }
                };

                if needs_thinking_frame(&frame) {
                    if send_frame(&mut tx, &OutboundFrame::Thinking { message: None }).await.is_err() {
                        break;
                    }
                }

                let request_cancel = conn_cancel.child_token();
                let outbound = dispatch(&state, &mut session, frame, &request_cancel, &mut tx).await;
                let mut send_failed = false;
                for frame in outbound {
                    if send_frame(&mut tx, &frame).await.is_err() {
                        send_failed = true;
                        break;
                    }
                }
                if send_failed {
                    break;
                }
            }
            Some(Ok(Message::Ping(data))) => {
                let _ = tx.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Close(_))) | None => break,
            Some(Err(e)) => {
                warn!(%session_id, error = %e, "WS read error, closing connection");
                break;
            }
            _ => {}
        }
    }

    state.sessions.remove(&session_id);
    info!(%session_id, "WS connection closed");
}

fn needs_thinking_frame(frame: &InboundFrame) -> bool {
    matches!(
        frame,
        InboundFrame::UserMessage { .. }
            | InboundFrame::ConstraintConfirmation { .. }
            | InboundFrame::AllergyConfirmation { .. }
    )
}

/// Route one inbound frame to the dialog controller, bounding any pipeline
/// work by the configured per-request deadline and running the progress
/// emitter concurrently with it — the one piece of intra-request concurrency
/// the core exposes (§4.4, §9 "Design Notes"). `request_cancel` is a child of
/// the connection's token: a timeout here only ever cancels this one request.
async fn dispatch(
    state: &Arc<AppState>,
    session: &mut DialogSession,
    frame: InboundFrame,
    request_cancel: &CancellationToken,
    tx: &mut SplitSink<WebSocket, Message>,
) -> Vec<OutboundFrame> {
    let controller = DialogController {
        llm: &*state.llm,
        retrieval: &*state.retrieval,
        web_search: state.web_search.as_deref(),
        store: &*state.store,
        top_k: state.config.pipeline.retrieval_top_k,
        rerank: state.config.pipeline.rerank_enabled,
    };

    let tracker = StageTracker::new();
    let deadline = Duration::from_secs(state.config.pipeline.deadline_secs);

    let handle_fut = controller.handle(session, frame, request_cancel, Some(&tracker));
    tokio::pin!(handle_fut);
    let sleep = tokio::time::sleep(deadline);
    tokio::pin!(sleep);

    let mut progress_tick = tokio::time::interval(Duration::from_secs(PROGRESS_TICK_SECS));
    progress_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    progress_tick.tick().await; // discard the immediate first tick

    loop {
        tokio::select! {
            frames = &mut handle_fut => return frames,
            _ = &mut sleep => {
                request_cancel.cancel();
                return handle_fut.await;
            }
            _ = progress_tick.tick() => {
                let (stage, elapsed) = tracker.snapshot();
                if let Some(stage) = stage {
                    let progress = OutboundFrame::Progress {
                        message: format!("{stage} 단계 처리 중"),
                        elapsed_secs: elapsed,
                    };
                    if send_frame(tx, &progress).await.is_err() {
                        return handle_fut.await;
                    }
                }
            }
        }
    }
}

async fn send_frame(
    tx: &mut SplitSink<WebSocket, Message>,
    frame: &OutboundFrame,
) -> Result<(), axum::Error> {
    crate::ws::send::json(tx, frame).await
}
