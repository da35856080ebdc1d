//! WebSocket connection lifecycle.
//!
//! Authentication happens at the upgrade; a socket that presents no valid
//! token never reaches the event loop. Each connection gets a read loop
//! plus a forwarding task that drains the session's outbound channel.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::Identity;
use crate::http::routes::AppState;
use crate::ws::events::{decode_frame, Decoded, ServerEvent};
use crate::ws::handlers::{self, SessionCtx};

#[derive(Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    Query(WsQuery { token }): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match state.auth.verify(token.as_deref()) {
        Ok(identity) => ws.on_upgrade(move |socket| handle_socket(state, identity, socket)),
        Err(err) => (StatusCode::UNAUTHORIZED, err.to_string()).into_response(),
    }
}

async fn handle_socket(state: AppState, identity: Identity, socket: WebSocket) {
    let session_id = Uuid::new_v4();
    let (ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    state.registry.register_session(session_id, tx);
    info!(%session_id, user_id = identity.user_id, "session opened");

    // Forward outbound events to the socket. Ends when the session handle
    // (the only sender) is dropped at unregister time.
    let forward = tokio::spawn(async move {
        let mut ws_tx = ws_tx;
        while let Some(event) = rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if ws_tx.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(%err, "dropping unencodable event"),
            }
        }
    });

    let ctx = SessionCtx {
        session_id,
        user_id: identity.user_id,
        email: identity.email,
    };
    while let Some(Ok(msg)) = ws_rx.next().await {
        match msg {
            Message::Text(text) => match decode_frame(&text) {
                Decoded::Event(event) => handlers::dispatch(&state, &ctx, event).await,
                Decoded::Malformed { event } => {
                    debug!(%session_id, %event, "malformed frame");
                    state
                        .registry
                        .send_to(session_id, ServerEvent::error(event, "BAD_REQUEST"));
                }
            },
            Message::Close(_) => break,
            Message::Binary(_) | Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // Cleanup runs unconditionally; emission failures cannot keep a dead
    // session's rooms alive.
    let changed = state.registry.unregister_session(session_id);
    if changed {
        let list = state.registry.waiting_rooms();
        state.registry.broadcast(ServerEvent::RoomsListUpdated(list));
    }
    let _ = forward.await;
    info!(%session_id, "session closed");
}
