//! # Live Change Notifications
//!
//! - **GET `/ws?token=<jwt>`** — WebSocket that forwards every
//!   `data_change` event as a JSON text frame
//!
//! Browsers cannot set headers on a WebSocket handshake, so the bearer token
//! travels in the query string and is checked here rather than by the auth
//! middleware. A client that falls behind receives
//! `{"type":"lagged","missed":n}` and should refetch.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::sync::broadcast;
use utoipa::IntoParams;

use crate::auth::{authenticate, CallerIdentity};
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize, IntoParams)]
pub struct WsQuery {
    pub token: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// GET /ws — Subscribe to change notifications.
#[utoipa::path(
    get,
    path = "/ws",
    params(WsQuery),
    responses(
        (status = 101, description = "Switching protocols"),
        (status = 401, description = "Missing or invalid token", body = crate::error::ErrorBody),
    ),
    tag = "notifications"
)]
async fn ws_handler(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("missing token".into()))?;
    let caller = authenticate(&state, &token)?;
    Ok(upgrade.on_upgrade(move |socket| forward_events(socket, state, caller)))
}

async fn forward_events(mut socket: WebSocket, state: AppState, caller: CallerIdentity) {
    let mut rx = state.notifier.subscribe();
    tracing::debug!(username = %caller.username, "notification client connected");

    let hello = serde_json::json!({ "type": "connected", "username": caller.username });
    if socket.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            event = rx.recv() => {
                let frame = match event {
                    Ok(event) => match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to encode change event");
                            continue;
                        }
                    },
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        serde_json::json!({ "type": "lagged", "missed": missed }).to_string()
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if socket.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }
    tracing::debug!(username = %caller.username, "notification client disconnected");
}
