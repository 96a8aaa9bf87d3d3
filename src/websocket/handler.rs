use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::events::{GatewayMessage, GatewayOp};
use crate::{
    auth::{validate_token, TokenType},
    models::Id,
    state::AppState,
};

// ============================================================================
// Query params
// ============================================================================

/// JWT is passed as a query parameter because WebSocket upgrade requests are
/// plain GET requests and cannot carry an Authorization header reliably
/// across all client environments.
///
/// Note: query-parameter tokens appear in server and proxy access logs; use
/// short-lived access tokens to limit exposure.
#[derive(Debug, serde::Deserialize)]
pub struct WsParams {
    pub token: String,
}

// ============================================================================
// Upgrade handler
// ============================================================================

/// GET /ws?token=<access_token> — upgrade to a WebSocket connection.
///
/// The JWT is validated before the upgrade is accepted; invalid tokens get a
/// plain 401 without an upgrade attempt.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let claims = match validate_token(&params.token, &state.config.jwt_secret) {
        Ok(c) => c,
        Err(_) => {
            return (StatusCode::UNAUTHORIZED, "Invalid or expired token").into_response();
        }
    };

    // Reject refresh tokens used as WebSocket credentials.
    if claims.token_type != TokenType::Access {
        return (StatusCode::UNAUTHORIZED, "Access token required").into_response();
    }

    let user_id = match claims.user_id() {
        Ok(id) => id,
        Err(_) => {
            return (StatusCode::UNAUTHORIZED, "Invalid token subject").into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

// ============================================================================
// Connection lifecycle
// ============================================================================

/// One connection per user; a reconnect silently replaces the previous
/// sender in [`super::ConnectionManager`] rather than tracking per-socket
/// connection ids — this server only ever delivers `Event`s addressed to a
/// channel or a user, never to "this specific tab", so there's nothing a
/// second id would buy.
async fn handle_socket(socket: WebSocket, user_id: Id, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    state.connections.add(user_id, tx).await;
    set_online(&state, user_id, "online").await;

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    let state_clone = state.clone();
    let mut recv_task = tokio::spawn(async move {
        loop {
            match ws_receiver.next().await {
                Some(Ok(Message::Text(text))) => {
                    handle_client_message(user_id, &text, &state_clone).await;
                }
                Some(Ok(Message::Close(_))) => break,
                // Axum handles Ping/Pong frames transparently.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(user_id = %user_id, error = ?e, "websocket receive error; closing connection");
                    break;
                }
                None => break,
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.connections.remove(user_id).await;
    set_online(&state, user_id, "offline").await;
}

// ============================================================================
// Inbound message handling
// ============================================================================

/// Process a text frame received from the client. The only client→server
/// opcode this gateway accepts is `Heartbeat`; every other frame is either
/// server→client only or unparseable, and is ignored rather than
/// disconnecting the socket.
async fn handle_client_message(user_id: Id, text: &str, state: &AppState) {
    let Ok(msg) = serde_json::from_str::<GatewayMessage>(text) else {
        return;
    };

    if msg.op == GatewayOp::Heartbeat {
        let ack = GatewayMessage::heartbeat_ack();
        if let Ok(json) = serde_json::to_string(&ack) {
            state.connections.send_to_user(user_id, &json).await;
        }
    }
}

// ============================================================================
// Presence
// ============================================================================

/// Upserts `user_id`'s row in `statuses` (spec §6.2 `Status.GetOnline`).
/// Failures are logged, never surfaced — a stale status is a cosmetic
/// problem, not a reason to drop the socket.
async fn set_online(state: &AppState, user_id: Id, status: &str) {
    if let Err(e) = sqlx::query(
        "INSERT INTO statuses (user_id, status) VALUES ($1, $2)
         ON CONFLICT (user_id) DO UPDATE SET status = EXCLUDED.status",
    )
    .bind(user_id)
    .bind(status)
    .execute(&state.pool)
    .await
    {
        tracing::warn!(user_id = %user_id, error = ?e, "failed to persist presence status");
    }
}
