//! WebSocket upgrade endpoint feeding the realtime hub.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::{middleware, Extension, Router};
use tracing::info;

use ripple_realtime::{ConnectionActor, MAX_FRAME_SIZE};

use crate::auth::{self, AuthUser};
use crate::server::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::middleware))
        .with_state(state)
}

/// GET /ws
///
/// Upgrade and hand the socket to a connection actor bound to the
/// authenticated identity.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Response {
    info!(user_id = user.id, "websocket connection request");
    ws.max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| ConnectionActor::new(user.id, state.hub.clone()).run(socket))
}
