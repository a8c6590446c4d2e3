//! Send and pull endpoints for direct messages.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};

use crate::auth::{self, AuthUser};
use crate::mailbox::{MessageCreate, MessageDraft, Pagination};
use crate::server::AppState;

use super::{ApiError, PaginatedEnvelope};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/messages/:receiver_id", post(create_message_handler))
        .route("/api/v1/messages", get(list_messages_handler))
        .layer(middleware::from_fn_with_state(state.clone(), auth::middleware))
        .with_state(state)
}

/// POST /api/v1/messages/:receiver_id
///
/// Persist-then-push: 201 means the mailbox accepted the message,
/// independent of whether the receiver was online for a live push.
async fn create_message_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(receiver_id): Path<i64>,
    Json(draft): Json<MessageDraft>,
) -> Result<impl IntoResponse, ApiError> {
    if !state.contacts.are_contacts(user.id, receiver_id).await? {
        return Err(ApiError::Forbidden(
            "receiver is not in your contacts".to_owned(),
        ));
    }

    let create = MessageCreate::new(user.id, receiver_id, draft.content)
        .with_attachments(draft.attachments);
    let (message, _outcome) = state.coordinator.send(create).await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// GET /api/v1/messages?page=&limit=
///
/// The caller's parked messages in creation order, attachment paths
/// rewritten to signed URLs when a signer is configured.
async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(pagination): Query<Pagination>,
) -> Result<impl IntoResponse, ApiError> {
    let pagination = pagination.normalize();
    let (mut records, total_records) = state.mailbox.list_undelivered(user.id, &pagination).await?;

    if let Some(signer) = &state.signer {
        signer.sign_attachments(&mut records);
    }

    Ok(Json(PaginatedEnvelope {
        records,
        total_records,
    }))
}
