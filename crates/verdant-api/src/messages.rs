use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use verdant_lifecycle::NewMessage;
use verdant_types::api::{Claims, MessageResponse, SendMessageRequest};

use crate::auth::AppState;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct ConversationQuery {
    pub limit: Option<u32>,
    /// Cursor: `created_at` of the oldest message from the previous page.
    pub before: Option<DateTime<Utc>>,
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    let recipient = req.recipient_id;
    let message = state
        .messages
        .send(claims.sub, recipient, NewMessage::from(req))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::redacted(&message, state.clock.now())),
    ))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Path(other): Path<Uuid>,
    Query(query): Query<ConversationQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<Vec<MessageResponse>>> {
    let messages = state
        .messages
        .conversation(claims.sub, other, query.limit, query.before)
        .await?;

    let now = state.clock.now();
    Ok(Json(
        messages
            .iter()
            .map(|m| MessageResponse::redacted(m, now))
            .collect(),
    ))
}

pub async fn get_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MessageResponse>> {
    let message = state.messages.get(message_id, claims.sub).await?;
    Ok(Json(MessageResponse::redacted(&message, state.clock.now())))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MessageResponse>> {
    let message = state.messages.mark_viewed(message_id, claims.sub).await?;
    Ok(Json(MessageResponse::redacted(&message, state.clock.now())))
}

pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<MessageResponse>> {
    let message = state.messages.soft_delete(message_id, claims.sub).await?;
    Ok(Json(MessageResponse::redacted(&message, state.clock.now())))
}
