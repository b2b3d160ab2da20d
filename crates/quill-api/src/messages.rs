use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use quill_types::api::{ConversationSummary, MessageResponse, SendMessageRequest};
use quill_types::events::GatewayEvent;
use quill_types::models::{Identity, NotificationKind};

use crate::convert;
use crate::error::ApiError;
use crate::state::{AppState, Notice, blocking, current_account, notify};
use crate::validate;

#[derive(Debug, Deserialize)]
pub struct ThreadQuery {
    #[serde(default = "validate::page_default")]
    pub limit: u32,
    /// Cursor-based pagination: the `created_at` of the oldest message already seen.
    pub before: Option<String>,
}

pub async fn send(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate::text("content", &req.content, validate::SHORT_TEXT_MAX)?;
    let me = current_account(&state, &identity).await?;
    if convert::uuid(&me.id) == req.recipient_id {
        return Err(ApiError::bad_request("cannot message yourself"));
    }

    let id = Uuid::new_v4().to_string();
    let (sender, recipient) = (me.id.clone(), req.recipient_id.to_string());
    let row = blocking(&state, move |db| {
        if db.get_account(&recipient)?.is_none() {
            return Ok(None);
        }
        db.insert_message(&id, &sender, &recipient, &req.content)?;
        db.get_message(&id)
    })
    .await?
    .ok_or(ApiError::NotFound("account"))?;

    let message = convert::message(row);
    state
        .dispatcher
        .send_to(message.recipient_id, GatewayEvent::MessageCreate(message.clone()))
        .await;
    notify(
        &state,
        Notice::new(
            message.recipient_id.to_string(),
            NotificationKind::Message,
            format!("New message from {}", me.username),
        )
        .actor(&me.id),
    )
    .await;

    Ok((StatusCode::CREATED, Json(message)))
}

/// One entry per counterpart, most recent conversation first.
pub async fn inbox(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let me = current_account(&state, &identity).await?;
    let rows = blocking(&state, move |db| db.list_conversations(&me.id)).await?;
    Ok(Json(rows.into_iter().map(convert::conversation).collect()))
}

/// Messages exchanged with one account, newest first. Opening the thread
/// marks what they sent as read.
pub async fn thread(
    State(state): State<AppState>,
    Path(counterpart): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<Vec<MessageResponse>>, ApiError> {
    let me = current_account(&state, &identity).await?;
    let before = query.before.as_deref().map(convert::cursor).transpose()?;
    let limit = validate::clamp_limit(query.limit);

    let rows = blocking(&state, move |db| {
        let counterpart = counterpart.to_string();
        let rows = db.get_thread(&me.id, &counterpart, limit, before.as_deref())?;
        db.mark_thread_read(&me.id, &counterpart)?;
        Ok(rows)
    })
    .await?;
    Ok(Json(rows.into_iter().map(convert::message).collect()))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    let me = current_account(&state, &identity).await?;
    let updated = blocking(&state, move |db| db.mark_message_read(&id.to_string(), &me.id)).await?;
    if !updated {
        return Err(ApiError::NotFound("message"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    let me = current_account(&state, &identity).await?;
    let removed = blocking(&state, move |db| db.delete_message(&id.to_string(), &me.id)).await?;
    if !removed {
        return Err(ApiError::NotFound("message"));
    }
    Ok(StatusCode::NO_CONTENT)
}
