use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use quill_types::api::{CountResponse, NotificationResponse, UpdatedResponse};
use quill_types::models::Identity;

use crate::convert;
use crate::error::ApiError;
use crate::state::{AppState, blocking, current_account};
use crate::validate;

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    #[serde(default = "validate::page_default")]
    pub limit: u32,
    #[serde(default)]
    pub unread_only: bool,
}

pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<NotificationResponse>>, ApiError> {
    let me = current_account(&state, &identity).await?;
    let limit = validate::clamp_limit(query.limit);
    let rows = blocking(&state, move |db| db.list_notifications(&me.id, limit, query.unread_only)).await?;
    Ok(Json(rows.into_iter().map(convert::notification).collect()))
}

pub async fn unread_count(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<CountResponse>, ApiError> {
    let me = current_account(&state, &identity).await?;
    let count = blocking(&state, move |db| db.unread_notification_count(&me.id)).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    let me = current_account(&state, &identity).await?;
    let updated = blocking(&state, move |db| db.mark_notification_read(&id.to_string(), &me.id)).await?;
    if !updated {
        return Err(ApiError::NotFound("notification"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<UpdatedResponse>, ApiError> {
    let me = current_account(&state, &identity).await?;
    let updated = blocking(&state, move |db| db.mark_all_notifications_read(&me.id)).await?;
    Ok(Json(UpdatedResponse { updated }))
}

pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    let me = current_account(&state, &identity).await?;
    let removed = blocking(&state, move |db| db.delete_notification(&id.to_string(), &me.id)).await?;
    if !removed {
        return Err(ApiError::NotFound("notification"));
    }
    Ok(StatusCode::NO_CONTENT)
}
