use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use quill_db::models::{PostFilter, PostRow};
use quill_types::api::{AccountSummary, CreatePostRequest, LikeResponse, PostResponse, UpdatePostRequest};
use quill_types::models::{Identity, NotificationKind};

use crate::convert;
use crate::error::ApiError;
use crate::search::{self, PostDocument};
use crate::state::{AppState, Notice, blocking, current_account, notify, notify_many};
use crate::validate::{self, Page};

#[derive(Debug, Deserialize)]
pub struct PostQuery {
    #[serde(default = "validate::page_default")]
    pub limit: u32,
    /// Only posts created strictly before this RFC 3339 timestamp.
    pub before: Option<String>,
    pub author: Option<Uuid>,
}

async fn post_by_id(state: &AppState, id: Uuid) -> Result<PostRow, ApiError> {
    blocking(state, move |db| db.get_post(&id.to_string()))
        .await?
        .ok_or(ApiError::NotFound("post"))
}

/// Post lookup restricted to its author.
async fn own_post(state: &AppState, id: Uuid, identity: &Identity) -> Result<PostRow, ApiError> {
    let me = current_account(state, identity).await?;
    let post = post_by_id(state, id).await?;
    if post.author.id != me.id {
        return Err(ApiError::Forbidden("only the author can change this post"));
    }
    Ok(post)
}

async fn list(state: &AppState, query: PostQuery, followed_by: Option<String>) -> Result<Vec<PostResponse>, ApiError> {
    let before = query.before.as_deref().map(convert::cursor).transpose()?;
    let author = query.author.map(|id| id.to_string());
    let limit = validate::clamp_limit(query.limit);

    let rows = blocking(state, move |db| {
        db.list_posts(&PostFilter {
            limit,
            before: before.as_deref(),
            author_id: author.as_deref(),
            followed_by: followed_by.as_deref(),
        })
    })
    .await?;
    Ok(rows.into_iter().map(convert::post).collect())
}

pub async fn create_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate::text("title", &req.title, validate::TITLE_MAX)?;
    validate::text("content", &req.content, validate::POST_CONTENT_MAX)?;
    validate::tags(&req.tags)?;

    let me = current_account(&state, &identity).await?;
    let id = Uuid::new_v4().to_string();
    let author = me.id.clone();
    let (post, followers) = blocking(&state, move |db| {
        db.create_post(&id, &author, &req.title, &req.content, &req.tags)?;
        let post = db.get_post(&id)?;
        let followers = db.follower_ids(&author)?;
        Ok((post, followers))
    })
    .await?;
    let post = post.ok_or(ApiError::NotFound("post"))?;

    debug!("{} published {} to {} followers", me.username, post.id, followers.len());
    let notices = followers
        .into_iter()
        .map(|follower| {
            Notice::new(follower, NotificationKind::NewPost, format!("{} published \"{}\"", me.username, post.title))
                .actor(&me.id)
                .post(&post.id)
        })
        .collect();
    notify_many(&state, notices).await;
    search::spawn_index(&state, PostDocument::from(&post));

    Ok((StatusCode::CREATED, Json(convert::post(post))))
}

pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<PostQuery>,
) -> Result<Json<Vec<PostResponse>>, ApiError> {
    Ok(Json(list(&state, query, None).await?))
}

/// Posts by the accounts the caller follows.
pub async fn feed(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Query(query): Query<PostQuery>,
) -> Result<Json<Vec<PostResponse>>, ApiError> {
    let me = current_account(&state, &identity).await?;
    Ok(Json(list(&state, query, Some(me.id)).await?))
}

/// Fetching a post counts as a view.
pub async fn get_post(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<PostResponse>, ApiError> {
    let post = blocking(&state, move |db| {
        let id = id.to_string();
        if !db.increment_views(&id)? {
            return Ok(None);
        }
        db.get_post(&id)
    })
    .await?
    .ok_or(ApiError::NotFound("post"))?;
    Ok(Json(convert::post(post)))
}

pub async fn update_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<UpdatePostRequest>,
) -> Result<Json<PostResponse>, ApiError> {
    if let Some(title) = &req.title {
        validate::text("title", title, validate::TITLE_MAX)?;
    }
    if let Some(content) = &req.content {
        validate::text("content", content, validate::POST_CONTENT_MAX)?;
    }
    if let Some(tags) = &req.tags {
        validate::tags(tags)?;
    }

    let post = own_post(&state, id, &identity).await?;
    let post = blocking(&state, move |db| {
        db.update_post(&post.id, req.title.as_deref(), req.content.as_deref(), req.tags.as_deref())?;
        db.get_post(&post.id)
    })
    .await?
    .ok_or(ApiError::NotFound("post"))?;

    search::spawn_index(&state, PostDocument::from(&post));
    Ok(Json(convert::post(post)))
}

pub async fn delete_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    let post = own_post(&state, id, &identity).await?;
    let post_id = post.id.clone();
    blocking(&state, move |db| db.delete_post(&post_id)).await?;

    search::spawn_remove(&state, post.id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn like_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let me = current_account(&state, &identity).await?;
    let post = post_by_id(&state, id).await?;

    let (post_id, user_id) = (post.id.clone(), me.id.clone());
    let likes = blocking(&state, move |db| db.like_post(&Uuid::new_v4().to_string(), &post_id, &user_id))
        .await?
        .ok_or(ApiError::Conflict("already liked"))?;

    if post.author.id != me.id {
        notify(
            &state,
            Notice::new(&post.author.id, NotificationKind::Like, format!("{} liked \"{}\"", me.username, post.title))
                .actor(&me.id)
                .post(&post.id),
        )
        .await;
    }

    Ok((StatusCode::CREATED, Json(LikeResponse { post_id: id, likes })))
}

pub async fn unlike_post(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    let me = current_account(&state, &identity).await?;
    let post = post_by_id(&state, id).await?;
    blocking(&state, move |db| db.unlike_post(&post.id, &me.id))
        .await?
        .ok_or(ApiError::NotFound("like"))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_likes(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<AccountSummary>>, ApiError> {
    let post = post_by_id(&state, id).await?;
    let limit = page.limit();
    let rows = blocking(&state, move |db| db.list_likers(&post.id, limit, page.offset)).await?;
    Ok(Json(rows.into_iter().map(convert::summary).collect()))
}
