use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use quill_db::models::{CommentRow, Vote};
use quill_types::api::{CommentNode, CreateCommentRequest, UpdateCommentRequest, VoteRequest, VoteResponse};
use quill_types::models::{Identity, NotificationKind};

use crate::convert;
use crate::error::ApiError;
use crate::state::{AppState, Notice, blocking, current_account, notify};
use crate::validate;

async fn comment_by_id(state: &AppState, id: Uuid) -> Result<CommentRow, ApiError> {
    blocking(state, move |db| db.get_comment(&id.to_string()))
        .await?
        .ok_or(ApiError::NotFound("comment"))
}

async fn own_comment(state: &AppState, id: Uuid, identity: &Identity) -> Result<CommentRow, ApiError> {
    let me = current_account(state, identity).await?;
    let comment = comment_by_id(state, id).await?;
    if comment.author.id != me.id {
        return Err(ApiError::Forbidden("only the author can change this comment"));
    }
    Ok(comment)
}

/// Comment on a post, or reply to a comment when `parent_id` is set.
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate::text("content", &req.content, validate::SHORT_TEXT_MAX)?;
    let me = current_account(&state, &identity).await?;

    let post_id = req.post_id.to_string();
    let post = blocking(&state, move |db| db.get_post(&post_id))
        .await?
        .ok_or(ApiError::NotFound("post"))?;

    let parent = match req.parent_id {
        Some(parent_id) => {
            let parent = comment_by_id(&state, parent_id).await?;
            if parent.post_id != post.id {
                return Err(ApiError::bad_request("parent comment belongs to another post"));
            }
            Some(parent)
        }
        None => None,
    };

    let id = Uuid::new_v4().to_string();
    let (post_id, author, parent_id) = (post.id.clone(), me.id.clone(), parent.as_ref().map(|p| p.id.clone()));
    let comment = blocking(&state, move |db| {
        db.create_comment(&id, &post_id, &author, parent_id.as_deref(), &req.content)?;
        db.get_comment(&id)
    })
    .await?
    .ok_or(ApiError::NotFound("comment"))?;

    let notice = match &parent {
        Some(parent) => (parent.author.id != me.id).then(|| {
            Notice::new(&parent.author.id, NotificationKind::Reply, format!("{} replied to your comment", me.username))
        }),
        None => (post.author.id != me.id).then(|| {
            Notice::new(&post.author.id, NotificationKind::Comment, format!("{} commented on \"{}\"", me.username, post.title))
        }),
    };
    if let Some(notice) = notice {
        notify(&state, notice.actor(&me.id).post(&post.id).comment(&comment.id)).await;
    }

    Ok((StatusCode::CREATED, Json(convert::comment_leaf(comment))))
}

/// The post's comments as a tree, roots oldest first.
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
) -> Result<Json<Vec<CommentNode>>, ApiError> {
    let rows = blocking(&state, move |db| {
        let post_id = post_id.to_string();
        if db.get_post(&post_id)?.is_none() {
            return Ok(None);
        }
        db.comments_for_post(&post_id).map(Some)
    })
    .await?
    .ok_or(ApiError::NotFound("post"))?;
    Ok(Json(convert::comment_tree(rows)))
}

pub async fn update_comment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<UpdateCommentRequest>,
) -> Result<Json<CommentNode>, ApiError> {
    validate::text("content", &req.content, validate::SHORT_TEXT_MAX)?;
    let comment = own_comment(&state, id, &identity).await?;
    let comment = blocking(&state, move |db| {
        db.update_comment(&comment.id, &req.content)?;
        db.get_comment(&comment.id)
    })
    .await?
    .ok_or(ApiError::NotFound("comment"))?;
    Ok(Json(convert::comment_leaf(comment)))
}

/// Removes the comment together with every reply beneath it.
pub async fn delete_comment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    let comment = own_comment(&state, id, &identity).await?;
    let removed = blocking(&state, move |db| db.delete_comment(&comment.id)).await?;
    if removed == 0 {
        return Err(ApiError::NotFound("comment"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn vote(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(_identity): Extension<Identity>,
    Json(req): Json<VoteRequest>,
) -> Result<Json<VoteResponse>, ApiError> {
    let vote = match req.value {
        1 => Vote::Up,
        -1 => Vote::Down,
        _ => return Err(ApiError::bad_request("value must be 1 or -1")),
    };
    let (upvotes, downvotes) = blocking(&state, move |db| db.vote_comment(&id.to_string(), vote))
        .await?
        .ok_or(ApiError::NotFound("comment"))?;
    Ok(Json(VoteResponse { upvotes, downvotes }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::{Value, json};

    use crate::test_support::TestApp;

    async fn comment(app: &TestApp, token: &str, post: &str, parent: Option<&str>, text: &str) -> String {
        let (status, body) = app
            .post(
                "/post/comment",
                Some(token),
                json!({ "post_id": post, "parent_id": parent, "content": text }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["id"].as_str().unwrap().to_string()
    }

    async fn comment_count(app: &TestApp, post: &str) -> Value {
        let (_, body) = app.get(&format!("/post/{post}"), None).await;
        body["comment_count"].clone()
    }

    #[tokio::test]
    async fn replies_nest_and_notify() {
        let app = TestApp::new();
        let (alice, _) = app.signup("alice").await;
        let (bob, _) = app.signup("bob").await;
        let post = app.create_post(&alice, "Thread").await;

        let root = comment(&app, &bob, &post, None, "first").await;
        let reply = comment(&app, &alice, &post, Some(&root), "answer").await;
        comment(&app, &bob, &post, Some(&reply), "thanks").await;

        let (status, tree) = app.get(&format!("/post/{post}/comments"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(tree.as_array().unwrap().len(), 1);
        assert_eq!(tree[0]["content"], "first");
        assert_eq!(tree[0]["replies"][0]["content"], "answer");
        assert_eq!(tree[0]["replies"][0]["replies"][0]["content"], "thanks");

        let (_, alice_notes) = app.get("/notifications", Some(&alice)).await;
        let kinds: Vec<&str> = alice_notes
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["kind"].as_str().unwrap())
            .collect();
        assert_eq!(kinds, ["reply", "comment"]);

        let (_, bob_notes) = app.get("/notifications", Some(&bob)).await;
        assert_eq!(bob_notes[0]["kind"], "reply");
        assert_eq!(bob_notes[0]["post_id"], post.as_str());
    }

    #[tokio::test]
    async fn parent_must_share_the_post() {
        let app = TestApp::new();
        let (alice, _) = app.signup("alice").await;
        let first = app.create_post(&alice, "One").await;
        let second = app.create_post(&alice, "Two").await;
        let root = comment(&app, &alice, &first, None, "hi").await;

        let (status, _) = app
            .post("/post/comment", Some(&alice), json!({ "post_id": second, "parent_id": root, "content": "x" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing = uuid::Uuid::new_v4();
        let (status, _) = app
            .post("/post/comment", Some(&alice), json!({ "post_id": missing, "content": "x" }))
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleting_removes_the_subtree() {
        let app = TestApp::new();
        let (alice, _) = app.signup("alice").await;
        let post = app.create_post(&alice, "Thread").await;

        let root = comment(&app, &alice, &post, None, "root").await;
        let child = comment(&app, &alice, &post, Some(&root), "child").await;
        comment(&app, &alice, &post, Some(&child), "grandchild").await;
        comment(&app, &alice, &post, None, "sibling").await;
        assert_eq!(comment_count(&app, &post).await, 4);

        let (status, _) = app.delete(&format!("/post/comment/{root}"), Some(&alice)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert_eq!(comment_count(&app, &post).await, 1);

        let (_, tree) = app.get(&format!("/post/{post}/comments"), None).await;
        assert_eq!(tree.as_array().unwrap().len(), 1);
        assert_eq!(tree[0]["content"], "sibling");

        let (status, _) = app.delete(&format!("/post/comment/{child}"), Some(&alice)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn edits_and_votes() {
        let app = TestApp::new();
        let (alice, _) = app.signup("alice").await;
        let (bob, _) = app.signup("bob").await;
        let post = app.create_post(&alice, "Votes").await;
        let id = comment(&app, &alice, &post, None, "typo").await;

        let (status, _) = app.patch(&format!("/post/comment/{id}"), Some(&bob), json!({ "content": "hijack" })).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, body) = app.patch(&format!("/post/comment/{id}"), Some(&alice), json!({ "content": "fixed" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "fixed");

        app.post(&format!("/post/comment/{id}/vote"), Some(&bob), json!({ "value": 1 })).await;
        let (status, body) = app.post(&format!("/post/comment/{id}/vote"), Some(&bob), json!({ "value": -1 })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "upvotes": 1, "downvotes": 1 }));

        for value in [2, 0, -2] {
            let (status, _) = app
                .post(&format!("/post/comment/{id}/vote"), Some(&bob), json!({ "value": value }))
                .await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
        }
        let (_, tree) = app.get(&format!("/post/{post}/comments"), None).await;
        assert_eq!(tree[0]["upvotes"], 1);
        assert_eq!(tree[0]["downvotes"], 1);
    }
}
