use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;
use uuid::Uuid;

use quill_db::models::{AccountRow, NewAccount, TransferOutcome};
use quill_types::api::{
    AccountResponse, AccountSummary, CreateAccountRequest, CreditResponse, DistributionReport, FollowResponse,
    TipRequest, TipResponse, UpdateAccountRequest,
};
use quill_types::models::{Identity, NotificationKind};

use crate::convert;
use crate::error::ApiError;
use crate::jobs;
use crate::middleware::ensure_admin;
use crate::state::{AppState, Notice, blocking, current_account, notify, push_credit};
use crate::validate::{self, Page};

/// Attach follower/following counts to a profile.
async fn profile(state: &AppState, row: AccountRow, own: bool) -> Result<AccountResponse, ApiError> {
    let id = row.id.clone();
    let counts = blocking(state, move |db| db.follow_counts(&id)).await?;
    Ok(convert::account(row, counts, own))
}

async fn account_by_id(state: &AppState, id: Uuid) -> Result<AccountRow, ApiError> {
    blocking(state, move |db| db.get_account(&id.to_string()))
        .await?
        .ok_or(ApiError::NotFound("account"))
}

pub async fn create_account(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate::username(&req.username)?;
    validate::optional("display_name", req.display_name.as_deref(), validate::DISPLAY_NAME_MAX)?;
    validate::optional("bio", req.bio.as_deref(), validate::BIO_MAX)?;
    validate::optional("avatar_url", req.avatar_url.as_deref(), validate::AVATAR_URL_MAX)?;

    let id = Uuid::new_v4().to_string();
    let row = blocking(&state, move |db| {
        if db.get_account_by_sub(&identity.sub)?.is_some() {
            return Ok(Err(ApiError::Conflict("account already exists")));
        }
        if db.get_account_by_username(&req.username)?.is_some() {
            return Ok(Err(ApiError::Conflict("username taken")));
        }
        db.create_account(&NewAccount {
            id: &id,
            auth_sub: &identity.sub,
            username: &req.username,
            display_name: req.display_name.as_deref().or(identity.name.as_deref()),
            bio: req.bio.as_deref(),
            avatar_url: req.avatar_url.as_deref(),
            email: identity.email.as_deref(),
        })?;
        Ok(db.get_account(&id)?.ok_or(ApiError::NotFound("account")))
    })
    .await??;

    info!("Account {} created for {}", row.username, row.auth_sub);
    Ok((StatusCode::CREATED, Json(convert::account(row, (0, 0), true))))
}

pub async fn get_me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<AccountResponse>, ApiError> {
    let row = current_account(&state, &identity).await?;
    Ok(Json(profile(&state, row, true).await?))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<UpdateAccountRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    validate::optional("display_name", req.display_name.as_deref(), validate::DISPLAY_NAME_MAX)?;
    validate::optional("bio", req.bio.as_deref(), validate::BIO_MAX)?;
    validate::optional("avatar_url", req.avatar_url.as_deref(), validate::AVATAR_URL_MAX)?;

    let me = current_account(&state, &identity).await?;
    let row = blocking(&state, move |db| {
        db.update_account(
            &me.id,
            req.display_name.as_deref(),
            req.bio.as_deref(),
            req.avatar_url.as_deref(),
        )?;
        db.get_account(&me.id)
    })
    .await?
    .ok_or(ApiError::NotFound("account"))?;

    Ok(Json(profile(&state, row, true).await?))
}

pub async fn delete_me(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    let me = current_account(&state, &identity).await?;
    let id = me.id.clone();
    blocking(&state, move |db| db.delete_account(&id)).await?;
    info!("Account {} deleted", me.username);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_account(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AccountResponse>, ApiError> {
    let row = account_by_id(&state, id).await?;
    Ok(Json(profile(&state, row, false).await?))
}

pub async fn get_by_username(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<Json<AccountResponse>, ApiError> {
    let row = blocking(&state, move |db| db.get_account_by_username(&username))
        .await?
        .ok_or(ApiError::NotFound("account"))?;
    Ok(Json(profile(&state, row, false).await?))
}

pub async fn follow(
    State(state): State<AppState>,
    Path(target): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<impl IntoResponse, ApiError> {
    let me = current_account(&state, &identity).await?;
    let me_id = convert::uuid(&me.id);
    if me_id == target {
        return Err(ApiError::bad_request("cannot follow yourself"));
    }
    let target_row = account_by_id(&state, target).await?;

    let follower = me.id.clone();
    let following = target_row.id.clone();
    let created = blocking(&state, move |db| {
        db.follow(&Uuid::new_v4().to_string(), &follower, &following)
    })
    .await?;
    if !created {
        return Err(ApiError::Conflict("already following"));
    }

    notify(
        &state,
        Notice::new(&target_row.id, NotificationKind::Follow, format!("{} started following you", me.username))
            .actor(&me.id),
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(FollowResponse {
            follower_id: me_id,
            following_id: target,
        }),
    ))
}

pub async fn unfollow(
    State(state): State<AppState>,
    Path(target): Path<Uuid>,
    Extension(identity): Extension<Identity>,
) -> Result<StatusCode, ApiError> {
    let me = current_account(&state, &identity).await?;
    let removed = blocking(&state, move |db| db.unfollow(&me.id, &target.to_string())).await?;
    if !removed {
        return Err(ApiError::NotFound("follow"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn followers(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<AccountSummary>>, ApiError> {
    let row = account_by_id(&state, id).await?;
    let limit = page.limit();
    let rows = blocking(&state, move |db| db.list_followers(&row.id, limit, page.offset)).await?;
    Ok(Json(rows.into_iter().map(convert::summary).collect()))
}

pub async fn following(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(page): Query<Page>,
) -> Result<Json<Vec<AccountSummary>>, ApiError> {
    let row = account_by_id(&state, id).await?;
    let limit = page.limit();
    let rows = blocking(&state, move |db| db.list_following(&row.id, limit, page.offset)).await?;
    Ok(Json(rows.into_iter().map(convert::summary).collect()))
}

pub async fn my_credit(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<CreditResponse>, ApiError> {
    let me = current_account(&state, &identity).await?;
    Ok(Json(CreditResponse { credit: me.credit }))
}

/// Move credit from the caller to another account.
pub async fn tip(
    State(state): State<AppState>,
    Path(target): Path<Uuid>,
    Extension(identity): Extension<Identity>,
    Json(req): Json<TipRequest>,
) -> Result<Json<TipResponse>, ApiError> {
    if req.amount <= 0 {
        return Err(ApiError::bad_request("amount must be positive"));
    }
    let me = current_account(&state, &identity).await?;
    if convert::uuid(&me.id) == target {
        return Err(ApiError::bad_request("cannot tip yourself"));
    }

    let from = me.id.clone();
    let to = target.to_string();
    let amount = req.amount;
    let (outcome, recipient_balance) = blocking(&state, move |db| {
        let outcome = db.transfer_credit(&from, &to, amount)?;
        let balance = match outcome {
            TransferOutcome::Done(_) => db.credit_balance(&to)?,
            _ => None,
        };
        Ok((outcome, balance))
    })
    .await?;

    let credit = match outcome {
        TransferOutcome::Done(balance) => balance,
        TransferOutcome::Insufficient => return Err(ApiError::bad_request("insufficient credit")),
        TransferOutcome::RecipientMissing => return Err(ApiError::NotFound("account")),
    };

    let recipient = target.to_string();
    push_credit(&state, &me.id, credit).await;
    if let Some(balance) = recipient_balance {
        push_credit(&state, &recipient, balance).await;
    }
    notify(
        &state,
        Notice::new(&recipient, NotificationKind::Tip, format!("{} tipped you {} credit", me.username, amount))
            .actor(&me.id),
    )
    .await;

    Ok(Json(TipResponse {
        recipient_id: target,
        amount,
        credit,
    }))
}

/// Operator trigger for the follow-reward pass.
pub async fn distribute_credits(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
) -> Result<Json<DistributionReport>, ApiError> {
    ensure_admin(&state, &identity)?;
    Ok(Json(jobs::distribute_follow_credits(&state).await?))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::test_support::{ADMIN_SUB, TestApp};

    #[tokio::test]
    async fn requests_without_a_token_are_unauthorized() {
        let app = TestApp::new();
        let (status, body) = app.get("/account/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");

        let (status, _) = app.get("/account/me", Some("garbage")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn profile_is_required_before_use() {
        let app = TestApp::new();
        let token = TestApp::token("auth0|nobody");
        let (status, body) = app.get("/account/me", Some(&token)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "account not found");
    }

    #[tokio::test]
    async fn create_and_read_profile() {
        let app = TestApp::new();
        let (token, id) = app.signup("alice").await;

        let (status, me) = app.get("/account/me", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "alice");
        assert_eq!(me["credit"], 0);
        assert_eq!(me["email"], "auth0|alice@example.com");

        let (status, public) = app.get(&format!("/account/{id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(public.get("credit").is_none());
        assert!(public.get("email").is_none());

        let (status, by_name) = app.get("/account/by-username/alice", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(by_name["id"], id);
    }

    #[tokio::test]
    async fn duplicate_accounts_conflict() {
        let app = TestApp::new();
        let (token, _) = app.signup("alice").await;

        let (status, _) = app.post("/account", Some(&token), json!({ "username": "alice2" })).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let other = TestApp::token("auth0|other");
        let (status, body) = app.post("/account", Some(&other), json!({ "username": "alice" })).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"], "username taken");

        let (status, _) = app.post("/account", Some(&other), json!({ "username": "a b" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_keeps_untouched_fields() {
        let app = TestApp::new();
        let (token, _) = app.signup("alice").await;

        app.patch("/account/me", Some(&token), json!({ "bio": "hello" })).await;
        let (status, me) = app
            .patch("/account/me", Some(&token), json!({ "display_name": "Alice" }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["bio"], "hello");
        assert_eq!(me["display_name"], "Alice");

        let (status, _) = app
            .patch("/account/me", Some(&token), json!({ "bio": "x".repeat(501) }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn follow_rules() {
        let app = TestApp::new();
        let (alice, alice_id) = app.signup("alice").await;
        let (bob, bob_id) = app.signup("bob").await;

        let (status, _) = app.post(&format!("/account/{bob_id}/follow"), Some(&alice), json!({})).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = app.post(&format!("/account/{bob_id}/follow"), Some(&alice), json!({})).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = app.post(&format!("/account/{alice_id}/follow"), Some(&alice), json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let missing = uuid::Uuid::new_v4();
        let (status, _) = app.post(&format!("/account/{missing}/follow"), Some(&alice), json!({})).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, followers) = app.get(&format!("/account/{bob_id}/followers"), None).await;
        assert_eq!(followers[0]["username"], "alice");
        let (_, profile) = app.get(&format!("/account/{bob_id}"), None).await;
        assert_eq!(profile["follower_count"], 1);

        let (_, notes) = app.get("/notifications", Some(&bob)).await;
        assert_eq!(notes[0]["kind"], "follow");
        assert_eq!(notes[0]["actor"]["username"], "alice");

        let (status, _) = app.delete(&format!("/account/{bob_id}/follow"), Some(&alice)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.delete(&format!("/account/{bob_id}/follow"), Some(&alice)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn tips_move_credit() {
        let app = TestApp::new();
        let (alice, alice_id) = app.signup("alice").await;
        let (bob, bob_id) = app.signup("bob").await;
        app.state.db.grant_credit(&alice_id, 10).unwrap();

        let (status, body) = app.post(&format!("/account/{bob_id}/tip"), Some(&alice), json!({ "amount": 4 })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["credit"], 6);

        let (_, credit) = app.get("/account/me/credit", Some(&bob)).await;
        assert_eq!(credit["credit"], 4);

        let (status, body) = app.post(&format!("/account/{bob_id}/tip"), Some(&alice), json!({ "amount": 7 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "insufficient credit");

        let (status, _) = app.post(&format!("/account/{alice_id}/tip"), Some(&alice), json!({ "amount": 1 })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn distribution_is_admin_only() {
        let app = TestApp::new();
        let (alice, _) = app.signup("alice").await;
        let (_, bob_id) = app.signup("bob").await;
        app.post(&format!("/account/{bob_id}/follow"), Some(&alice), json!({})).await;

        let (status, _) = app.post("/account/distribute-credits", Some(&alice), json!({})).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin = TestApp::token(ADMIN_SUB);
        let (status, report) = app.post("/account/distribute-credits", Some(&admin), json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["processed"], 1);
        assert_eq!(report["failed"], 0);
        assert_eq!(app.state.db.credit_balance(&bob_id).unwrap(), Some(1));
    }

    #[tokio::test]
    async fn deleting_the_profile() {
        let app = TestApp::new();
        let (token, id) = app.signup("alice").await;
        let (status, _) = app.delete("/account/me", Some(&token)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.get(&format!("/account/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deleting_the_profile_settles_counters_on_other_posts() {
        let app = TestApp::new();
        let (alice, _) = app.signup("alice").await;
        let (bob, _) = app.signup("bob").await;
        let (carol, _) = app.signup("carol").await;
        let post = app.create_post(&alice, "Survives").await;

        let (status, _) = app.post(&format!("/post/{post}/like"), Some(&bob), json!({})).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = app
            .post("/post/comment", Some(&bob), json!({ "post_id": post, "content": "hi" }))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let root = body["id"].as_str().unwrap().to_string();
        let (status, _) = app
            .post(
                "/post/comment",
                Some(&carol),
                json!({ "post_id": post, "parent_id": root, "content": "reply" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = app.delete("/account/me", Some(&bob)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = app.get(&format!("/post/{post}"), None).await;
        assert_eq!(body["likes"], 0);
        assert_eq!(body["comment_count"], 0);
        let (_, likers) = app.get(&format!("/post/{post}/likes"), None).await;
        assert_eq!(likers, json!([]));
        let (_, tree) = app.get(&format!("/post/{post}/comments"), None).await;
        assert_eq!(tree, json!([]));
    }
}
