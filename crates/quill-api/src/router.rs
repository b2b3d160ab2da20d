use axum::{
    Router, middleware,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{accounts, comments, gateway, messages, notifications, payment, posts, search, tts};

/// Assemble the full HTTP surface. Reads of public content, the MoMo webhook
/// and the gateway (which authenticates its own query token) stay outside
/// the bearer guard.
pub fn build(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/gateway", get(gateway::upgrade))
        .route("/account/{id}", get(accounts::get_account))
        .route("/account/by-username/{username}", get(accounts::get_by_username))
        .route("/account/{id}/followers", get(accounts::followers))
        .route("/account/{id}/following", get(accounts::following))
        .route("/post", get(posts::list_posts))
        .route("/post/{id}", get(posts::get_post))
        .route("/post/{id}/likes", get(posts::list_likes))
        .route("/post/{id}/comments", get(comments::list_comments))
        .route("/search", get(search::search))
        .route("/payment/momo/ipn", post(payment::momo_ipn));

    let protected_routes = Router::new()
        // Accounts
        .route("/account", post(accounts::create_account))
        .route(
            "/account/me",
            get(accounts::get_me).patch(accounts::update_me).delete(accounts::delete_me),
        )
        .route("/account/me/credit", get(accounts::my_credit))
        .route("/account/distribute-credits", post(accounts::distribute_credits))
        .route("/account/{id}/follow", post(accounts::follow).delete(accounts::unfollow))
        .route("/account/{id}/tip", post(accounts::tip))
        // Posts, likes, comments
        .route("/post", post(posts::create_post))
        .route("/post/feed", get(posts::feed))
        .route("/post/{id}", patch(posts::update_post).delete(posts::delete_post))
        .route("/post/{id}/like", post(posts::like_post).delete(posts::unlike_post))
        .route("/post/{id}/tts", get(tts::speak_post))
        .route("/post/comment", post(comments::create_comment))
        .route(
            "/post/comment/{id}",
            patch(comments::update_comment).delete(comments::delete_comment),
        )
        .route("/post/comment/{id}/vote", post(comments::vote))
        // Notifications
        .route("/notifications", get(notifications::list))
        .route("/notifications/unread-count", get(notifications::unread_count))
        .route("/notifications/read-all", patch(notifications::mark_all_read))
        .route("/notifications/{id}/read", patch(notifications::mark_read))
        .route("/notifications/{id}", delete(notifications::delete))
        // Direct messages
        .route("/messages", post(messages::send).get(messages::inbox))
        .route("/messages/{id}", get(messages::thread).delete(messages::delete))
        .route("/messages/{id}/read", patch(messages::mark_read))
        // Payments
        .route("/payment", post(payment::create_payment).get(payment::list_payments))
        .route("/payment/retry-credits", post(payment::retry_credits))
        .route("/payment/{order_id}", get(payment::get_payment))
        // Proxies
        .route("/tts", post(tts::speak))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
