use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use quill_types::models::Identity;

use crate::error::ApiError;
use crate::state::AppState;

/// Verify the bearer token and stash the caller's [`Identity`] in the request
/// extensions.
pub async fn require_auth(State(state): State<AppState>, mut req: Request, next: Next) -> Result<Response, ApiError> {
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or(ApiError::Unauthorized)?;

    let identity = state.auth.authenticate(bearer.token()).await?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Operator endpoints are limited to the subjects listed in `QUILL_ADMIN_SUBS`.
pub fn ensure_admin(state: &AppState, identity: &Identity) -> Result<(), ApiError> {
    if state.config.auth.admin_subs.iter().any(|sub| *sub == identity.sub) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("admin only"))
    }
}
