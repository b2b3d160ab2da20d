use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::rejection::WebSocketUpgradeRejection,
    },
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use quill_gateway::connection;

use crate::convert;
use crate::error::ApiError;
use crate::state::{AppState, current_account};

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    pub token: Option<String>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the bearer token
/// rides in the query string and goes through the same guard and cache.
/// The token is checked before the handshake headers.
pub async fn upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let token = query.token.ok_or(ApiError::Unauthorized)?;
    let identity = state.auth.authenticate(&token).await?;
    let account = current_account(&state, &identity).await?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let dispatcher = state.dispatcher.clone();
    let account_id = convert::uuid(&account.id);
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, dispatcher, account_id, account.username)))
}
