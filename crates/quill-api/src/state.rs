use std::sync::Arc;

use tracing::{error, warn};
use uuid::Uuid;

use quill_db::Database;
use quill_db::models::{AccountRow, NewNotification};
use quill_gateway::dispatcher::Dispatcher;
use quill_momo::MomoClient;
use quill_types::events::GatewayEvent;
use quill_types::models::{Identity, NotificationKind};

use crate::config::Config;
use crate::convert;
use crate::error::ApiError;
use crate::identity::Authenticator;
use crate::search::SearchClient;
use crate::tts::TtsClient;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub config: Config,
    pub auth: Authenticator,
    pub dispatcher: Dispatcher,
    pub momo: MomoClient,
    pub search: SearchClient,
    pub tts: TtsClient,
}

impl AppStateInner {
    pub fn new(db: Database, config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().timeout(config.upstream_timeout).build()?;

        Ok(Self {
            auth: Authenticator::from_config(http.clone(), &config.auth),
            momo: MomoClient::new(http.clone(), config.momo.clone()),
            search: SearchClient::new(http.clone(), &config.search_url),
            tts: TtsClient::new(http, &config.tts_url),
            dispatcher: Dispatcher::new(),
            db,
            config,
        })
    }
}

/// Run a blocking database call off the async runtime.
pub async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.into())
        })?
        .map_err(ApiError::from)
}

/// The caller's profile. Identities without one must `POST /account` first.
pub async fn current_account(state: &AppState, identity: &Identity) -> Result<AccountRow, ApiError> {
    let sub = identity.sub.clone();
    blocking(state, move |db| db.get_account_by_sub(&sub))
        .await?
        .ok_or(ApiError::NotFound("account"))
}

/// A notification about to be recorded.
pub struct Notice {
    pub recipient: String,
    pub actor: Option<String>,
    pub kind: NotificationKind,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub message: String,
}

impl Notice {
    pub fn new(recipient: impl Into<String>, kind: NotificationKind, message: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            actor: None,
            kind,
            post_id: None,
            comment_id: None,
            message: message.into(),
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn post(mut self, post_id: impl Into<String>) -> Self {
        self.post_id = Some(post_id.into());
        self
    }

    pub fn comment(mut self, comment_id: impl Into<String>) -> Self {
        self.comment_id = Some(comment_id.into());
        self
    }

    fn into_row(self) -> NewNotification {
        NewNotification {
            id: Uuid::new_v4().to_string(),
            recipient_id: self.recipient,
            actor_id: self.actor,
            kind: self.kind.as_str(),
            post_id: self.post_id,
            comment_id: self.comment_id,
            message: self.message,
        }
    }
}

/// Record one notification and push it to the recipient's live connections.
/// Best-effort: failures are logged and never fail the triggering request.
pub async fn notify(state: &AppState, notice: Notice) {
    notify_many(state, vec![notice]).await;
}

pub async fn notify_many(state: &AppState, notices: Vec<Notice>) {
    if notices.is_empty() {
        return;
    }

    let rows: Vec<NewNotification> = notices.into_iter().map(Notice::into_row).collect();
    let targets: Vec<(String, String)> = rows.iter().map(|n| (n.id.clone(), n.recipient_id.clone())).collect();

    if let Err(e) = blocking(state, move |db| db.insert_notifications(&rows)).await {
        warn!("Failed to record notifications: {:?}", e);
        return;
    }

    for (id, recipient) in targets {
        let recipient = convert::uuid(&recipient);
        if !state.dispatcher.is_online(recipient).await {
            continue;
        }
        match blocking(state, move |db| db.get_notification(&id)).await {
            Ok(Some(row)) => {
                let event = GatewayEvent::NotificationCreate(convert::notification(row));
                state.dispatcher.send_to(recipient, event).await;
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to load notification for push: {:?}", e),
        }
    }
}

/// Push a fresh balance to the account's live connections.
pub async fn push_credit(state: &AppState, account_id: &str, credit: i64) {
    state
        .dispatcher
        .send_to(convert::uuid(account_id), GatewayEvent::CreditUpdate { credit })
        .await;
}
