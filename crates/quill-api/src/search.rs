use anyhow::Result;
use axum::{
    Json,
    extract::{Query, State},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use quill_db::models::PostRow;

use crate::error::ApiError;
use crate::state::AppState;
use crate::validate;

/// Client for the external full-text search service.
#[derive(Clone)]
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
}

/// What the search service indexes for a post.
#[derive(Debug, Clone, Serialize)]
pub struct PostDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub author_id: String,
    pub created_at: String,
}

impl From<&PostRow> for PostDocument {
    fn from(post: &PostRow) -> Self {
        Self {
            id: post.id.clone(),
            title: post.title.clone(),
            content: post.content.clone(),
            tags: post.tags.clone(),
            author_id: post.author.id.clone(),
            created_at: post.created_at.clone(),
        }
    }
}

impl SearchClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Forward a query; the upstream JSON is returned as-is.
    pub async fn search(&self, q: &str, limit: u32, offset: u32) -> Result<Value> {
        let resp = self
            .http
            .get(format!("{}/search", self.base_url))
            .query(&[("q", q.to_string()), ("limit", limit.to_string()), ("offset", offset.to_string())])
            .send()
            .await?
            .error_for_status()?;
        Ok(resp.json().await?)
    }

    pub async fn index(&self, doc: &PostDocument) -> Result<()> {
        self.http
            .post(format!("{}/index", self.base_url))
            .json(doc)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn remove(&self, post_id: &str) -> Result<()> {
        self.http
            .delete(format!("{}/index/{}", self.base_url, post_id))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Index sync runs detached; the post write has already succeeded.
pub fn spawn_index(state: &AppState, doc: PostDocument) {
    let search = state.search.clone();
    tokio::spawn(async move {
        match search.index(&doc).await {
            Ok(()) => debug!("Indexed post {}", doc.id),
            Err(e) => warn!("Failed to index post {}: {:#}", doc.id, e),
        }
    });
}

pub fn spawn_remove(state: &AppState, post_id: String) {
    let search = state.search.clone();
    tokio::spawn(async move {
        if let Err(e) = search.remove(&post_id).await {
            warn!("Failed to remove post {} from index: {:#}", post_id, e);
        }
    });
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default = "validate::page_default")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

pub async fn search(State(state): State<AppState>, Query(query): Query<SearchQuery>) -> Result<Json<Value>, ApiError> {
    let q = query.q.trim();
    if q.is_empty() {
        return Err(ApiError::bad_request("q must not be empty"));
    }

    let results = state
        .search
        .search(q, validate::clamp_limit(query.limit), query.offset)
        .await
        .map_err(|e| ApiError::BadGateway(format!("search service: {e:#}")))?;
    Ok(Json(results))
}
