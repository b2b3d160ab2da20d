use anyhow::Result;
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use serde::Serialize;
use uuid::Uuid;

use quill_types::api::TtsRequest;
use quill_types::models::Identity;

use crate::error::ApiError;
use crate::state::{AppState, blocking};
use crate::validate;

const DEFAULT_CONTENT_TYPE: &str = "audio/mpeg";

/// Client for the external text-to-speech service.
#[derive(Clone)]
pub struct TtsClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    voice: Option<&'a str>,
}

/// Synthesised audio plus the content type the service declared.
pub struct Audio {
    pub content_type: String,
    pub bytes: Bytes,
}

impl IntoResponse for Audio {
    fn into_response(self) -> Response {
        ([(header::CONTENT_TYPE, self.content_type)], self.bytes).into_response()
    }
}

impl TtsClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn synthesize(&self, text: &str, voice: Option<&str>) -> Result<Audio> {
        let resp = self
            .http
            .post(format!("{}/tts", self.base_url))
            .json(&SynthesisRequest { text, voice })
            .send()
            .await?
            .error_for_status()?;

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let bytes = resp.bytes().await?;

        Ok(Audio { content_type, bytes })
    }
}

async fn synthesize(state: &AppState, text: &str, voice: Option<&str>) -> Result<Audio, ApiError> {
    state
        .tts
        .synthesize(text, voice)
        .await
        .map_err(|e| ApiError::BadGateway(format!("tts service: {e:#}")))
}

pub async fn speak(
    State(state): State<AppState>,
    Extension(_identity): Extension<Identity>,
    Json(req): Json<TtsRequest>,
) -> Result<Audio, ApiError> {
    validate::text("text", &req.text, validate::TTS_TEXT_MAX)?;
    synthesize(&state, &req.text, req.voice.as_deref()).await
}

/// Read a post aloud: title, then body.
pub async fn speak_post(
    State(state): State<AppState>,
    Path(post_id): Path<Uuid>,
    Extension(_identity): Extension<Identity>,
) -> Result<Audio, ApiError> {
    let post = blocking(&state, move |db| db.get_post(&post_id.to_string()))
        .await?
        .ok_or(ApiError::NotFound("post"))?;

    let text = format!("{}.\n\n{}", post.title, post.content);
    synthesize(&state, &text, None).await
}
