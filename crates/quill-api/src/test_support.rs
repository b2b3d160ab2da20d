//! In-process harness: the assembled router over an in-memory database,
//! driven with `oneshot`, or served on a local port for WebSocket clients.

use std::sync::Arc;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use quill_db::Database;

use crate::config::Config;
use crate::identity::tests::token_for;
use crate::router;
use crate::state::{AppState, AppStateInner};

pub const SECRET: &str = "test-secret";
pub const ADMIN_SUB: &str = "auth0|admin";

pub struct TestApp {
    pub state: AppState,
    router: Router,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(Config {
            search_url: "http://127.0.0.1:1".into(),
            tts_url: "http://127.0.0.1:1".into(),
            ..Config::default()
        })
    }

    pub fn with_config(mut config: Config) -> Self {
        config.auth.userinfo_url = None;
        config.auth.jwt_secret = SECRET.into();
        config.auth.admin_subs.push(ADMIN_SUB.into());

        let db = Database::open_in_memory().unwrap();
        let state: AppState = Arc::new(AppStateInner::new(db, config).unwrap());
        let router = router::build(state.clone());
        Self { state, router }
    }

    /// Serve the router on an ephemeral port, for clients that need a real socket.
    pub async fn serve(&self) -> String {
        spawn_upstream(self.router.clone()).await
    }

    pub fn token(sub: &str) -> String {
        token_for(SECRET, sub)
    }

    async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> axum::response::Response {
        let mut req = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => req
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => req.body(Body::empty()),
        }
        .unwrap();

        self.router.clone().oneshot(req).await.unwrap()
    }

    pub async fn request(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let resp = self.send(method, uri, token, body).await;
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, value)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, token, None).await
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, token, Some(body)).await
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::PATCH, uri, token, Some(body)).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::DELETE, uri, token, None).await
    }

    /// Status, content type and raw body, for non-JSON responses.
    pub async fn get_raw(&self, uri: &str, token: Option<&str>) -> (StatusCode, Option<String>, Vec<u8>) {
        raw(self.send(Method::GET, uri, token, None).await).await
    }

    pub async fn post_raw(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Option<String>, Vec<u8>) {
        raw(self.send(Method::POST, uri, token, Some(body)).await).await
    }

    /// Register `name` (sub `auth0|{name}`). Returns (token, account id).
    pub async fn signup(&self, name: &str) -> (String, String) {
        let token = Self::token(&format!("auth0|{name}"));
        let (status, body) = self.post("/account", Some(&token), json!({ "username": name })).await;
        assert_eq!(status, StatusCode::CREATED, "signup {name}: {body}");
        (token, body["id"].as_str().unwrap().to_string())
    }

    pub async fn create_post(&self, token: &str, title: &str) -> String {
        let (status, body) = self
            .post("/post", Some(token), json!({ "title": title, "content": "body text" }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create post: {body}");
        body["id"].as_str().unwrap().to_string()
    }
}

async fn raw(resp: axum::response::Response) -> (StatusCode, Option<String>, Vec<u8>) {
    let status = resp.status();
    let content_type = resp
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, content_type, bytes.to_vec())
}

/// Serve a fake upstream on an ephemeral port and return its base URL.
pub async fn spawn_upstream(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{}", addr)
}
