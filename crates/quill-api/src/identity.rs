use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use quill_types::models::Identity;

use crate::config::AuthConfig;
use crate::error::ApiError;

/// Upper bound on cached tokens; expired entries are pruned once reached.
const CACHE_CAPACITY: usize = 10_000;

/// Claims carried by locally signed HS256 tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub exp: usize,
}

/// Turns a bearer token into an [`Identity`].
pub enum TokenVerifier {
    /// Ask the identity provider's OIDC userinfo endpoint.
    Userinfo { http: reqwest::Client, url: String },
    /// Verify an HS256 JWT with a shared secret.
    Secret { key: DecodingKey },
}

impl TokenVerifier {
    pub fn secret(secret: &str) -> Self {
        TokenVerifier::Secret {
            key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Returns the identity and, when the token says so, how long it stays valid.
    pub async fn verify(&self, token: &str) -> Result<(Identity, Option<Duration>), ApiError> {
        match self {
            TokenVerifier::Secret { key } => {
                let data = decode::<Claims>(token, key, &Validation::new(Algorithm::HS256)).map_err(|e| {
                    debug!("Rejected token: {}", e);
                    ApiError::Unauthorized
                })?;
                let remaining = (data.claims.exp as i64 - chrono::Utc::now().timestamp()).max(0);
                let identity = Identity {
                    sub: data.claims.sub,
                    email: data.claims.email,
                    name: data.claims.name,
                };
                Ok((identity, Some(Duration::from_secs(remaining as u64))))
            }
            TokenVerifier::Userinfo { http, url } => {
                let resp = http
                    .get(url)
                    .bearer_auth(token)
                    .send()
                    .await
                    .map_err(|e| ApiError::BadGateway(format!("identity provider unreachable: {e}")))?;

                let status = resp.status();
                if !status.is_success() {
                    if status != StatusCode::UNAUTHORIZED && status != StatusCode::FORBIDDEN {
                        warn!("Identity provider answered {} for userinfo", status);
                    }
                    return Err(ApiError::Unauthorized);
                }

                let identity = resp
                    .json::<Identity>()
                    .await
                    .map_err(|e| ApiError::BadGateway(format!("malformed userinfo response: {e}")))?;
                Ok((identity, None))
            }
        }
    }
}

/// Token -> identity map. Entries live for the cache TTL or until the token
/// itself expires, whichever comes first.
pub struct TokenCache {
    ttl: Duration,
    entries: RwLock<HashMap<String, (Identity, Instant)>>,
}

impl TokenCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub async fn get(&self, token: &str) -> Option<Identity> {
        let entries = self.entries.read().await;
        let (identity, expires_at) = entries.get(token)?;
        (*expires_at > Instant::now()).then(|| identity.clone())
    }

    pub async fn insert(&self, token: &str, identity: Identity, valid_for: Option<Duration>) {
        let now = Instant::now();
        let lifetime = valid_for.map_or(self.ttl, |valid_for| valid_for.min(self.ttl));
        let mut entries = self.entries.write().await;

        if entries.len() >= CACHE_CAPACITY {
            entries.retain(|_, (_, expires_at)| *expires_at > now);
            if entries.len() >= CACHE_CAPACITY {
                // Still full of live entries: evict whichever expires first.
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, (_, expires_at))| *expires_at)
                    .map(|(token, _)| token.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }

        entries.insert(token.to_string(), (identity, now + lifetime));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Cache-aside front for a [`TokenVerifier`].
pub struct Authenticator {
    verifier: TokenVerifier,
    cache: TokenCache,
}

impl Authenticator {
    pub fn new(verifier: TokenVerifier, cache_ttl: Duration) -> Self {
        Self {
            verifier,
            cache: TokenCache::new(cache_ttl),
        }
    }

    pub fn from_config(http: reqwest::Client, config: &AuthConfig) -> Self {
        let verifier = match &config.userinfo_url {
            Some(url) => TokenVerifier::Userinfo { http, url: url.clone() },
            None => TokenVerifier::secret(&config.jwt_secret),
        };
        Self::new(verifier, config.token_cache_ttl)
    }

    pub async fn authenticate(&self, token: &str) -> Result<Identity, ApiError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(ApiError::Unauthorized);
        }

        if let Some(identity) = self.cache.get(token).await {
            return Ok(identity);
        }

        let (identity, valid_for) = self.verifier.verify(token).await?;
        self.cache.insert(token, identity.clone(), valid_for).await;
        Ok(identity)
    }
}
