use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use quill_momo::MomoConfig;

/// Placeholder JWT secrets that MUST NOT be used outside development.
pub const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub auth: AuthConfig,
    pub search_url: String,
    pub tts_url: String,
    pub upstream_timeout: Duration,
    pub momo: MomoConfig,
    /// Reject IPN callbacks whose signature does not verify. When false a
    /// mismatch is only logged.
    pub momo_strict_signature: bool,
    pub vnd_per_credit: i64,
    pub follow_reward: i64,
    pub credit_distribution_interval: Duration,
    pub credit_retry_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OIDC userinfo endpoint. When unset, tokens are HS256 JWTs signed with `jwt_secret`.
    pub userinfo_url: Option<String>,
    pub jwt_secret: String,
    pub token_cache_ttl: Duration,
    /// Identity subjects allowed to call operator endpoints.
    pub admin_subs: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            db_path: "quill.db".into(),
            auth: AuthConfig {
                userinfo_url: None,
                jwt_secret: "dev-secret-change-me".into(),
                token_cache_ttl: Duration::from_secs(300),
                admin_subs: Vec::new(),
            },
            search_url: "http://localhost:8001".into(),
            tts_url: "http://localhost:8002".into(),
            upstream_timeout: Duration::from_secs(30),
            momo: MomoConfig::default(),
            momo_strict_signature: true,
            vnd_per_credit: 1000,
            follow_reward: 1,
            credit_distribution_interval: Duration::from_secs(24 * 3600),
            credit_retry_interval: Duration::from_secs(600),
        }
    }
}

impl Config {
    /// Read `QUILL_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        let d = Config::default();

        let userinfo_url = var("QUILL_AUTH_USERINFO_URL")
            .or_else(|| var("QUILL_AUTH_DOMAIN").map(|domain| format!("https://{}/userinfo", domain)));

        let admin_subs = var("QUILL_ADMIN_SUBS")
            .map(|v| v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from).collect())
            .unwrap_or_default();

        let momo = MomoConfig {
            endpoint: var("QUILL_MOMO_ENDPOINT").unwrap_or(d.momo.endpoint),
            partner_code: var("QUILL_MOMO_PARTNER_CODE").unwrap_or(d.momo.partner_code),
            access_key: var("QUILL_MOMO_ACCESS_KEY").unwrap_or(d.momo.access_key),
            secret_key: var("QUILL_MOMO_SECRET_KEY").unwrap_or(d.momo.secret_key),
            redirect_url: var("QUILL_MOMO_REDIRECT_URL").unwrap_or(d.momo.redirect_url),
            ipn_url: var("QUILL_MOMO_IPN_URL").unwrap_or(d.momo.ipn_url),
            request_type: var("QUILL_MOMO_REQUEST_TYPE").unwrap_or(d.momo.request_type),
            lang: var("QUILL_MOMO_LANG").unwrap_or(d.momo.lang),
        };

        let config = Self {
            host: var("QUILL_HOST").unwrap_or(d.host),
            port: parse_or("QUILL_PORT", d.port)?,
            db_path: var("QUILL_DB_PATH").map(PathBuf::from).unwrap_or(d.db_path),
            auth: AuthConfig {
                userinfo_url,
                jwt_secret: var("QUILL_JWT_SECRET").unwrap_or(d.auth.jwt_secret),
                token_cache_ttl: Duration::from_secs(parse_or(
                    "QUILL_TOKEN_CACHE_TTL_SECS",
                    d.auth.token_cache_ttl.as_secs(),
                )?),
                admin_subs,
            },
            search_url: var("QUILL_SEARCH_URL").unwrap_or(d.search_url),
            tts_url: var("QUILL_TTS_URL").unwrap_or(d.tts_url),
            upstream_timeout: Duration::from_secs(parse_or(
                "QUILL_UPSTREAM_TIMEOUT_SECS",
                d.upstream_timeout.as_secs(),
            )?),
            momo,
            momo_strict_signature: parse_or("QUILL_MOMO_STRICT_SIGNATURE", d.momo_strict_signature)?,
            vnd_per_credit: parse_or("QUILL_VND_PER_CREDIT", d.vnd_per_credit)?,
            follow_reward: parse_or("QUILL_FOLLOW_REWARD", d.follow_reward)?,
            credit_distribution_interval: Duration::from_secs(parse_or(
                "QUILL_CREDIT_DISTRIBUTION_INTERVAL_SECS",
                d.credit_distribution_interval.as_secs(),
            )?),
            credit_retry_interval: Duration::from_secs(parse_or(
                "QUILL_CREDIT_RETRY_INTERVAL_SECS",
                d.credit_retry_interval.as_secs(),
            )?),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the payment flow or the credit jobs cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.vnd_per_credit <= 0 {
            anyhow::bail!("QUILL_VND_PER_CREDIT must be positive");
        }
        if self.follow_reward <= 0 {
            anyhow::bail!("QUILL_FOLLOW_REWARD must be positive");
        }
        if self.credit_distribution_interval.is_zero() {
            anyhow::bail!("QUILL_CREDIT_DISTRIBUTION_INTERVAL_SECS must be at least 1");
        }
        if self.credit_retry_interval.is_zero() {
            anyhow::bail!("QUILL_CREDIT_RETRY_INTERVAL_SECS must be at least 1");
        }
        Ok(())
    }

    /// True when tokens are verified locally with the shared secret.
    pub fn uses_local_tokens(&self) -> bool {
        self.auth.userinfo_url.is_none()
    }
}

fn var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(raw) => raw.trim().parse().with_context(|| format!("invalid {key} value '{raw}'")),
        None => {
            info!("{key} not set, using default: {default}");
            Ok(default)
        }
    }
}
