//! HTTP surface of the Quill backend: handlers, the bearer-token guard,
//! outbound search/TTS clients and the periodic credit jobs.

pub mod accounts;
pub mod comments;
pub mod config;
pub mod convert;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod jobs;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod payment;
pub mod posts;
pub mod router;
pub mod search;
pub mod state;
pub mod tts;
pub mod validate;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::ApiError;
pub use state::{AppState, AppStateInner};
