use serde::Deserialize;

use crate::error::ApiError;

pub const USERNAME_LEN: std::ops::RangeInclusive<usize> = 3..=32;
pub const DISPLAY_NAME_MAX: usize = 64;
pub const BIO_MAX: usize = 500;
pub const AVATAR_URL_MAX: usize = 512;
pub const TITLE_MAX: usize = 200;
pub const POST_CONTENT_MAX: usize = 50_000;
pub const MAX_TAGS: usize = 10;
pub const TAG_MAX: usize = 32;
/// Shared by comments and direct messages.
pub const SHORT_TEXT_MAX: usize = 2_000;
pub const TTS_TEXT_MAX: usize = 5_000;

/// MoMo's accepted window for a single captureWallet payment, in VND.
pub const MIN_PAYMENT_VND: i64 = 1_000;
pub const MAX_PAYMENT_VND: i64 = 50_000_000;

const DEFAULT_PAGE: u32 = 20;
const MAX_PAGE: u32 = 100;

fn default_limit() -> u32 {
    DEFAULT_PAGE
}

/// `?limit=&offset=` for list endpoints.
#[derive(Debug, Deserialize)]
pub struct Page {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl Page {
    pub fn limit(&self) -> u32 {
        clamp_limit(self.limit)
    }
}

pub fn clamp_limit(limit: u32) -> u32 {
    limit.clamp(1, MAX_PAGE)
}

pub fn page_default() -> u32 {
    DEFAULT_PAGE
}

pub fn username(name: &str) -> Result<(), ApiError> {
    let len = name.chars().count();
    if !USERNAME_LEN.contains(&len) {
        return Err(ApiError::bad_request("username must be 3 to 32 characters"));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return Err(ApiError::bad_request(
            "username may only contain letters, digits, '_' and '.'",
        ));
    }
    Ok(())
}

/// Non-blank text of at most `max` characters.
pub fn text(field: &str, value: &str, max: usize) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::bad_request(format!("{field} must not be empty")));
    }
    if value.chars().count() > max {
        return Err(ApiError::bad_request(format!("{field} must be at most {max} characters")));
    }
    Ok(())
}

/// Optional profile field: may be empty, bounded in length.
pub fn optional(field: &str, value: Option<&str>, max: usize) -> Result<(), ApiError> {
    match value {
        Some(v) if v.chars().count() > max => {
            Err(ApiError::bad_request(format!("{field} must be at most {max} characters")))
        }
        _ => Ok(()),
    }
}

pub fn tags(tags: &[String]) -> Result<(), ApiError> {
    if tags.len() > MAX_TAGS {
        return Err(ApiError::bad_request(format!("at most {MAX_TAGS} tags")));
    }
    for tag in tags {
        text("tag", tag, TAG_MAX)?;
    }
    Ok(())
}

/// Credits bought by `amount` VND, or 400 when the amount is out of range.
pub fn payment_amount(amount: i64, vnd_per_credit: i64) -> Result<i64, ApiError> {
    if !(MIN_PAYMENT_VND..=MAX_PAYMENT_VND).contains(&amount) {
        return Err(ApiError::bad_request(format!(
            "amount must be between {MIN_PAYMENT_VND} and {MAX_PAYMENT_VND} VND"
        )));
    }
    let credits = amount / vnd_per_credit;
    if credits < 1 {
        return Err(ApiError::bad_request(format!(
            "amount buys no credit (1 credit = {vnd_per_credit} VND)"
        )));
    }
    Ok(credits)
}
