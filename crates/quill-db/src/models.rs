//! Database row types. These map directly to SQLite rows and stay
//! independent of the quill-types API models.

#[derive(Debug, Clone)]
pub struct AccountRow {
    pub id: String,
    pub auth_sub: String,
    pub username: String,
    pub display_name: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
    pub email: Option<String>,
    pub credit: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// The public slice of an account, joined onto posts, comments and lists.
#[derive(Debug, Clone)]
pub struct AccountSummaryRow {
    pub id: String,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

pub struct NewAccount<'a> {
    pub id: &'a str,
    pub auth_sub: &'a str,
    pub username: &'a str,
    pub display_name: Option<&'a str>,
    pub bio: Option<&'a str>,
    pub avatar_url: Option<&'a str>,
    pub email: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct FollowRow {
    pub id: String,
    pub follower_id: String,
    pub following_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Up,
    Down,
}

#[derive(Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Sender's balance after the transfer.
    Done(i64),
    Insufficient,
    RecipientMissing,
}

#[derive(Debug, Clone)]
pub struct PostRow {
    pub id: String,
    pub author: AccountSummaryRow,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    pub likes: i64,
    pub comment_count: i64,
    pub views: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Filters for the post listing; all optional except `limit`.
#[derive(Debug, Default)]
pub struct PostFilter<'a> {
    pub limit: u32,
    pub before: Option<&'a str>,
    pub author_id: Option<&'a str>,
    /// Only posts by accounts this account follows.
    pub followed_by: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub author: AccountSummaryRow,
    pub content: String,
    pub upvotes: i64,
    pub downvotes: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NotificationRow {
    pub id: String,
    pub recipient_id: String,
    pub actor: Option<AccountSummaryRow>,
    pub kind: String,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub message: String,
    pub read: bool,
    pub created_at: String,
}

pub struct NewNotification {
    pub id: String,
    pub recipient_id: String,
    pub actor_id: Option<String>,
    pub kind: &'static str,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub read: bool,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct ConversationRow {
    pub counterpart: AccountSummaryRow,
    pub last_message: MessageRow,
    pub unread: i64,
}

#[derive(Debug, Clone)]
pub struct TransactionRow {
    pub id: String,
    pub account_id: String,
    pub order_id: String,
    pub request_id: String,
    pub amount: i64,
    pub credits: i64,
    pub status: String,
    pub credit_error: bool,
    pub retry_count: i64,
    pub trans_id: Option<i64>,
    pub result_code: Option<i64>,
    pub message: Option<String>,
    pub pay_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct NewTransaction<'a> {
    pub id: &'a str,
    pub account_id: &'a str,
    pub order_id: &'a str,
    pub request_id: &'a str,
    pub amount: i64,
    pub credits: i64,
}
