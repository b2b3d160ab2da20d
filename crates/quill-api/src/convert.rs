//! Row -> wire conversions. Stored ids and timestamps are trusted; a corrupt
//! value is logged and replaced rather than failing the whole response.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use quill_db::models::{
    AccountRow, AccountSummaryRow, CommentRow, ConversationRow, MessageRow, NotificationRow, PostRow, TransactionRow,
};
use quill_types::api::{
    AccountResponse, AccountSummary, CommentNode, ConversationSummary, MessageResponse, NotificationResponse,
    PostResponse, TransactionResponse,
};
use quill_types::models::{NotificationKind, PaymentStatus};

use crate::error::ApiError;

pub fn uuid(raw: &str) -> Uuid {
    raw.parse().unwrap_or_else(|_| {
        warn!("Corrupt uuid in database: {}", raw);
        Uuid::nil()
    })
}

fn opt_uuid(raw: Option<String>) -> Option<Uuid> {
    raw.as_deref().map(uuid)
}

pub fn time(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| {
            warn!("Corrupt timestamp in database: {}", raw);
            DateTime::<Utc>::UNIX_EPOCH
        })
}

/// Normalise a client-supplied RFC 3339 cursor to the stored timestamp format
/// so it compares lexically against `created_at`.
pub fn cursor(raw: &str) -> Result<String, ApiError> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map_err(|_| ApiError::bad_request("before must be an RFC 3339 timestamp"))?;
    Ok(parsed.with_timezone(&Utc).format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

pub fn summary(row: AccountSummaryRow) -> AccountSummary {
    AccountSummary {
        id: uuid(&row.id),
        username: row.username,
        display_name: row.display_name,
        avatar_url: row.avatar_url,
    }
}

/// `own` exposes the private fields (email, credit) to the profile owner.
pub fn account(row: AccountRow, (followers, following): (i64, i64), own: bool) -> AccountResponse {
    AccountResponse {
        id: uuid(&row.id),
        username: row.username,
        display_name: row.display_name,
        bio: row.bio,
        avatar_url: row.avatar_url,
        email: if own { row.email } else { None },
        credit: own.then_some(row.credit),
        follower_count: followers,
        following_count: following,
        created_at: time(&row.created_at),
        updated_at: time(&row.updated_at),
    }
}

pub fn post(row: PostRow) -> PostResponse {
    PostResponse {
        id: uuid(&row.id),
        author: summary(row.author),
        title: row.title,
        content: row.content,
        tags: row.tags,
        likes: row.likes,
        comment_count: row.comment_count,
        views: row.views,
        created_at: time(&row.created_at),
        updated_at: time(&row.updated_at),
    }
}

fn comment(row: CommentRow, replies: Vec<CommentNode>) -> CommentNode {
    CommentNode {
        id: uuid(&row.id),
        post_id: uuid(&row.post_id),
        parent_id: opt_uuid(row.parent_id),
        author: summary(row.author),
        content: row.content,
        upvotes: row.upvotes,
        downvotes: row.downvotes,
        created_at: time(&row.created_at),
        updated_at: time(&row.updated_at),
        replies,
    }
}

/// A single comment with no replies attached.
pub fn comment_leaf(row: CommentRow) -> CommentNode {
    comment(row, Vec::new())
}

/// Nest a post's comments under their parents. Input must be oldest first;
/// that order is kept at every level.
pub fn comment_tree(rows: Vec<CommentRow>) -> Vec<CommentNode> {
    let mut children: HashMap<Option<String>, Vec<CommentRow>> = HashMap::new();
    for row in rows {
        children.entry(row.parent_id.clone()).or_default().push(row);
    }
    attach(None, &mut children)
}

fn attach(parent: Option<String>, children: &mut HashMap<Option<String>, Vec<CommentRow>>) -> Vec<CommentNode> {
    let Some(rows) = children.remove(&parent) else {
        return Vec::new();
    };
    rows.into_iter()
        .map(|row| {
            let replies = attach(Some(row.id.clone()), children);
            comment(row, replies)
        })
        .collect()
}

pub fn notification(row: NotificationRow) -> NotificationResponse {
    let kind = row.kind.parse().unwrap_or_else(|e| {
        warn!("{}", e);
        NotificationKind::Message
    });
    NotificationResponse {
        id: uuid(&row.id),
        kind,
        actor: row.actor.map(summary),
        post_id: opt_uuid(row.post_id),
        comment_id: opt_uuid(row.comment_id),
        message: row.message,
        read: row.read,
        created_at: time(&row.created_at),
    }
}

pub fn message(row: MessageRow) -> MessageResponse {
    MessageResponse {
        id: uuid(&row.id),
        sender_id: uuid(&row.sender_id),
        recipient_id: uuid(&row.recipient_id),
        content: row.content,
        read: row.read,
        created_at: time(&row.created_at),
    }
}

pub fn conversation(row: ConversationRow) -> ConversationSummary {
    ConversationSummary {
        counterpart: summary(row.counterpart),
        last_message: message(row.last_message),
        unread: row.unread,
    }
}

pub fn payment_status(raw: &str) -> PaymentStatus {
    raw.parse().unwrap_or_else(|e| {
        warn!("{}", e);
        PaymentStatus::Failed
    })
}

pub fn transaction(row: TransactionRow) -> TransactionResponse {
    TransactionResponse {
        id: uuid(&row.id),
        status: payment_status(&row.status),
        order_id: row.order_id,
        amount: row.amount,
        credits: row.credits,
        credit_error: row.credit_error,
        retry_count: row.retry_count,
        trans_id: row.trans_id,
        result_code: row.result_code,
        message: row.message,
        pay_url: row.pay_url,
        created_at: time(&row.created_at),
        updated_at: time(&row.updated_at),
    }
}
