use anyhow::Result;
use rusqlite::{Row, params};

use super::{OptionalExt, summary_at};
use crate::Database;
use crate::models::{ConversationRow, MessageRow};

impl Database {
    pub fn insert_message(&self, id: &str, sender_id: &str, recipient_id: &str, content: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, sender_id, recipient_id, content) VALUES (?1, ?2, ?3, ?4)",
                params![id, sender_id, recipient_id, content],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, sender_id, recipient_id, content, read, created_at FROM messages WHERE id = ?1",
                [id],
                |row| message_at(row, 0),
            )
            .optional()
        })
    }

    /// Messages exchanged between two accounts, newest first.
    pub fn get_thread(&self, a: &str, b: &str, limit: u32, before: Option<&str>) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, recipient_id, content, read, created_at
                 FROM messages
                 WHERE ((sender_id = ?1 AND recipient_id = ?2) OR (sender_id = ?2 AND recipient_id = ?1))
                   AND (?3 IS NULL OR created_at < ?3)
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?4",
            )?;
            let rows = stmt
                .query_map(params![a, b, before, limit], |row| message_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Mark everything `counterpart_id` sent to `reader_id` as read.
    pub fn mark_thread_read(&self, reader_id: &str, counterpart_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read = 1 WHERE recipient_id = ?1 AND sender_id = ?2 AND read = 0",
                params![reader_id, counterpart_id],
            )?;
            Ok(changed)
        })
    }

    pub fn mark_message_read(&self, id: &str, recipient_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET read = 1 WHERE id = ?1 AND recipient_id = ?2",
                params![id, recipient_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn delete_message(&self, id: &str, sender_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND sender_id = ?2",
                params![id, sender_id],
            )?;
            Ok(changed > 0)
        })
    }

    /// Inbox: the latest message per counterpart plus the unread count,
    /// most recently active conversation first.
    pub fn list_conversations(&self, account_id: &str) -> Result<Vec<ConversationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "WITH convo AS (
                    SELECT m.id, m.sender_id, m.recipient_id, m.content, m.read, m.created_at,
                           m.rowid AS seq,
                           CASE WHEN m.sender_id = ?1 THEN m.recipient_id ELSE m.sender_id END AS counterpart_id
                    FROM messages m
                    WHERE m.sender_id = ?1 OR m.recipient_id = ?1
                 ), ranked AS (
                    SELECT convo.*,
                           ROW_NUMBER() OVER (PARTITION BY counterpart_id ORDER BY created_at DESC, seq DESC) AS rn
                    FROM convo
                 )
                 SELECT r.id, r.sender_id, r.recipient_id, r.content, r.read, r.created_at,
                        a.id, a.username, a.display_name, a.avatar_url,
                        (SELECT COUNT(*) FROM messages u
                         WHERE u.sender_id = r.counterpart_id AND u.recipient_id = ?1 AND u.read = 0)
                 FROM ranked r
                 JOIN accounts a ON a.id = r.counterpart_id
                 WHERE r.rn = 1
                 ORDER BY r.created_at DESC, r.seq DESC",
            )?;
            let rows = stmt
                .query_map([account_id], |row| {
                    Ok(ConversationRow {
                        last_message: message_at(row, 0)?,
                        counterpart: summary_at(row, 6)?,
                        unread: row.get(10)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn message_at(row: &Row<'_>, start: usize) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(start)?,
        sender_id: row.get(start + 1)?,
        recipient_id: row.get(start + 2)?,
        content: row.get(start + 3)?,
        read: row.get(start + 4)?,
        created_at: row.get(start + 5)?,
    })
}
