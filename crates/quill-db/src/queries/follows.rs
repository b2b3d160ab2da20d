use anyhow::Result;
use rusqlite::params;

use super::{OptionalExt, summary_at};
use crate::Database;
use crate::models::{AccountSummaryRow, FollowRow};

impl Database {
    /// Insert a follow edge. Returns false if the edge already exists.
    pub fn follow(&self, id: &str, follower_id: &str, following_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO follows (id, follower_id, following_id) VALUES (?1, ?2, ?3)",
                params![id, follower_id, following_id],
            )?;
            Ok(inserted > 0)
        })
    }

    pub fn unfollow(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                params![follower_id, following_id],
            )?;
            Ok(removed > 0)
        })
    }

    pub fn is_following(&self, follower_id: &str, following_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM follows WHERE follower_id = ?1 AND following_id = ?2",
                    params![follower_id, following_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Accounts following `account_id`, most recent first.
    pub fn list_followers(&self, account_id: &str, limit: u32, offset: u32) -> Result<Vec<AccountSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id, a.username, a.display_name, a.avatar_url
                 FROM follows f
                 JOIN accounts a ON a.id = f.follower_id
                 WHERE f.following_id = ?1
                 ORDER BY f.created_at DESC, f.rowid DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(params![account_id, limit, offset], |row| summary_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Accounts `account_id` follows, most recent first.
    pub fn list_following(&self, account_id: &str, limit: u32, offset: u32) -> Result<Vec<AccountSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id, a.username, a.display_name, a.avatar_url
                 FROM follows f
                 JOIN accounts a ON a.id = f.following_id
                 WHERE f.follower_id = ?1
                 ORDER BY f.created_at DESC, f.rowid DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(params![account_id, limit, offset], |row| summary_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn follower_ids(&self, account_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT follower_id FROM follows WHERE following_id = ?1")?;
            let ids = stmt
                .query_map([account_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    /// Every follow edge in insertion order, for the credit distribution job.
    pub fn all_follows(&self) -> Result<Vec<FollowRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id, follower_id, following_id FROM follows ORDER BY rowid")?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(FollowRow {
                        id: row.get(0)?,
                        follower_id: row.get(1)?,
                        following_id: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
