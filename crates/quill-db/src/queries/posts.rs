use anyhow::Result;
use rusqlite::{Row, params};

use super::{NOW, OptionalExt, summary_at};
use crate::Database;
use crate::models::{AccountSummaryRow, PostFilter, PostRow};

const POST_SELECT: &str = "SELECT p.id, p.title, p.content, p.tags, p.likes, p.comment_count, p.views,
        p.created_at, p.updated_at, a.id, a.username, a.display_name, a.avatar_url
     FROM posts p
     JOIN accounts a ON a.id = p.author_id";

impl Database {
    pub fn create_post(&self, id: &str, author_id: &str, title: &str, content: &str, tags: &[String]) -> Result<()> {
        let tags = serde_json::to_string(tags)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO posts (id, author_id, title, content, tags) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, author_id, title, content, tags],
            )?;
            Ok(())
        })
    }

    pub fn get_post(&self, id: &str) -> Result<Option<PostRow>> {
        self.with_conn(|conn| {
            conn.query_row(&format!("{POST_SELECT} WHERE p.id = ?1"), [id], post_from_row)
                .optional()
        })
    }

    /// Newest first. `before` is an exclusive created_at cursor.
    pub fn list_posts(&self, filter: &PostFilter<'_>) -> Result<Vec<PostRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{POST_SELECT}
                 WHERE (?1 IS NULL OR p.created_at < ?1)
                   AND (?2 IS NULL OR p.author_id = ?2)
                   AND (?3 IS NULL OR p.author_id IN
                        (SELECT following_id FROM follows WHERE follower_id = ?3))
                 ORDER BY p.created_at DESC, p.rowid DESC
                 LIMIT ?4"
            ))?;
            let rows = stmt
                .query_map(
                    params![filter.before, filter.author_id, filter.followed_by, filter.limit],
                    post_from_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn increment_views(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("UPDATE posts SET views = views + 1 WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    pub fn update_post(
        &self,
        id: &str,
        title: Option<&str>,
        content: Option<&str>,
        tags: Option<&[String]>,
    ) -> Result<bool> {
        let tags = tags.map(serde_json::to_string).transpose()?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE posts SET
                        title = COALESCE(?2, title),
                        content = COALESCE(?3, content),
                        tags = COALESCE(?4, tags),
                        updated_at = {NOW}
                     WHERE id = ?1"
                ),
                params![id, title, content, tags],
            )?;
            Ok(changed > 0)
        })
    }

    /// Comments and likes are removed by cascade.
    pub fn delete_post(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM posts WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    /// Record a like and bump the counter. Returns the new like count,
    /// or None if this user already liked the post.
    pub fn like_post(&self, like_id: &str, post_id: &str, user_id: &str) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO post_likes (id, post_id, user_id) VALUES (?1, ?2, ?3)",
                params![like_id, post_id, user_id],
            )?;
            if inserted == 0 {
                return Ok(None);
            }
            let likes: i64 = tx.query_row(
                "UPDATE posts SET likes = likes + 1 WHERE id = ?1 RETURNING likes",
                [post_id],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok(Some(likes))
        })
    }

    /// Remove a like. Returns the new like count, or None if there was no like.
    pub fn unlike_post(&self, post_id: &str, user_id: &str) -> Result<Option<i64>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let removed = tx.execute(
                "DELETE FROM post_likes WHERE post_id = ?1 AND user_id = ?2",
                params![post_id, user_id],
            )?;
            if removed == 0 {
                return Ok(None);
            }
            let likes: i64 = tx.query_row(
                "UPDATE posts SET likes = MAX(likes - 1, 0) WHERE id = ?1 RETURNING likes",
                [post_id],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok(Some(likes))
        })
    }

    pub fn list_likers(&self, post_id: &str, limit: u32, offset: u32) -> Result<Vec<AccountSummaryRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT a.id, a.username, a.display_name, a.avatar_url
                 FROM post_likes l
                 JOIN accounts a ON a.id = l.user_id
                 WHERE l.post_id = ?1
                 ORDER BY l.created_at DESC, l.rowid DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(params![post_id, limit, offset], |row| summary_at(row, 0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<PostRow> {
    let tags: String = row.get(3)?;
    let tags = serde_json::from_str(&tags).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(PostRow {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        tags,
        likes: row.get(4)?,
        comment_count: row.get(5)?,
        views: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
        author: summary_at(row, 9)?,
    })
}
