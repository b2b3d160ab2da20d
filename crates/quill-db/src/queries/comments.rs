use anyhow::Result;
use rusqlite::{Row, params};

use super::{NOW, OptionalExt, summary_at};
use crate::Database;
use crate::models::{CommentRow, Vote};

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.parent_id, c.content, c.upvotes, c.downvotes,
        c.created_at, c.updated_at, a.id, a.username, a.display_name, a.avatar_url
     FROM comments c
     JOIN accounts a ON a.id = c.author_id";

/// Ids of a comment and all of its descendants.
const SUBTREE: &str = "WITH RECURSIVE subtree(id) AS (
        SELECT id FROM comments WHERE id = ?1
        UNION ALL
        SELECT c.id FROM comments c JOIN subtree s ON c.parent_id = s.id
     )";

impl Database {
    /// Insert a comment and bump the post's comment counter.
    pub fn create_comment(
        &self,
        id: &str,
        post_id: &str,
        author_id: &str,
        parent_id: Option<&str>,
        content: &str,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO comments (id, post_id, author_id, parent_id, content) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, post_id, author_id, parent_id, content],
            )?;
            tx.execute(
                "UPDATE posts SET comment_count = comment_count + 1 WHERE id = ?1",
                [post_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        self.with_conn(|conn| {
            conn.query_row(&format!("{COMMENT_SELECT} WHERE c.id = ?1"), [id], comment_from_row)
                .optional()
        })
    }

    /// All comments of a post, oldest first.
    pub fn comments_for_post(&self, post_id: &str) -> Result<Vec<CommentRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{COMMENT_SELECT} WHERE c.post_id = ?1 ORDER BY c.created_at ASC, c.rowid ASC"
            ))?;
            let rows = stmt
                .query_map([post_id], comment_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_comment(&self, id: &str, content: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                &format!("UPDATE comments SET content = ?2, updated_at = {NOW} WHERE id = ?1"),
                params![id, content],
            )?;
            Ok(changed > 0)
        })
    }

    /// Delete a comment with its whole reply subtree and decrement the
    /// post's counter by the number of rows removed. Returns that number.
    pub fn delete_comment(&self, id: &str) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let post_id: Option<String> = tx
                .query_row("SELECT post_id FROM comments WHERE id = ?1", [id], |row| row.get(0))
                .optional()?;
            let Some(post_id) = post_id else {
                return Ok(0);
            };

            let removed: i64 = tx.query_row(
                &format!("{SUBTREE} SELECT COUNT(*) FROM subtree"),
                [id],
                |row| row.get(0),
            )?;
            tx.execute(
                &format!("{SUBTREE} DELETE FROM comments WHERE id IN (SELECT id FROM subtree)"),
                [id],
            )?;
            tx.execute(
                "UPDATE posts SET comment_count = MAX(comment_count - ?2, 0) WHERE id = ?1",
                params![post_id, removed],
            )?;
            tx.commit()?;

            Ok(removed as usize)
        })
    }

    /// Apply a vote. Returns (upvotes, downvotes), or None if the comment is gone.
    pub fn vote_comment(&self, id: &str, vote: Vote) -> Result<Option<(i64, i64)>> {
        let (up, down) = match vote {
            Vote::Up => (1, 0),
            Vote::Down => (0, 1),
        };
        self.with_conn(|conn| {
            conn.query_row(
                "UPDATE comments SET upvotes = upvotes + ?2, downvotes = downvotes + ?3
                 WHERE id = ?1 RETURNING upvotes, downvotes",
                params![id, up, down],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
        })
    }
}

fn comment_from_row(row: &Row<'_>) -> rusqlite::Result<CommentRow> {
    Ok(CommentRow {
        id: row.get(0)?,
        post_id: row.get(1)?,
        parent_id: row.get(2)?,
        content: row.get(3)?,
        upvotes: row.get(4)?,
        downvotes: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        author: summary_at(row, 8)?,
    })
}
