use anyhow::Result;
use rusqlite::{Connection, Row, params};

use super::{NOW, OptionalExt};
use crate::Database;
use crate::models::{AccountRow, NewAccount, TransferOutcome};

const ACCOUNT_COLUMNS: &str = "id, auth_sub, username, display_name, bio, avatar_url, email, credit, created_at, updated_at";

/// Every comment written by ?1 plus every reply beneath one, each id once.
const AUTHORED_SUBTREES: &str = "WITH RECURSIVE doomed(id) AS (
        SELECT id FROM comments WHERE author_id = ?1
        UNION
        SELECT c.id FROM comments c JOIN doomed d ON c.parent_id = d.id
     )";

impl Database {
    pub fn create_account(&self, account: &NewAccount<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, auth_sub, username, display_name, bio, avatar_url, email)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    account.id,
                    account.auth_sub,
                    account.username,
                    account.display_name,
                    account.bio,
                    account.avatar_url,
                    account.email,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_account(&self, id: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "id", id))
    }

    pub fn get_account_by_sub(&self, auth_sub: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "auth_sub", auth_sub))
    }

    pub fn get_account_by_username(&self, username: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "username", username))
    }

    /// Field-level update. `None` keeps the stored value.
    /// Returns false if the account does not exist.
    pub fn update_account(
        &self,
        id: &str,
        display_name: Option<&str>,
        bio: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE accounts SET
                        display_name = COALESCE(?2, display_name),
                        bio = COALESCE(?3, bio),
                        avatar_url = COALESCE(?4, avatar_url),
                        updated_at = {NOW}
                     WHERE id = ?1"
                ),
                params![id, display_name, bio, avatar_url],
            )?;
            Ok(changed > 0)
        })
    }

    /// Deletes the account; follows, posts, comments, likes, notifications
    /// and messages go with it through foreign-key cascades. Like and comment
    /// counters on other users' posts are brought down first so they match
    /// the rows the cascade removes.
    pub fn delete_account(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE posts SET likes = MAX(likes - (
                    SELECT COUNT(*) FROM post_likes l WHERE l.post_id = posts.id AND l.user_id = ?1
                 ), 0)
                 WHERE id IN (SELECT post_id FROM post_likes WHERE user_id = ?1)",
                [id],
            )?;
            tx.execute(
                &format!(
                    "{AUTHORED_SUBTREES}
                     UPDATE posts SET comment_count = MAX(comment_count - (
                        SELECT COUNT(*) FROM comments c
                        WHERE c.post_id = posts.id AND c.id IN (SELECT id FROM doomed)
                     ), 0)
                     WHERE id IN (
                        SELECT c.post_id FROM comments c WHERE c.id IN (SELECT id FROM doomed)
                     )"
                ),
                [id],
            )?;
            let changed = tx.execute("DELETE FROM accounts WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(changed > 0)
        })
    }

    /// Returns (followers, following).
    pub fn follow_counts(&self, id: &str) -> Result<(i64, i64)> {
        self.with_conn(|conn| {
            let counts = conn.query_row(
                "SELECT
                    (SELECT COUNT(*) FROM follows WHERE following_id = ?1),
                    (SELECT COUNT(*) FROM follows WHERE follower_id = ?1)",
                [id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(counts)
        })
    }

    pub fn credit_balance(&self, id: &str) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row("SELECT credit FROM accounts WHERE id = ?1", [id], |row| row.get(0))
                .optional()
        })
    }

    /// Add `amount` credits. Returns the new balance, or None if the account is gone.
    pub fn grant_credit(&self, id: &str, amount: i64) -> Result<Option<i64>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "UPDATE accounts SET credit = credit + ?2, updated_at = {NOW}
                     WHERE id = ?1 RETURNING credit"
                ),
                params![id, amount],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Move credits between two accounts atomically.
    pub fn transfer_credit(&self, from_id: &str, to_id: &str, amount: i64) -> Result<TransferOutcome> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let recipient_exists: Option<i64> = tx
                .query_row("SELECT 1 FROM accounts WHERE id = ?1", [to_id], |row| row.get(0))
                .optional()?;
            if recipient_exists.is_none() {
                return Ok(TransferOutcome::RecipientMissing);
            }

            let remaining: Option<i64> = tx
                .query_row(
                    &format!(
                        "UPDATE accounts SET credit = credit - ?2, updated_at = {NOW}
                         WHERE id = ?1 AND credit >= ?2 RETURNING credit"
                    ),
                    params![from_id, amount],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(remaining) = remaining else {
                return Ok(TransferOutcome::Insufficient);
            };

            tx.execute(
                &format!("UPDATE accounts SET credit = credit + ?2, updated_at = {NOW} WHERE id = ?1"),
                params![to_id, amount],
            )?;
            tx.commit()?;

            Ok(TransferOutcome::Done(remaining))
        })
    }
}

fn query_account(conn: &Connection, column: &str, value: &str) -> Result<Option<AccountRow>> {
    let mut stmt =
        conn.prepare(&format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column} = ?1"))?;
    stmt.query_row([value], account_from_row).optional()
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get(0)?,
        auth_sub: row.get(1)?,
        username: row.get(2)?,
        display_name: row.get(3)?,
        bio: row.get(4)?,
        avatar_url: row.get(5)?,
        email: row.get(6)?,
        credit: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::models::TransferOutcome;
    use crate::queries::test_support::{account, db, post};

    #[test]
    fn lookup_by_sub_and_username() {
        let db = db();
        let id = account(&db, "alice");

        let by_sub = db.get_account_by_sub("auth0|alice").unwrap().unwrap();
        assert_eq!(by_sub.id, id);
        let by_name = db.get_account_by_username("alice").unwrap().unwrap();
        assert_eq!(by_name.id, id);
        assert!(db.get_account_by_username("bob").unwrap().is_none());
    }

    #[test]
    fn update_keeps_absent_fields() {
        let db = db();
        let id = account(&db, "alice");

        db.update_account(&id, Some("Alice"), Some("hello"), None).unwrap();
        db.update_account(&id, None, Some("updated bio"), None).unwrap();

        let row = db.get_account(&id).unwrap().unwrap();
        assert_eq!(row.display_name.as_deref(), Some("Alice"));
        assert_eq!(row.bio.as_deref(), Some("updated bio"));
        assert!(row.avatar_url.is_none());
    }

    #[test]
    fn grant_credit_reports_missing_account() {
        let db = db();
        let id = account(&db, "alice");

        assert_eq!(db.grant_credit(&id, 5).unwrap(), Some(5));
        assert_eq!(db.grant_credit(&id, 3).unwrap(), Some(8));
        assert_eq!(db.grant_credit("no-such-account", 3).unwrap(), None);
    }

    #[test]
    fn transfer_requires_sufficient_balance() {
        let db = db();
        let alice = account(&db, "alice");
        let bob = account(&db, "bob");
        db.grant_credit(&alice, 10).unwrap();

        assert_eq!(db.transfer_credit(&alice, &bob, 15).unwrap(), TransferOutcome::Insufficient);
        assert_eq!(db.transfer_credit(&alice, &bob, 4).unwrap(), TransferOutcome::Done(6));
        assert_eq!(db.credit_balance(&bob).unwrap(), Some(4));
        assert_eq!(
            db.transfer_credit(&alice, "ghost", 1).unwrap(),
            TransferOutcome::RecipientMissing
        );
        assert_eq!(db.credit_balance(&alice).unwrap(), Some(6));
    }

    #[test]
    fn deleting_account_settles_counters_on_other_posts() {
        let db = db();
        let alice = account(&db, "alice");
        let bob = account(&db, "bob");
        let carol = account(&db, "carol");
        let p = post(&db, &alice, "Hello");

        db.like_post("l1", &p, &bob).unwrap();
        db.like_post("l2", &p, &carol).unwrap();
        db.create_comment("bob-root", &p, &bob, None, "hi").unwrap();
        db.create_comment("carol-reply", &p, &carol, Some("bob-root"), "hey").unwrap();
        db.create_comment("bob-nested", &p, &bob, Some("carol-reply"), "again").unwrap();
        db.create_comment("carol-root", &p, &carol, None, "stays").unwrap();

        assert!(db.delete_account(&bob).unwrap());

        let row = db.get_post(&p).unwrap().unwrap();
        assert_eq!(row.likes, 1);
        assert_eq!(row.comment_count, 1);
        let remaining = db.comments_for_post(&p).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, "carol-root");
        assert!(!db.delete_account(&bob).unwrap());
    }

    #[test]
    fn deleting_account_cascades() {
        let db = db();
        let alice = account(&db, "alice");
        let bob = account(&db, "bob");
        db.follow("f1", &bob, &alice).unwrap();

        assert!(db.delete_account(&alice).unwrap());
        assert_eq!(db.follow_counts(&bob).unwrap(), (0, 0));
    }
}
