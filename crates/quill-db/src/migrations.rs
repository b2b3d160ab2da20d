use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE accounts (
                id              TEXT PRIMARY KEY,
                auth_sub        TEXT NOT NULL UNIQUE,
                username        TEXT NOT NULL UNIQUE,
                display_name    TEXT,
                bio             TEXT,
                avatar_url      TEXT,
                email           TEXT,
                credit          INTEGER NOT NULL DEFAULT 0 CHECK (credit >= 0),
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE TABLE follows (
                id              TEXT PRIMARY KEY,
                follower_id     TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                following_id    TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE(follower_id, following_id),
                CHECK (follower_id != following_id)
            );

            CREATE INDEX idx_follows_following ON follows(following_id);

            CREATE TABLE posts (
                id              TEXT PRIMARY KEY,
                author_id       TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                title           TEXT NOT NULL,
                content         TEXT NOT NULL,
                tags            TEXT NOT NULL DEFAULT '[]',
                likes           INTEGER NOT NULL DEFAULT 0,
                comment_count   INTEGER NOT NULL DEFAULT 0,
                views           INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_posts_created ON posts(created_at);
            CREATE INDEX idx_posts_author ON posts(author_id, created_at);

            CREATE TABLE post_likes (
                id              TEXT PRIMARY KEY,
                post_id         TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                user_id         TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                UNIQUE(user_id, post_id)
            );

            CREATE INDEX idx_post_likes_post ON post_likes(post_id);

            CREATE TABLE comments (
                id              TEXT PRIMARY KEY,
                post_id         TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                author_id       TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                parent_id       TEXT REFERENCES comments(id) ON DELETE CASCADE,
                content         TEXT NOT NULL,
                upvotes         INTEGER NOT NULL DEFAULT 0,
                downvotes       INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_comments_post ON comments(post_id, created_at);
            CREATE INDEX idx_comments_parent ON comments(parent_id);

            CREATE TABLE notifications (
                id              TEXT PRIMARY KEY,
                recipient_id    TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                actor_id        TEXT REFERENCES accounts(id) ON DELETE SET NULL,
                kind            TEXT NOT NULL CHECK (kind IN
                                    ('follow', 'like', 'comment', 'reply', 'new_post', 'message', 'tip', 'payment')),
                post_id         TEXT,
                comment_id      TEXT,
                message         TEXT NOT NULL,
                read            INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_notifications_recipient ON notifications(recipient_id, created_at);

            CREATE TABLE messages (
                id              TEXT PRIMARY KEY,
                sender_id       TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                recipient_id    TEXT NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
                content         TEXT NOT NULL,
                read            INTEGER NOT NULL DEFAULT 0,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_messages_pair ON messages(sender_id, recipient_id, created_at);
            CREATE INDEX idx_messages_recipient ON messages(recipient_id, read);

            -- Payment history survives account deletion, so no foreign key here.
            CREATE TABLE transactions (
                id              TEXT PRIMARY KEY,
                account_id      TEXT NOT NULL,
                order_id        TEXT NOT NULL UNIQUE,
                request_id      TEXT NOT NULL,
                amount          INTEGER NOT NULL,
                credits         INTEGER NOT NULL,
                status          TEXT NOT NULL DEFAULT 'pending'
                                    CHECK (status IN ('pending', 'success', 'failed')),
                credit_error    INTEGER NOT NULL DEFAULT 0,
                retry_count     INTEGER NOT NULL DEFAULT 0,
                trans_id        INTEGER,
                result_code     INTEGER,
                message         TEXT,
                pay_url         TEXT,
                created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            );

            CREATE INDEX idx_transactions_account ON transactions(account_id, created_at);
            CREATE INDEX idx_transactions_retry ON transactions(status, credit_error);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
