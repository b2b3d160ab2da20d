use anyhow::Result;
use rusqlite::{Connection, Row, params};

use super::{OptionalExt, summary_at};
use crate::Database;
use crate::models::{NewNotification, NotificationRow};

const NOTIFICATION_SELECT: &str = "SELECT n.id, n.recipient_id, n.kind, n.post_id, n.comment_id, n.message,
        n.read, n.created_at, a.id, a.username, a.display_name, a.avatar_url
     FROM notifications n
     LEFT JOIN accounts a ON a.id = n.actor_id";

impl Database {
    pub fn insert_notification(&self, n: &NewNotification) -> Result<()> {
        self.with_conn(|conn| insert(conn, n))
    }

    /// Fan-out insert in a single transaction.
    pub fn insert_notifications(&self, batch: &[NewNotification]) -> Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }

        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            for n in batch {
                insert(&tx, n)?;
            }
            tx.commit()?;
            Ok(batch.len())
        })
    }

    pub fn get_notification(&self, id: &str) -> Result<Option<NotificationRow>> {
        self.with_conn(|conn| {
            conn.query_row(&format!("{NOTIFICATION_SELECT} WHERE n.id = ?1"), [id], notification_from_row)
                .optional()
        })
    }

    /// Newest first.
    pub fn list_notifications(&self, recipient_id: &str, limit: u32, unread_only: bool) -> Result<Vec<NotificationRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{NOTIFICATION_SELECT}
                 WHERE n.recipient_id = ?1 AND (?2 = 0 OR n.read = 0)
                 ORDER BY n.created_at DESC, n.rowid DESC
                 LIMIT ?3"
            ))?;
            let rows = stmt
                .query_map(params![recipient_id, unread_only, limit], notification_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn unread_notification_count(&self, recipient_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1 AND read = 0",
                [recipient_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }

    /// Scoped to the recipient so nobody can touch another account's notifications.
    pub fn mark_notification_read(&self, id: &str, recipient_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1 WHERE id = ?1 AND recipient_id = ?2",
                params![id, recipient_id],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn mark_all_notifications_read(&self, recipient_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET read = 1 WHERE recipient_id = ?1 AND read = 0",
                [recipient_id],
            )?;
            Ok(changed)
        })
    }

    pub fn delete_notification(&self, id: &str, recipient_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "DELETE FROM notifications WHERE id = ?1 AND recipient_id = ?2",
                params![id, recipient_id],
            )?;
            Ok(changed > 0)
        })
    }
}

fn insert(conn: &Connection, n: &NewNotification) -> Result<()> {
    conn.execute(
        "INSERT INTO notifications (id, recipient_id, actor_id, kind, post_id, comment_id, message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![n.id, n.recipient_id, n.actor_id, n.kind, n.post_id, n.comment_id, n.message],
    )?;
    Ok(())
}

fn notification_from_row(row: &Row<'_>) -> rusqlite::Result<NotificationRow> {
    let actor_id: Option<String> = row.get(8)?;
    let actor = match actor_id {
        Some(_) => Some(summary_at(row, 8)?),
        None => None,
    };

    Ok(NotificationRow {
        id: row.get(0)?,
        recipient_id: row.get(1)?,
        kind: row.get(2)?,
        post_id: row.get(3)?,
        comment_id: row.get(4)?,
        message: row.get(5)?,
        read: row.get(6)?,
        created_at: row.get(7)?,
        actor,
    })
}

#[cfg(test)]
mod tests {
    use crate::models::NewNotification;
    use crate::queries::test_support::{account, db};

    fn note(id: &str, recipient: &str, actor: Option<&str>) -> NewNotification {
        NewNotification {
            id: id.to_string(),
            recipient_id: recipient.to_string(),
            actor_id: actor.map(str::to_string),
            kind: "follow",
            post_id: None,
            comment_id: None,
            message: "someone followed you".to_string(),
        }
    }

    #[test]
    fn read_state_is_scoped_to_recipient() {
        let db = db();
        let alice = account(&db, "alice");
        let bob = account(&db, "bob");
        db.insert_notification(&note("n1", &alice, Some(&bob))).unwrap();

        assert!(!db.mark_notification_read("n1", &bob).unwrap());
        assert_eq!(db.unread_notification_count(&alice).unwrap(), 1);
        assert!(db.mark_notification_read("n1", &alice).unwrap());
        assert_eq!(db.unread_notification_count(&alice).unwrap(), 0);

        let row = db.get_notification("n1").unwrap().unwrap();
        assert_eq!(row.actor.unwrap().username, "bob");
    }

    #[test]
    fn fan_out_and_unread_filter() {
        let db = db();
        let alice = account(&db, "alice");
        let batch = vec![note("n1", &alice, None), note("n2", &alice, None), note("n3", &alice, None)];
        assert_eq!(db.insert_notifications(&batch).unwrap(), 3);

        db.mark_notification_read("n2", &alice).unwrap();
        assert_eq!(db.list_notifications(&alice, 10, true).unwrap().len(), 2);
        assert_eq!(db.list_notifications(&alice, 10, false).unwrap().len(), 3);
        assert_eq!(db.mark_all_notifications_read(&alice).unwrap(), 2);

        assert!(db.delete_notification("n1", &alice).unwrap());
        assert!(!db.delete_notification("n1", &alice).unwrap());
        assert!(db.get_notification("n3").unwrap().unwrap().actor.is_none());
    }
}
