mod accounts;
mod comments;
mod follows;
mod messages;
mod notifications;
mod payments;
mod posts;

use anyhow::Result;
use rusqlite::Row;

use crate::models::AccountSummaryRow;

/// Timestamp expression matching the column defaults.
pub(crate) const NOW: &str = "strftime('%Y-%m-%dT%H:%M:%fZ', 'now')";

/// Read an account summary from four consecutive columns starting at `start`:
/// id, username, display_name, avatar_url.
pub(crate) fn summary_at(row: &Row<'_>, start: usize) -> rusqlite::Result<AccountSummaryRow> {
    Ok(AccountSummaryRow {
        id: row.get(start)?,
        username: row.get(start + 1)?,
        display_name: row.get(start + 2)?,
        avatar_url: row.get(start + 3)?,
    })
}

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
