use anyhow::Result;
use rusqlite::{Row, params};

use super::{NOW, OptionalExt};
use crate::Database;
use crate::models::{NewTransaction, TransactionRow};

const TRANSACTION_COLUMNS: &str = "id, account_id, order_id, request_id, amount, credits, status, credit_error,
        retry_count, trans_id, result_code, message, pay_url, created_at, updated_at";

impl Database {
    pub fn insert_transaction(&self, tx: &NewTransaction<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO transactions (id, account_id, order_id, request_id, amount, credits)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![tx.id, tx.account_id, tx.order_id, tx.request_id, tx.amount, tx.credits],
            )?;
            Ok(())
        })
    }

    pub fn get_transaction_by_order(&self, order_id: &str) -> Result<Option<TransactionRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE order_id = ?1"),
                [order_id],
                transaction_from_row,
            )
            .optional()
        })
    }

    pub fn list_transactions(&self, account_id: &str, limit: u32) -> Result<Vec<TransactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE account_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2"
            ))?;
            let rows = stmt
                .query_map(params![account_id, limit], transaction_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn set_pay_url(&self, order_id: &str, pay_url: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("UPDATE transactions SET pay_url = ?2, updated_at = {NOW} WHERE order_id = ?1"),
                params![order_id, pay_url],
            )?;
            Ok(())
        })
    }

    /// pending → success. Returns false if the transaction had already left
    /// `pending`, so concurrent settlements grant credit at most once.
    pub fn mark_transaction_success(
        &self,
        order_id: &str,
        trans_id: Option<i64>,
        result_code: i64,
        message: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE transactions
                     SET status = 'success', trans_id = ?2, result_code = ?3, message = ?4, updated_at = {NOW}
                     WHERE order_id = ?1 AND status = 'pending'"
                ),
                params![order_id, trans_id, result_code, message],
            )?;
            Ok(changed > 0)
        })
    }

    /// pending → failed. Returns false if the transaction had already left `pending`.
    pub fn mark_transaction_failed(&self, order_id: &str, result_code: Option<i64>, message: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                &format!(
                    "UPDATE transactions
                     SET status = 'failed', result_code = ?2, message = ?3, updated_at = {NOW}
                     WHERE order_id = ?1 AND status = 'pending'"
                ),
                params![order_id, result_code, message],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn set_credit_error(&self, order_id: &str, credit_error: bool) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                &format!("UPDATE transactions SET credit_error = ?2, updated_at = {NOW} WHERE order_id = ?1"),
                params![order_id, credit_error],
            )?;
            Ok(())
        })
    }

    /// Successful payments whose credit grant failed and still have retries left.
    pub fn credit_retry_candidates(&self, max_retries: i64) -> Result<Vec<TransactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRANSACTION_COLUMNS} FROM transactions
                 WHERE status = 'success' AND credit_error = 1 AND retry_count < ?1
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt
                .query_map([max_retries], transaction_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns the new retry count.
    pub fn bump_retry_count(&self, order_id: &str) -> Result<i64> {
        self.with_conn(|conn| {
            let count = conn.query_row(
                &format!(
                    "UPDATE transactions SET retry_count = retry_count + 1, updated_at = {NOW}
                     WHERE order_id = ?1 RETURNING retry_count"
                ),
                [order_id],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<TransactionRow> {
    Ok(TransactionRow {
        id: row.get(0)?,
        account_id: row.get(1)?,
        order_id: row.get(2)?,
        request_id: row.get(3)?,
        amount: row.get(4)?,
        credits: row.get(5)?,
        status: row.get(6)?,
        credit_error: row.get(7)?,
        retry_count: row.get(8)?,
        trans_id: row.get(9)?,
        result_code: row.get(10)?,
        message: row.get(11)?,
        pay_url: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}
