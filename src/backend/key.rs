//! Stable key guarantor.
//!
//! Every browsable table carries a unique integer key column. When the column
//! is missing it is added, backfilled from `rowid`, protected by a unique
//! index, and kept growing for later inserts by an `AFTER INSERT` trigger.

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::backend::error::{Result, SeekError};
use crate::backend::view::quote_ident;

/// Outcome of [`ensure_stable_key`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KeyStatus {
    /// The column already existed and was adopted unchanged.
    Adopted,
    /// The column was added and backfilled with this many rows.
    Created {
        /// Rows that received a key value.
        backfilled: usize,
    },
}

/// Deterministic name of the unique index protecting `key` on `table`.
pub fn key_index_name(table: &str, key: &str) -> String {
    format!("idx_{table}_{key}")
}

/// Deterministic name of the trigger assigning keys to new rows.
pub fn key_trigger_name(table: &str, key: &str) -> String {
    format!("trg_{table}_{key}")
}

pub(crate) fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    const OP: &str = "ensure_stable_key";
    let mut stmt = conn
        .prepare("SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2")
        .map_err(|err| SeekError::ddl(OP, table, err))?;
    let found = stmt
        .query_row([table, column], |_| Ok(()))
        .optional()
        .map_err(|err| SeekError::ddl(OP, table, err))?;
    Ok(found.is_some())
}

/// Ensures `table` has the integer stable key column `key`.
///
/// The add/backfill/index/trigger steps run in one transaction, so a failed
/// attempt leaves no half-created column behind and may simply be retried.
pub fn ensure_stable_key(conn: &mut Connection, table: &str, key: &str) -> Result<KeyStatus> {
    const OP: &str = "ensure_stable_key";
    if has_column(conn, table, key)? {
        debug!(table, key, "backend.ensure_stable_key.adopted");
        return Ok(KeyStatus::Adopted);
    }

    let qt = quote_ident(table);
    let qk = quote_ident(key);
    let tx = conn
        .transaction()
        .map_err(|err| SeekError::ddl(OP, table, err))?;
    tx.execute(&format!("ALTER TABLE {qt} ADD COLUMN {qk} INTEGER"), [])
        .map_err(|err| SeekError::ddl(OP, table, err))?;
    let backfilled = tx
        .execute(
            &format!("UPDATE {qt} SET {qk} = rowid WHERE {qk} IS NULL"),
            [],
        )
        .map_err(|err| SeekError::ddl(OP, table, err))?;
    tx.execute(
        &format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {qt}({qk})",
            quote_ident(&key_index_name(table, key))
        ),
        [],
    )
    .map_err(|err| SeekError::ddl(OP, table, err))?;
    tx.execute(
        &format!(
            "CREATE TRIGGER IF NOT EXISTS {} AFTER INSERT ON {qt} \
             WHEN NEW.{qk} IS NULL BEGIN \
             UPDATE {qt} SET {qk} = (SELECT COALESCE(MAX({qk}), 0) + 1 FROM {qt}) \
             WHERE rowid = NEW.rowid; END",
            quote_ident(&key_trigger_name(table, key))
        ),
        [],
    )
    .map_err(|err| SeekError::ddl(OP, table, err))?;
    tx.commit().map_err(|err| SeekError::ddl(OP, table, err))?;

    info!(table, key, backfilled, "backend.ensure_stable_key.backfilled");
    Ok(KeyStatus::Created { backfilled })
}
