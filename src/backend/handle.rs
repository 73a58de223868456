use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Instant;

use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

use crate::backend::error::{Result, SeekError};
use crate::backend::key::{self, KeyStatus};
use crate::backend::options::{BackendOptions, MemoryMode};
use crate::backend::rows::{Flow, RowView, Seek};
use crate::backend::scratch::{ScratchDir, ScratchProvider, ScratchRoot};
use crate::backend::view::{quote_ident, ViewSpec};

/// On-disk signature of an SQLite 3 database file.
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Returns true if `path` is a readable file carrying the SQLite header.
pub fn is_sqlite_file(path: &Path) -> bool {
    let mut header = [0u8; 16];
    match File::open(path) {
        Ok(mut file) => file.read_exact(&mut header).is_ok() && &header == SQLITE_HEADER,
        Err(_) => false,
    }
}

/// Whether a backend works on a user file or a private scratch store.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StoreMode {
    /// Opened an existing, user-supplied database file.
    Connected,
    /// Created a throwaway store in a scratch directory.
    Ephemeral,
}

#[derive(Debug)]
enum Storage {
    Connected(PathBuf),
    Ephemeral(ScratchDir),
}

impl Storage {
    fn db_path(&self) -> &Path {
        match self {
            Storage::Connected(path) => path,
            Storage::Ephemeral(scratch) => scratch.db_path(),
        }
    }
}

/// One connection to a backing store plus its single active view.
///
/// The four windowed reads ([`seek_first`](Self::seek_first),
/// [`seek_after`](Self::seek_after), [`seek_before`](Self::seek_before),
/// [`seek_by_id`](Self::seek_by_id)) are bounded by `limit` and walk the key
/// index; none of them scans the whole view.
#[derive(Debug)]
pub struct Backend {
    conn: Option<Connection>,
    storage: Option<Storage>,
    mode: MemoryMode,
    view_name: String,
    key_name: String,
    view: Option<ViewSpec>,
}

impl Backend {
    /// Opens `path` in connected mode if it is an SQLite file, otherwise
    /// creates an ephemeral store under the configured scratch root.
    pub fn open(path: Option<&Path>, opts: &BackendOptions) -> Result<Self> {
        let scratch = ScratchRoot::new(&opts.scratch_root);
        Self::open_with_scratch(path, opts, &scratch)
    }

    /// Same as [`open`](Self::open) with an explicit scratch provider.
    pub fn open_with_scratch(
        path: Option<&Path>,
        opts: &BackendOptions,
        scratch: &dyn ScratchProvider,
    ) -> Result<Self> {
        let storage = match path {
            Some(path) if is_sqlite_file(path) => Storage::Connected(path.to_path_buf()),
            other => {
                if let Some(path) = other {
                    info!(path = %path.display(), "backend.open.not_sqlite_fallback");
                }
                Storage::Ephemeral(ScratchDir::create(scratch)?)
            }
        };
        let db_path = storage.db_path().to_path_buf();
        let conn = match Connection::open(&db_path) {
            Ok(conn) => conn,
            Err(err) => {
                discard_storage(storage);
                return Err(SeekError::open(&db_path, err));
            }
        };
        if let Err(err) = apply_pragmas(&conn, opts.mode) {
            drop(conn);
            discard_storage(storage);
            return Err(SeekError::open(&db_path, err));
        }

        let backend = Self {
            conn: Some(conn),
            storage: Some(storage),
            mode: opts.mode,
            view_name: opts.view_name.clone(),
            key_name: opts.key_name.clone(),
            view: None,
        };
        info!(
            path = %db_path.display(),
            store = ?backend.store_mode(),
            mode = opts.mode.as_str(),
            "backend.open"
        );
        Ok(backend)
    }

    /// Connected or ephemeral; `None` once closed.
    pub fn store_mode(&self) -> Option<StoreMode> {
        self.storage.as_ref().map(|storage| match storage {
            Storage::Connected(_) => StoreMode::Connected,
            Storage::Ephemeral(_) => StoreMode::Ephemeral,
        })
    }

    /// Path of the database file backing this handle.
    pub fn db_path(&self) -> Option<&Path> {
        self.storage.as_ref().map(Storage::db_path)
    }

    /// Scratch directory, present only in ephemeral mode.
    pub fn scratch_dir(&self) -> Option<&Path> {
        match self.storage.as_ref()? {
            Storage::Ephemeral(scratch) => Some(scratch.dir_path()),
            Storage::Connected(_) => None,
        }
    }

    /// Tuning profile the handle was opened with.
    pub fn memory_mode(&self) -> MemoryMode {
        self.mode
    }

    /// Name of the view reads run against.
    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    /// Name of the active stable key column.
    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    /// Definition of the current view, if one was installed.
    pub fn current_view(&self) -> Option<&ViewSpec> {
        self.view.as_ref()
    }

    /// Returns true once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    fn conn(&self) -> Result<&Connection> {
        self.conn.as_ref().ok_or(SeekError::NotReady("backend is closed"))
    }

    fn conn_mut(&mut self) -> Result<&mut Connection> {
        self.conn.as_mut().ok_or(SeekError::NotReady("backend is closed"))
    }

    /// Direct access to the connection for offline bulk loading.
    ///
    /// Statements issued here bypass the view and stable-key bookkeeping:
    /// rows inserted before [`ensure_stable_key`](Self::ensure_stable_key)
    /// are backfilled by it, rows inserted afterwards get keys from the
    /// insert trigger only if they leave the key column NULL.
    pub fn raw_connection(&mut self) -> Result<&mut Connection> {
        self.conn_mut()
    }

    /// Creates `table` with the given column definitions if it is absent.
    pub fn ensure_table(&self, table: &str, column_defs: &str) -> Result<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({column_defs})",
            quote_ident(table)
        );
        self.conn()?
            .execute_batch(&sql)
            .map_err(|err| SeekError::ddl("ensure_table", table, err))?;
        debug!(table, "backend.ensure_table");
        Ok(())
    }

    /// Ensures `table` has the stable key column `key` and adopts it as the
    /// active key name.
    pub fn ensure_stable_key(&mut self, table: &str, key: &str) -> Result<KeyStatus> {
        let status = key::ensure_stable_key(self.conn_mut()?, table, key)?;
        self.key_name = key.to_string();
        Ok(status)
    }

    /// Replaces the current view with `spec`, ordered by its sort list and
    /// then the key. No rows are copied.
    pub fn set_view(&mut self, spec: ViewSpec, key: Option<&str>) -> Result<()> {
        const OP: &str = "set_view";
        if let Some(key) = key {
            if key != self.key_name {
                self.key_name = key.to_string();
            }
        }
        let drop_sql = format!("DROP VIEW IF EXISTS temp.{}", quote_ident(&self.view_name));
        let create_sql = spec.create_sql(&self.view_name, &self.key_name);
        let probe_sql = format!("SELECT * FROM {} LIMIT 0", quote_ident(&self.view_name));

        self.view = None;
        let conn = self.conn()?;
        conn.execute_batch(&drop_sql)
            .map_err(|err| SeekError::ddl(OP, &spec.table, err))?;
        conn.execute_batch(&create_sql)
            .map_err(|err| SeekError::ddl(OP, &spec.table, err))?;
        // Unknown columns in filter or sort only surface when the view is compiled.
        if let Err(err) = conn.prepare(&probe_sql) {
            let _ = conn.execute_batch(&drop_sql);
            return Err(SeekError::ddl(OP, &spec.table, err));
        }
        debug!(
            table = %spec.table,
            filter = %spec.where_clause(),
            order_by = %spec.order_by(&self.key_name),
            "backend.set_view"
        );
        self.view = Some(spec);
        Ok(())
    }

    fn active_view(&self, op: &'static str) -> Result<&str> {
        match self.view {
            Some(_) => Ok(&self.view_name),
            None => Err(SeekError::NoView { op }),
        }
    }

    /// Column names of the current view, in order.
    pub fn view_columns(&self) -> Result<Vec<String>> {
        const OP: &str = "view_columns";
        let view = self.active_view(OP)?;
        let conn = self.conn()?;
        let stmt = conn
            .prepare(&format!("SELECT * FROM {} LIMIT 0", quote_ident(view)))
            .map_err(|err| SeekError::query(OP, view, err))?;
        Ok(stmt.column_names().into_iter().map(String::from).collect())
    }

    /// Runs one windowed read and hands each row to `on_row`.
    ///
    /// Returns the number of rows delivered, including the row on which
    /// `on_row` asked to stop.
    pub fn seek<F>(&self, seek: Seek, limit: usize, mut on_row: F) -> Result<usize>
    where
        F: FnMut(&RowView<'_, '_>) -> Flow,
    {
        let op = seek.op();
        let view = self.active_view(op)?;
        let conn = self.conn()?;
        let qv = quote_ident(view);
        let qk = quote_ident(&self.key_name);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let (sql, bound): (String, Option<i64>) = match seek {
            Seek::First => (format!("SELECT * FROM {qv} LIMIT ?1"), None),
            Seek::After(last) => (
                format!("SELECT * FROM {qv} WHERE {qk} > ?2 ORDER BY {qk} LIMIT ?1"),
                Some(last),
            ),
            Seek::Before(first) => (
                format!("SELECT * FROM {qv} WHERE {qk} < ?2 ORDER BY {qk} DESC LIMIT ?1"),
                Some(first),
            ),
            Seek::ById(target) => (
                format!("SELECT * FROM {qv} WHERE {qk} >= ?2 ORDER BY {qk} LIMIT ?1"),
                Some(target),
            ),
        };

        let start = Instant::now();
        let mut stmt = conn
            .prepare_cached(&sql)
            .map_err(|err| SeekError::query(op, view, err))?;
        let mut rows = match bound {
            Some(key) => stmt.query(params![limit, key]),
            None => stmt.query(params![limit]),
        }
        .map_err(|err| SeekError::query(op, view, err))?;

        let mut delivered = 0usize;
        while let Some(row) = rows.next().map_err(|err| SeekError::query(op, view, err))? {
            delivered += 1;
            if on_row(&RowView::new(row)) == Flow::Stop {
                break;
            }
        }
        debug!(
            op,
            delivered,
            elapsed_us = start.elapsed().as_micros() as u64,
            "backend.seek"
        );
        Ok(delivered)
    }

    /// Leading `limit` rows of the view in its own order.
    pub fn seek_first<F>(&self, limit: usize, on_row: F) -> Result<usize>
    where
        F: FnMut(&RowView<'_, '_>) -> Flow,
    {
        self.seek(Seek::First, limit, on_row)
    }

    /// Up to `limit` rows with key strictly greater than `last_key`, ascending.
    pub fn seek_after<F>(&self, last_key: i64, limit: usize, on_row: F) -> Result<usize>
    where
        F: FnMut(&RowView<'_, '_>) -> Flow,
    {
        self.seek(Seek::After(last_key), limit, on_row)
    }

    /// Up to `limit` rows with key strictly less than `first_key`.
    ///
    /// Rows arrive in descending key order; callers reverse them for display.
    pub fn seek_before<F>(&self, first_key: i64, limit: usize, on_row: F) -> Result<usize>
    where
        F: FnMut(&RowView<'_, '_>) -> Flow,
    {
        self.seek(Seek::Before(first_key), limit, on_row)
    }

    /// Up to `limit` rows with key at or after `target_key`, ascending.
    pub fn seek_by_id<F>(&self, target_key: i64, limit: usize, on_row: F) -> Result<usize>
    where
        F: FnMut(&RowView<'_, '_>) -> Flow,
    {
        self.seek(Seek::ById(target_key), limit, on_row)
    }

    /// Number of rows in the current view. Potentially O(n); keep it off the
    /// redraw path.
    pub fn count(&self) -> Result<u64> {
        self.count_where("count", None)
    }

    /// Number of view rows whose key is strictly less than `key`.
    /// Potentially O(n), like [`count`](Self::count).
    pub fn count_before(&self, key: i64) -> Result<u64> {
        self.count_where("count_before", Some(key))
    }

    fn count_where(&self, op: &'static str, below: Option<i64>) -> Result<u64> {
        let view = self.active_view(op)?;
        let conn = self.conn()?;
        let qv = quote_ident(view);
        let result = match below {
            Some(key) => conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM {qv} WHERE {} < ?1",
                    quote_ident(&self.key_name)
                ),
                [key],
                |row| row.get::<_, i64>(0),
            ),
            None => conn.query_row(&format!("SELECT COUNT(*) FROM {qv}"), [], |row| {
                row.get::<_, i64>(0)
            }),
        };
        let count = result.map_err(|err| SeekError::query(op, view, err))?;
        Ok(count.max(0) as u64)
    }

    /// Names of the user tables in the store, sorted.
    pub fn table_names(&self) -> Result<Vec<String>> {
        const OP: &str = "table_names";
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT name FROM sqlite_master \
                 WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            )
            .map_err(|err| SeekError::query(OP, "sqlite_master", err))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .and_then(|rows| rows.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(|err| SeekError::query(OP, "sqlite_master", err))?;
        Ok(names)
    }

    /// Returns true if a user table named `table` exists.
    pub fn table_exists(&self, table: &str) -> Result<bool> {
        Ok(self.table_names()?.iter().any(|name| name == table))
    }

    /// Writes a compacted copy of the live store to `dest`.
    ///
    /// `dest` must not exist yet, which also rules out the live store itself;
    /// an existing destination is an I/O error of kind `AlreadyExists`. The
    /// copy is produced by `VACUUM INTO`, so a half-written file is never left
    /// under the final name.
    pub fn save_as(&self, dest: impl AsRef<Path>) -> Result<()> {
        let dest = dest.as_ref();
        let conn = self.conn()?;
        if dest.exists() {
            return Err(SeekError::io(
                "save_as",
                dest,
                io::Error::from(io::ErrorKind::AlreadyExists),
            ));
        }
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| SeekError::io("create save directory", parent, err))?;
        }
        let start = Instant::now();
        let target = dest.to_string_lossy().into_owned();
        conn.execute("VACUUM INTO ?1", params![target])
            .map_err(|source| SeekError::SaveAs {
                dest: dest.to_path_buf(),
                source,
            })?;
        info!(
            dest = %dest.display(),
            duration_ms = start.elapsed().as_secs_f64() * 1_000.0,
            "backend.save_as"
        );
        Ok(())
    }

    /// Releases the connection and, in ephemeral mode, removes the scratch
    /// store. Calling it again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        self.view = None;
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        let storage = self.storage.take();
        let closed = conn.close().map_err(|(_, err)| SeekError::Close(err));
        let removed = match storage {
            Some(Storage::Ephemeral(scratch)) => scratch.remove(),
            _ => Ok(()),
        };
        info!("backend.close");
        closed.and(removed)
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "backend.drop.close_failed");
        }
    }
}

fn apply_pragmas(conn: &Connection, mode: MemoryMode) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "FILE")?;
    conn.pragma_update(None, "cache_spill", "ON")?;
    conn.pragma_update(None, "cache_size", -mode.cache_kib())?;
    Ok(())
}

fn discard_storage(storage: Storage) {
    if let Storage::Ephemeral(scratch) = storage {
        if let Err(err) = scratch.remove() {
            warn!(error = %err, "backend.open.scratch_cleanup_failed");
        }
    }
}
