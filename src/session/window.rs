use std::path::Path;

use rusqlite::types::{Type, ValueRef};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::backend::{
    Backend, BackendOptions, Flow, MemoryMode, Result, Seek, SeekError, ViewSpec,
};
use crate::session::buffer::RowSink;
use crate::session::cursor::{Bounds, Cursor};

/// Lifecycle of a [`WindowSession`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    /// Torn down; every fetch fails.
    Closed,
    /// Backend open, key and view being prepared.
    Opening,
    /// Fetches allowed.
    Ready,
}

/// Outcome of one fetch.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Window {
    /// Rows written to the sink.
    pub delivered: usize,
    /// True when fewer rows than requested were available, i.e. the fetch
    /// hit the end (or, for [`WindowSession::fetch_prev`], the start) of the
    /// view.
    pub reached_boundary: bool,
}

impl Window {
    fn new(delivered: usize, page_size: usize) -> Self {
        Self {
            delivered,
            reached_boundary: delivered < page_size,
        }
    }

    fn boundary() -> Self {
        Self {
            delivered: 0,
            reached_boundary: true,
        }
    }
}

/// Options for opening a [`WindowSession`].
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Initial filter expression; empty means all rows.
    pub filter: String,
    /// Initial sort list; empty means key order.
    ///
    /// Only the first window follows this order. Later windows are read by
    /// key, so a list that does not lead with the key ascending scrolls in
    /// key order from the first window's last key on.
    pub sort: String,
    /// Backend options; the session defaults to [`MemoryMode::LowRam`].
    pub backend: BackendOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            filter: String::new(),
            sort: String::new(),
            backend: BackendOptions::default().mode(MemoryMode::LowRam),
        }
    }
}

struct Layout {
    columns: Vec<String>,
    key_index: usize,
}

/// Rows of one window in display (ascending key) order.
struct Page {
    rows: Vec<Vec<String>>,
    keys: Vec<i64>,
}

impl Page {
    fn bounds(&self) -> Option<Bounds> {
        Some(Bounds {
            first_key: *self.keys.first()?,
            last_key: *self.keys.last()?,
            len: self.keys.len(),
        })
    }

    fn write_to<S: RowSink + ?Sized>(self, sink: &mut S) {
        sink.clear();
        for row in self.rows {
            sink.append_row(row);
        }
    }
}

/// Scrollable window over one table.
///
/// The session keeps only the key bounds of the displayed window and a
/// display row-base, so a redraw loop can ask for the next or previous page
/// without holding any cursor of its own. Rows live in the caller's
/// [`RowSink`]; a fetch either updates both the sink and the bookkeeping or,
/// on error, neither.
#[derive(Debug)]
pub struct WindowSession {
    backend: Backend,
    table: String,
    columns: Vec<String>,
    key_index: usize,
    cursor: Cursor,
    state: SessionState,
}

impl WindowSession {
    /// Opens `table` for browsing and fetches its first window.
    ///
    /// `path` follows [`Backend::open`]: an SQLite file is used in place,
    /// anything else yields an empty ephemeral store.
    pub fn open_for_table<S: RowSink + ?Sized>(
        path: Option<&Path>,
        table: &str,
        page_size: usize,
        sink: &mut S,
    ) -> Result<(Self, Window)> {
        Self::open_with_options(path, table, page_size, &SessionOptions::default(), sink)
    }

    /// [`open_for_table`](Self::open_for_table) with explicit options.
    pub fn open_with_options<S: RowSink + ?Sized>(
        path: Option<&Path>,
        table: &str,
        page_size: usize,
        opts: &SessionOptions,
        sink: &mut S,
    ) -> Result<(Self, Window)> {
        check_page_size(page_size)?;
        let backend = Backend::open(path, &opts.backend)?;
        Self::attach_with_options(backend, table, page_size, opts, sink)
    }

    /// Reuses an already open backend for browsing `table`.
    pub fn attach<S: RowSink + ?Sized>(
        backend: Backend,
        table: &str,
        page_size: usize,
        sink: &mut S,
    ) -> Result<(Self, Window)> {
        let opts = SessionOptions {
            backend: BackendOptions::default().key_name(backend.key_name()),
            ..SessionOptions::default()
        };
        Self::attach_with_options(backend, table, page_size, &opts, sink)
    }

    /// [`attach`](Self::attach) with explicit options. Only the key name
    /// and the initial filter/sort of `opts` apply.
    pub fn attach_with_options<S: RowSink + ?Sized>(
        backend: Backend,
        table: &str,
        page_size: usize,
        opts: &SessionOptions,
        sink: &mut S,
    ) -> Result<(Self, Window)> {
        check_page_size(page_size)?;
        let mut session = Self {
            backend,
            table: table.to_string(),
            columns: Vec::new(),
            key_index: 0,
            cursor: Cursor::default(),
            state: SessionState::Opening,
        };
        session
            .backend
            .ensure_stable_key(table, &opts.backend.key_name)?;
        let spec = ViewSpec::new(table)
            .filter(opts.filter.as_str())
            .sort(opts.sort.as_str());
        let layout = session.install_view(spec)?;
        session.adopt_layout(layout, sink);
        session.state = SessionState::Ready;
        let window = session.fetch_first(page_size, sink)?;
        info!(
            table,
            columns = session.columns.len(),
            delivered = window.delivered,
            "session.open"
        );
        Ok((session, window))
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Table being browsed.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Column names of the current view.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of the key column within [`columns`](Self::columns).
    pub fn key_index(&self) -> usize {
        self.key_index
    }

    /// Full cursor bookkeeping for the displayed window.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// 1-based display position of the first buffered row.
    pub fn row_base(&self) -> u64 {
        match self.state {
            SessionState::Ready => self.cursor.row_base.max(1),
            _ => 1,
        }
    }

    /// Size of the most recent window.
    pub fn last_window_size(&self) -> usize {
        match self.state {
            SessionState::Ready => self.cursor.window_size,
            _ => 0,
        }
    }

    /// Backend serving this session.
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// Mutable backend access, e.g. for [`Backend::raw_connection`].
    /// Redefining the view through it bypasses the session's bookkeeping.
    pub fn backend_mut(&mut self) -> &mut Backend {
        &mut self.backend
    }

    /// Row count of the current view. Potentially O(n).
    pub fn count(&self) -> Result<u64> {
        self.ensure_ready("count")?;
        self.backend.count()
    }

    /// Loads the first window of the view. Zero rows means the view is empty.
    pub fn fetch_first<S: RowSink + ?Sized>(
        &mut self,
        page_size: usize,
        sink: &mut S,
    ) -> Result<Window> {
        self.ensure_ready("fetch_first")?;
        check_page_size(page_size)?;
        let page = self.stream(Seek::First, page_size, self.key_index)?;
        let cursor = Cursor::first(page.bounds());
        Ok(self.commit(page, cursor, page_size, sink, "session.fetch_first"))
    }

    /// Loads the window after the current one.
    ///
    /// Returns zero rows, leaving sink and bookkeeping untouched, once the end
    /// of the view is reached.
    pub fn fetch_next<S: RowSink + ?Sized>(
        &mut self,
        page_size: usize,
        sink: &mut S,
    ) -> Result<Window> {
        self.ensure_ready("fetch_next")?;
        check_page_size(page_size)?;
        let Some(last_key) = self.cursor.last_key else {
            return Ok(Window::boundary());
        };
        let page = self.stream(Seek::After(last_key), page_size, self.key_index)?;
        let Some(bounds) = page.bounds() else {
            debug!(last_key, "session.fetch_next.end");
            return Ok(Window::boundary());
        };
        let cursor = self.cursor.advanced(bounds);
        Ok(self.commit(page, cursor, page_size, sink, "session.fetch_next"))
    }

    /// Loads the window before the current one, in ascending order.
    ///
    /// Returns zero rows, leaving sink and bookkeeping untouched, at the start
    /// of the view.
    pub fn fetch_prev<S: RowSink + ?Sized>(
        &mut self,
        page_size: usize,
        sink: &mut S,
    ) -> Result<Window> {
        self.ensure_ready("fetch_prev")?;
        check_page_size(page_size)?;
        let Some(first_key) = self.cursor.first_key else {
            return Ok(Window::boundary());
        };
        let page = self.stream(Seek::Before(first_key), page_size, self.key_index)?;
        let Some(bounds) = page.bounds() else {
            debug!(first_key, "session.fetch_prev.start");
            return Ok(Window::boundary());
        };
        let cursor = self.cursor.retreated(bounds);
        Ok(self.commit(page, cursor, page_size, sink, "session.fetch_prev"))
    }

    /// Jumps to the window starting at the first row whose key is at least
    /// `key`.
    ///
    /// The row-base is recomputed by counting the preceding rows, which can
    /// be O(n); use it for explicit jumps, not on every redraw. Returns zero
    /// rows, leaving everything untouched, when no such row exists.
    pub fn fetch_at_key<S: RowSink + ?Sized>(
        &mut self,
        key: i64,
        page_size: usize,
        sink: &mut S,
    ) -> Result<Window> {
        self.ensure_ready("fetch_at_key")?;
        check_page_size(page_size)?;
        let page = self.stream(Seek::ById(key), page_size, self.key_index)?;
        let Some(bounds) = page.bounds() else {
            return Ok(Window::boundary());
        };
        let preceding = self.backend.count_before(bounds.first_key)?;
        let cursor = Cursor::at(preceding + 1, bounds);
        Ok(self.commit(page, cursor, page_size, sink, "session.fetch_at_key"))
    }

    /// Redefines the view with a new filter and sort list and loads its first
    /// window. On failure the previous view and bookkeeping stay in place.
    ///
    /// `sort` orders the first window only; [`fetch_next`](Self::fetch_next),
    /// [`fetch_prev`](Self::fetch_prev) and
    /// [`fetch_at_key`](Self::fetch_at_key) always walk the key. Rows can
    /// repeat or be skipped when scrolling a view sorted by anything else.
    pub fn set_view<S: RowSink + ?Sized>(
        &mut self,
        filter: &str,
        sort: &str,
        page_size: usize,
        sink: &mut S,
    ) -> Result<Window> {
        self.ensure_ready("set_view")?;
        check_page_size(page_size)?;
        let previous = self.backend.current_view().cloned();
        let spec = ViewSpec::new(self.table.as_str()).filter(filter).sort(sort);
        let staged = self.install_view(spec).and_then(|layout| {
            let page = self.stream(Seek::First, page_size, layout.key_index)?;
            Ok((layout, page))
        });
        match staged {
            Ok((layout, page)) => {
                self.adopt_layout(layout, sink);
                let cursor = Cursor::first(page.bounds());
                Ok(self.commit(page, cursor, page_size, sink, "session.set_view"))
            }
            Err(err) => {
                if let Some(previous) = previous {
                    if let Err(restore) = self.backend.set_view(previous, None) {
                        warn!(error = %restore, "session.set_view.restore_failed");
                    }
                }
                Err(err)
            }
        }
    }

    /// Tears the session down and closes its backend. Further fetches fail;
    /// closing again is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        self.cursor = Cursor::default();
        info!(table = %self.table, "session.close");
        self.backend.close()
    }

    fn ensure_ready(&self, op: &'static str) -> Result<()> {
        if self.state == SessionState::Ready {
            return Ok(());
        }
        error!(op, state = ?self.state, "session.not_ready");
        Err(SeekError::NotReady("window session is not open"))
    }

    fn install_view(&mut self, spec: ViewSpec) -> Result<Layout> {
        self.backend.set_view(spec, None)?;
        let columns = self.backend.view_columns()?;
        let key = self.backend.key_name();
        let key_index = columns
            .iter()
            .position(|col| col.eq_ignore_ascii_case(key))
            .ok_or_else(|| SeekError::MissingKey {
                view: self.backend.view_name().to_string(),
                key: key.to_string(),
            })?;
        Ok(Layout { columns, key_index })
    }

    fn adopt_layout<S: RowSink + ?Sized>(&mut self, layout: Layout, sink: &mut S) {
        sink.set_columns(&layout.columns);
        self.columns = layout.columns;
        self.key_index = layout.key_index;
    }

    fn stream(&self, seek: Seek, page_size: usize, key_index: usize) -> Result<Page> {
        let mut page = Page {
            rows: Vec::with_capacity(page_size.min(4096)),
            keys: Vec::with_capacity(page_size.min(4096)),
        };
        let mut bad_key: Option<Type> = None;
        self.backend.seek(seek, page_size, |row| match row.value(key_index) {
            Some(ValueRef::Integer(key)) => {
                page.keys.push(key);
                page.rows.push(row.to_strings());
                Flow::Continue
            }
            other => {
                bad_key = Some(other.map_or(Type::Null, |value| value.data_type()));
                Flow::Stop
            }
        })?;
        match bad_key {
            None => {}
            Some(Type::Null) => {
                return Err(SeekError::NullKey {
                    view: self.backend.view_name().to_string(),
                    key: self.backend.key_name().to_string(),
                })
            }
            Some(found) => {
                return Err(SeekError::KeyType {
                    view: self.backend.view_name().to_string(),
                    key: self.backend.key_name().to_string(),
                    found: found.to_string(),
                })
            }
        }
        if matches!(seek, Seek::Before(_)) {
            page.rows.reverse();
            page.keys.reverse();
        }
        Ok(page)
    }

    fn commit<S: RowSink + ?Sized>(
        &mut self,
        page: Page,
        cursor: Cursor,
        page_size: usize,
        sink: &mut S,
        event: &'static str,
    ) -> Window {
        let window = Window::new(page.keys.len(), page_size);
        page.write_to(sink);
        self.cursor = cursor;
        debug!(
            event,
            delivered = window.delivered,
            row_base = cursor.row_base,
            first_key = cursor.first_key,
            last_key = cursor.last_key,
            "session.window"
        );
        window
    }
}

fn check_page_size(page_size: usize) -> Result<()> {
    if page_size == 0 {
        return Err(SeekError::InvalidArgument(
            "page size must be at least 1".to_string(),
        ));
    }
    Ok(())
}
