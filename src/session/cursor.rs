/// Bookkeeping for the window currently shown.
///
/// Every transition builds a fresh value; the session swaps it in only after
/// the fetch that produced it has fully succeeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    /// 1-based display position of the first buffered row.
    pub row_base: u64,
    /// Number of rows in the current window.
    pub window_size: usize,
    /// Lowest key in the current window.
    pub first_key: Option<i64>,
    /// Highest key in the current window.
    pub last_key: Option<i64>,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            row_base: 1,
            window_size: 0,
            first_key: None,
            last_key: None,
        }
    }
}

/// Key bounds and size of a freshly streamed window, in ascending order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Bounds {
    pub(crate) first_key: i64,
    pub(crate) last_key: i64,
    pub(crate) len: usize,
}

impl Cursor {
    /// Window starting at row 1.
    pub(crate) fn first(bounds: Option<Bounds>) -> Self {
        match bounds {
            Some(bounds) => Self::at(1, bounds),
            None => Self::default(),
        }
    }

    /// Window starting at an explicit display position.
    pub(crate) fn at(row_base: u64, bounds: Bounds) -> Self {
        Self {
            row_base: row_base.max(1),
            window_size: bounds.len,
            first_key: Some(bounds.first_key),
            last_key: Some(bounds.last_key),
        }
    }

    /// Window following this one; the base advances by the old window size.
    pub(crate) fn advanced(&self, bounds: Bounds) -> Self {
        Self::at(self.row_base + self.window_size as u64, bounds)
    }

    /// Window preceding this one; the base moves back by the new window
    /// size and never drops below 1.
    pub(crate) fn retreated(&self, bounds: Bounds) -> Self {
        Self::at(self.row_base.saturating_sub(bounds.len as u64), bounds)
    }
}
