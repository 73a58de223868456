/// Destination for the rows of the current window.
///
/// The session clears and repopulates the sink after every successful fetch;
/// the UI reads from it to render.
pub trait RowSink {
    /// Drops all buffered rows, keeping the column list.
    fn clear(&mut self);
    /// Appends one row of display values, ordered like the columns.
    fn append_row(&mut self, values: Vec<String>);
    /// Replaces the column list.
    fn set_columns(&mut self, names: &[String]);
}

/// Owned, reusable row buffer.
///
/// Allocations are kept across [`clear`](RowSink::clear) calls so a session
/// scrolling with a fixed page size stops allocating row storage after the
/// first window.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RowBuffer {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl RowBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Column names of the buffered rows.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Buffered rows in display order.
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    /// Row at `idx`, if buffered.
    pub fn row(&self, idx: usize) -> Option<&[String]> {
        self.rows.get(idx).map(Vec::as_slice)
    }

    /// Number of buffered rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if no rows are buffered.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of `name` in the column list.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col == name)
    }

    /// Values of column `name` across the buffered rows.
    pub fn column_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let idx = self.column_index(name);
        self.rows
            .iter()
            .filter_map(move |row| idx.and_then(|i| row.get(i)).map(String::as_str))
    }
}

impl RowSink for RowBuffer {
    fn clear(&mut self) {
        self.rows.clear();
    }

    fn append_row(&mut self, values: Vec<String>) {
        self.rows.push(values);
    }

    fn set_columns(&mut self, names: &[String]) {
        self.columns.clear();
        self.columns.extend(names.iter().cloned());
    }
}
