use rusqlite::types::ValueRef;
use rusqlite::Row;

/// Signal returned by a row consumer after each delivered row.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Flow {
    /// Keep streaming.
    Continue,
    /// Stop after this row.
    Stop,
}

impl From<bool> for Flow {
    fn from(keep_going: bool) -> Self {
        if keep_going {
            Flow::Continue
        } else {
            Flow::Stop
        }
    }
}

/// Which windowed read to run against the current view.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Seek {
    /// Leading rows in the view's own order.
    First,
    /// Rows with key strictly greater than the value, ascending.
    After(i64),
    /// Rows with key strictly less than the value, descending.
    Before(i64),
    /// Rows with key greater than or equal to the value, ascending.
    ById(i64),
}

impl Seek {
    pub(crate) fn op(self) -> &'static str {
        match self {
            Seek::First => "seek_first",
            Seek::After(_) => "seek_after",
            Seek::Before(_) => "seek_before",
            Seek::ById(_) => "seek_by_id",
        }
    }
}

/// Read-only view of one delivered row, addressed by column position.
pub struct RowView<'a, 'stmt> {
    row: &'a Row<'stmt>,
    len: usize,
}

impl<'a, 'stmt> RowView<'a, 'stmt> {
    pub(crate) fn new(row: &'a Row<'stmt>) -> Self {
        let len = row.as_ref().column_count();
        Self { row, len }
    }

    /// Number of columns in the row.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Raw value at `idx`, or `None` past the last column.
    pub fn value(&self, idx: usize) -> Option<ValueRef<'_>> {
        self.row.get_ref(idx).ok()
    }

    /// Integer value at `idx`; `None` for NULL, non-integers, or out of range.
    pub fn get_i64(&self, idx: usize) -> Option<i64> {
        match self.value(idx)? {
            ValueRef::Integer(v) => Some(v),
            _ => None,
        }
    }

    /// Display text of the value at `idx`. NULL renders as an empty string.
    pub fn text(&self, idx: usize) -> String {
        self.value(idx).map(cell_text).unwrap_or_default()
    }

    /// Display text of every column, in order.
    pub fn to_strings(&self) -> Vec<String> {
        (0..self.len).map(|idx| self.text(idx)).collect()
    }
}

fn cell_text(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(v) => v.to_string(),
        ValueRef::Real(v) => real_text(v),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

/// Significant digits SQLite keeps when it converts a REAL to text.
const REAL_DIGITS: i32 = 15;

/// Renders `v` the way SQLite's `%!.15g` does: 15 significant digits,
/// trailing zeros dropped but at least one fractional digit kept, exponent
/// form below 1e-4 or from 1e15 upwards.
fn real_text(v: f64) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "Inf" } else { "-Inf" }.to_string();
    }
    let sign = if v.is_sign_negative() { "-" } else { "" };
    if v == 0.0 {
        return format!("{sign}0.0");
    }

    let sci = format!("{:.*e}", (REAL_DIGITS - 1) as usize, v.abs());
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();

    if exp < -4 || exp >= REAL_DIGITS {
        let (head, tail) = digits.split_at(1);
        let exp_sign = if exp < 0 { '-' } else { '+' };
        format!(
            "{sign}{head}.{}e{exp_sign}{:02}",
            fraction(tail),
            exp.unsigned_abs()
        )
    } else if exp >= 0 {
        let (int, frac) = digits.split_at(exp as usize + 1);
        format!("{sign}{int}.{}", fraction(frac))
    } else {
        let zeros = "0".repeat((-exp - 1) as usize);
        format!("{sign}0.{}", fraction(&format!("{zeros}{digits}")))
    }
}

fn fraction(digits: &str) -> &str {
    match digits.trim_end_matches('0') {
        "" => "0",
        trimmed => trimmed,
    }
}
