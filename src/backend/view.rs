//! View definition: filter and sort composition over one base table.

/// Filter used when the caller supplies none.
pub const MATCH_ALL: &str = "1=1";

/// A filtered and sorted projection of a base table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ViewSpec {
    /// Base table name (unquoted).
    pub table: String,
    /// Boolean SQL expression; empty means all rows.
    pub filter: String,
    /// `ORDER BY` list without the keyword; empty means key order.
    pub sort: String,
}

impl ViewSpec {
    /// Builds a spec with no filter and key ordering.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: String::new(),
            sort: String::new(),
        }
    }

    /// Sets the filter expression.
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Sets the sort list.
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = sort.into();
        self
    }

    pub(crate) fn where_clause(&self) -> &str {
        let filter = self.filter.trim();
        if filter.is_empty() {
            MATCH_ALL
        } else {
            filter
        }
    }

    /// `ORDER BY` list with the stable key appended when not already present.
    pub fn order_by(&self, key: &str) -> String {
        let sort = self.sort.trim();
        let quoted_key = quote_ident(key);
        if sort.is_empty() {
            quoted_key
        } else if references_key(sort, key) {
            sort.to_string()
        } else {
            format!("{sort}, {quoted_key}")
        }
    }

    pub(crate) fn create_sql(&self, view_name: &str, key: &str) -> String {
        format!(
            "CREATE TEMP VIEW {} AS SELECT * FROM {} WHERE {} ORDER BY {}",
            quote_ident(view_name),
            quote_ident(&self.table),
            self.where_clause(),
            self.order_by(key)
        )
    }
}

/// Wraps `name` in double quotes, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Returns true when some sort term's leading identifier is `key`.
pub(crate) fn references_key(sort: &str, key: &str) -> bool {
    split_terms(sort)
        .into_iter()
        .filter_map(leading_ident)
        .any(|ident| ident.eq_ignore_ascii_case(key))
}

fn split_terms(sort: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut quote: Option<char> = None;
    for (idx, ch) in sort.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '`' | '\'') => quote = Some(ch),
            (None, '[') => quote = Some(']'),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                terms.push(&sort[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    terms.push(&sort[start..]);
    terms
}

fn leading_ident(term: &str) -> Option<String> {
    let term = term.trim();
    let mut chars = term.chars();
    let first = chars.next()?;
    let close = match first {
        '"' => Some('"'),
        '`' => Some('`'),
        '[' => Some(']'),
        _ => None,
    };
    if let Some(close) = close {
        let rest = &term[first.len_utf8()..];
        let end = rest.find(close)?;
        let ident = rest[..end].to_string();
        // Anything but a direction/collation after the identifier makes it an expression.
        return is_plain_suffix(&rest[end + close.len_utf8()..]).then_some(ident);
    }
    let end = term
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(term.len());
    if end == 0 {
        return None;
    }
    is_plain_suffix(&term[end..]).then(|| term[..end].to_string())
}

fn is_plain_suffix(rest: &str) -> bool {
    let mut words = rest.split_whitespace();
    while let Some(word) = words.next() {
        let word = word.to_ascii_uppercase();
        match word.as_str() {
            "ASC" | "DESC" | "NULLS" | "FIRST" | "LAST" => {}
            "COLLATE" => {
                if words.next().is_none() {
                    return false;
                }
            }
            _ => return false,
        }
    }
    true
}
