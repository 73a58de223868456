use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error type for backend and session operations.
#[derive(Debug, Error)]
pub enum SeekError {
    /// The store could not be created, opened or tuned.
    #[error("failed to open store {target}: {source}")]
    Open {
        /// Path or description of the store being opened.
        target: String,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },
    /// A table, key or view definition step failed.
    #[error("{op} failed on table {table}: {source}")]
    Ddl {
        /// Operation label.
        op: &'static str,
        /// Table the definition applied to.
        table: String,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },
    /// A windowed read or column introspection failed.
    #[error("{op} failed on view {view}: {source}")]
    Query {
        /// Operation label.
        op: &'static str,
        /// View the read ran against.
        view: String,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },
    /// A read was issued before any view was installed.
    #[error("{op}: no view is defined")]
    NoView {
        /// Operation label.
        op: &'static str,
    },
    /// The current view does not expose the stable key column.
    #[error("view {view} has no key column {key}")]
    MissingKey {
        /// View name.
        view: String,
        /// Expected key column.
        key: String,
    },
    /// A delivered row carried a NULL stable key.
    #[error("view {view} delivered a row without a {key} value")]
    NullKey {
        /// View name.
        view: String,
        /// Key column.
        key: String,
    },
    /// A delivered row carried a key that is not stored as an integer.
    #[error("view {view} key column {key} holds a {found} value; keys must be integers")]
    KeyType {
        /// View name.
        view: String,
        /// Key column.
        key: String,
        /// Storage class found in the key column.
        found: String,
    },
    /// Scratch file creation/deletion or connection release failed.
    #[error("{op} failed for {}: {source}", path.display())]
    Io {
        /// Operation label.
        op: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Copying the live store to a permanent file failed.
    #[error("save as {} failed: {source}", dest.display())]
    SaveAs {
        /// Destination path.
        dest: PathBuf,
        /// Underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },
    /// Closing the connection failed.
    #[error("closing store failed: {0}")]
    Close(#[source] rusqlite::Error),
    /// The handle or session is not in a state that allows the call.
    #[error("not ready: {0}")]
    NotReady(&'static str),
    /// A caller supplied argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Coarse classification of [`SeekError`] values.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Cannot create/open/tune the backend.
    Open,
    /// Table/key/view definition failed.
    Ddl,
    /// A windowed read or column introspection failed.
    Query,
    /// Scratch-file handling, save-as, or close failed.
    Io,
    /// Call made in the wrong lifecycle state or with a bad argument.
    State,
}

/// Result type alias for backend and session operations.
pub type Result<T> = std::result::Result<T, SeekError>;

impl SeekError {
    /// Returns the taxonomy bucket for this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SeekError::Open { .. } => ErrorKind::Open,
            SeekError::Ddl { .. } => ErrorKind::Ddl,
            SeekError::Query { .. }
            | SeekError::NoView { .. }
            | SeekError::MissingKey { .. }
            | SeekError::NullKey { .. }
            | SeekError::KeyType { .. } => ErrorKind::Query,
            SeekError::Io { .. } | SeekError::SaveAs { .. } | SeekError::Close(_) => {
                ErrorKind::Io
            }
            SeekError::NotReady(_) | SeekError::InvalidArgument(_) => ErrorKind::State,
        }
    }

    pub(crate) fn open(target: impl AsRef<Path>, source: rusqlite::Error) -> Self {
        SeekError::Open {
            target: target.as_ref().display().to_string(),
            source,
        }
    }

    pub(crate) fn ddl(op: &'static str, table: &str, source: rusqlite::Error) -> Self {
        SeekError::Ddl {
            op,
            table: table.to_string(),
            source,
        }
    }

    pub(crate) fn query(op: &'static str, view: &str, source: rusqlite::Error) -> Self {
        SeekError::Query {
            op,
            view: view.to_string(),
            source,
        }
    }

    pub(crate) fn io(op: &'static str, path: impl AsRef<Path>, source: std::io::Error) -> Self {
        SeekError::Io {
            op,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}
