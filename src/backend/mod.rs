#![forbid(unsafe_code)]

//! Storage backend for windowed browsing.
//!
//! A [`Backend`] owns one SQLite connection, either to a user-supplied file or
//! to a private scratch store, keeps one filtered/sorted view over a base
//! table, and answers bounded keyset reads against that view.

mod error;
mod handle;
mod key;
mod options;
mod rows;
mod scratch;
mod view;

/// Error types for backend and session operations.
pub use error::{ErrorKind, Result, SeekError};

/// The backend handle and store detection.
pub use handle::{is_sqlite_file, Backend, StoreMode};

/// Stable key bookkeeping.
pub use key::{key_index_name, key_trigger_name, KeyStatus};

/// Tuning and naming options.
pub use options::{
    BackendOptions, MemoryMode, DEFAULT_KEY_NAME, DEFAULT_SCRATCH_ROOT, DEFAULT_VIEW_NAME,
};

/// Row-streaming contract used by the windowed reads.
pub use rows::{Flow, RowView, Seek};

/// Scratch-directory provider for ephemeral stores.
pub use scratch::{ScratchProvider, ScratchRoot, SPILL_FILE_NAME};

/// View definitions.
pub use view::{quote_ident, ViewSpec, MATCH_ALL};
