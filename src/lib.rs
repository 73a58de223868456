//! Windowed seek pagination over SQLite-backed tables.
//!
//! [`backend::Backend`] keeps one filtered/sorted view over a table with a
//! stable integer key and serves bounded keyset reads against it;
//! [`session::WindowSession`] turns those reads into first/next/prev/by-key
//! scrolling for a redraw loop that keeps no cursor state of its own.

#![warn(missing_docs)]

pub mod backend;
pub mod config;
pub mod session;

pub use backend::{Backend, BackendOptions, ErrorKind, MemoryMode, Result, SeekError};
pub use session::{RowBuffer, RowSink, Window, WindowSession};
