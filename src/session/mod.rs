#![forbid(unsafe_code)]

//! Window sessions: first/next/prev/by-key scrolling over a backend view.

mod buffer;
mod cursor;
mod window;

/// Row-buffer sink contract and the owned buffer implementing it.
pub use buffer::{RowBuffer, RowSink};

/// Cursor bookkeeping exposed for inspection.
pub use cursor::Cursor;

/// The session itself and its fetch results.
pub use window::{SessionOptions, SessionState, Window, WindowSession};
