//! Persistent text storage for the editor state core.
//!
//! The document type is an immutable, structurally shared rope of lines
//! ([`Text`]) addressed by UTF-16 code-unit offsets. On top of it sit the
//! chunk and line cursors, grapheme-cluster walking, word classification,
//! and tab-aware column arithmetic. Everything here is pure: edits return
//! new documents sharing untouched subtrees with their source.

use thiserror::Error;

mod cluster;
mod column;
mod cursor;
mod text;
pub mod utf16;

pub use cluster::{CharCategorizer, CharCategory, GroupMatcher, cluster_at, find_cluster_break};
pub use column::{count_column, find_column};
pub use cursor::{Chunk, Direction, LinesCursor, RangeCursor, RawCursor};
pub use text::{Line, Text};

/// Failures raised by document access and construction.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TextError {
    #[error("{what} {value} is out of range (max {max})")]
    OutOfRange {
        what: &'static str,
        value: usize,
        max: usize,
    },
    #[error("cannot build a document from an empty line list")]
    EmptyInput,
    #[error("malformed document JSON: {0}")]
    InvalidJson(String),
}
