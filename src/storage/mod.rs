//! Storage module for SQLite record files
//!
//! This module handles:
//! - SQLite database initialization and schema management
//! - Storing processed items as JSON rows
//! - Replaying stored items in insertion order

mod schema;
mod sqlite;

pub use sqlite::SqliteSink;

use crate::SinkError;
use std::path::Path;

/// SQLite files start with this 16-byte header
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Returns whether `path` looks like a SQLite database
///
/// Used to tell SQLite record files apart from MessagePack ones when
/// replaying a file of unknown format.
pub fn is_sqlite_file(path: &Path) -> Result<bool, SinkError> {
    use std::io::Read;

    let mut header = [0u8; 16];
    let mut file = std::fs::File::open(path)?;
    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header == SQLITE_MAGIC),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}
