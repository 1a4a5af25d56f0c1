//! SQLite record sink
//!
//! Stores each item as a JSON row. Row ids grow with insertion, so replaying
//! by id returns items in write order.

use crate::output::RecordSink;
use crate::state::lock;
use crate::storage::schema::initialize_schema;
use crate::{Item, SinkError};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite-backed record sink
#[derive(Debug, Clone)]
pub struct SqliteSink {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSink {
    /// Creates a fresh record database, replacing any existing file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteSink)` - Successfully created database
    /// * `Err(SinkError)` - Failed to remove the old file or open the new one
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        remove_database_files(path)?;
        Self::open(path)
    }

    /// Opens (or creates) a record database, keeping existing rows
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, SinkError> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Number of stored items
    pub fn count(&self) -> Result<u64, SinkError> {
        let conn = lock(&self.conn);
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    /// Returns every stored item in insertion order
    pub fn replay(&self) -> Result<Vec<Item>, SinkError> {
        let conn = lock(&self.conn);
        let mut stmt = conn.prepare("SELECT body FROM items ORDER BY id")?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        bodies
            .iter()
            .map(|body| serde_json::from_str::<Item>(body).map_err(SinkError::from))
            .collect()
    }

    fn insert(conn: &Connection, item: &Item) -> Result<(), SinkError> {
        let body = serde_json::to_string(item)?;
        conn.execute(
            "INSERT INTO items (recorded_at, body) VALUES (?1, ?2)",
            params![Utc::now().to_rfc3339(), body],
        )?;
        Ok(())
    }
}

#[async_trait]
impl RecordSink for SqliteSink {
    async fn save(&self, item: &Item) -> Result<(), SinkError> {
        let conn = Arc::clone(&self.conn);
        let item = item.clone();

        tokio::task::spawn_blocking(move || Self::insert(&lock(&conn), &item))
            .await
            .map_err(|e| SinkError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

/// Removes a database file along with its WAL and shared-memory files
///
/// A WAL left behind by a crashed run would otherwise be replayed into the
/// new database.
fn remove_database_files(path: &Path) -> Result<(), SinkError> {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = path.as_os_str().to_owned();
        file.push(suffix);
        let file = Path::new(&file);
        if file.exists() {
            std::fs::remove_file(file)?;
        }
    }
    Ok(())
}
