//! Database schema for SQLite record files

/// SQL schema for the record database
pub const SCHEMA_SQL: &str = r#"
-- One row per stored item, in arrival order
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    recorded_at TEXT NOT NULL,
    body TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// Safe to call on a database that already has the schema.
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
