use crate::error::Result;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

const SCHEMA: &str = include_str!("../db/schema.sql");

pub fn open_or_create(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let conn = Connection::open(path)?;
    run_migrations(&conn)?;
    Ok(conn)
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Upsert the serialized session under `key`.
pub fn save_session(conn: &Connection, key: &str, state_json: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO sessions (key, state_json, updated_at) VALUES (?1, ?2, strftime('%s','now')) ON CONFLICT(key) DO UPDATE SET state_json = excluded.state_json, updated_at = strftime('%s','now')",
        params![key, state_json],
    )?;
    Ok(())
}

pub fn load_session(conn: &Connection, key: &str) -> Result<Option<String>> {
    let mut stmt = conn.prepare("SELECT state_json FROM sessions WHERE key = ?1 LIMIT 1")?;
    let row = stmt
        .query_row(params![key], |r| r.get::<_, String>(0))
        .optional()?;
    Ok(row)
}

/// Returns true if a row was removed.
pub fn delete_session(conn: &Connection, key: &str) -> Result<bool> {
    let removed = conn.execute("DELETE FROM sessions WHERE key = ?1", params![key])?;
    Ok(removed > 0)
}
