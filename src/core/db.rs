//! Durable key-value storage backing the chat history.
use std::collections::HashMap;
use std::path::Path;

use anyhow::{Error, Result};
use rusqlite::{Connection, OptionalExtension, params};

/// A string keyed store of string values that outlives the process.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, Error>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), Error>;
    fn remove(&mut self, key: &str) -> Result<(), Error>;
}

pub fn initialize_db(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (CURRENT_TIMESTAMP)
        );
        "#,
    )?;
    Ok(())
}

/// `KeyValueStore` backed by a single SQLite table.
pub struct SqliteKv {
    conn: Connection,
}

impl SqliteKv {
    /// Open (or create) the database at `path` and make sure the
    /// schema exists.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let conn = Connection::open(path)?;
        initialize_db(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()?;
        initialize_db(&conn)?;
        Ok(Self { conn })
    }
}

impl KeyValueStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.conn.execute(
            r#"
            INSERT INTO kv (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP
            "#,
            params![key, value],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Error> {
        self.conn.execute("DELETE FROM kv WHERE key = ?", [key])?;
        Ok(())
    }
}

/// Process local `KeyValueStore`. Nothing survives a restart.
#[derive(Clone, Debug, Default)]
pub struct MemoryKv {
    entries: HashMap<String, String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), Error> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), Error> {
        self.entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(kv: &mut impl KeyValueStore) {
        assert_eq!(kv.get("missing").unwrap(), None);

        kv.set("greeting", "hello").unwrap();
        assert_eq!(kv.get("greeting").unwrap(), Some(String::from("hello")));

        kv.set("greeting", "goodbye").unwrap();
        assert_eq!(kv.get("greeting").unwrap(), Some(String::from("goodbye")));

        kv.remove("greeting").unwrap();
        assert_eq!(kv.get("greeting").unwrap(), None);

        // Removing a key that isn't there is fine
        kv.remove("greeting").unwrap();
    }

    #[test]
    fn test_memory_kv() {
        exercise(&mut MemoryKv::new());
    }

    #[test]
    fn test_sqlite_kv() {
        exercise(&mut SqliteKv::open_in_memory().unwrap());
    }

    #[test]
    fn test_sqlite_kv_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("parley.db");

        {
            let mut kv = SqliteKv::open(&path).unwrap();
            kv.set("conversations", "[]").unwrap();
        }

        let kv = SqliteKv::open(&path).unwrap();
        assert_eq!(kv.get("conversations").unwrap(), Some(String::from("[]")));
    }

    #[test]
    fn test_initialize_db_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        initialize_db(&conn).unwrap();
        initialize_db(&conn).unwrap();
    }
}
