//! Namespaced key-value storage for persisted state.
//!
//! Each namespace holds one serialized document. The preferences layer
//! reads its whole mapping at startup and writes it back after every
//! mutation.

use anyhow::{Context, Result};
use log::trace;
use rusqlite::{Connection, OptionalExtension};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;

/// Durable key-value store keyed by namespace.
pub trait KeyValueStore {
    /// Read the document stored under `namespace`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read.
    fn load(&self, namespace: &str) -> Result<Option<String>>;

    /// Replace the document stored under `namespace`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written.
    fn save(&self, namespace: &str, value: &str) -> Result<()>;
}

/// `SQLite`-backed store: one row per namespace.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and make sure the schema exists.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open preferences database at {}", path.display()))?;
        Self::with_connection(conn)
    }

    /// In-memory database. Nothing survives the process.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv_store (
                namespace  TEXT PRIMARY KEY,
                value      TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            )",
            [],
        )
        .context("Failed to create kv_store table")?;

        Ok(Self { conn })
    }
}

impl KeyValueStore for SqliteStore {
    fn load(&self, namespace: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM kv_store WHERE namespace = ?1",
                [namespace],
                |row| row.get(0),
            )
            .optional()
            .with_context(|| format!("Failed to read namespace `{namespace}'"))
    }

    fn save(&self, namespace: &str, value: &str) -> Result<()> {
        trace!("Writing {} bytes to namespace `{namespace}'", value.len());
        self.conn
            .execute(
                "INSERT INTO kv_store (namespace, value, updated_at)
                 VALUES (?1, ?2, strftime('%s', 'now'))
                 ON CONFLICT(namespace) DO UPDATE SET
                     value = excluded.value,
                     updated_at = excluded.updated_at",
                [namespace, value],
            )
            .with_context(|| format!("Failed to write namespace `{namespace}'"))?;
        Ok(())
    }
}

/// Process-local store, handy for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RefCell<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn load(&self, namespace: &str) -> Result<Option<String>> {
        Ok(self.entries.borrow().get(namespace).cloned())
    }

    fn save(&self, namespace: &str, value: &str) -> Result<()> {
        self.entries
            .borrow_mut()
            .insert(namespace.to_string(), value.to_string());
        Ok(())
    }
}
