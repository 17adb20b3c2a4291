//! SQLite and no-op implementations of the cache store.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::traits::CacheStore;
use crate::config::Config;
use crate::http::{RequestIdentity, ResponseSnapshot};

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

#[async_trait]
impl CacheStore for NoopStore {
  async fn open(&self, _namespace: &str) -> Result<()> {
    Ok(())
  }

  async fn match_any(&self, _identity: &RequestIdentity) -> Result<Option<ResponseSnapshot>> {
    Ok(None) // Always miss
  }

  async fn match_in(
    &self,
    _namespace: &str,
    _identity: &RequestIdentity,
  ) -> Result<Option<ResponseSnapshot>> {
    Ok(None) // Always miss
  }

  async fn put(
    &self,
    _namespace: &str,
    _identity: &RequestIdentity,
    _response: &ResponseSnapshot,
  ) -> Result<()> {
    Ok(()) // Discard
  }

  async fn list_namespaces(&self) -> Result<Vec<String>> {
    Ok(Vec::new())
  }

  async fn delete(&self, _namespace: &str) -> Result<bool> {
    Ok(false)
  }

  async fn entry_count(&self, _namespace: &str) -> Result<usize> {
    Ok(0)
  }
}

/// SQLite-based cache storage implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open the store at the default location in the data directory.
  pub fn open_default() -> Result<Self> {
    Self::open_at(&Self::default_path()?)
  }

  /// Open or create a store at the given path.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;

    Ok(store)
  }

  fn default_path() -> Result<PathBuf> {
    Ok(Config::data_dir()?.join("cache.db"))
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- Namespaces in creation order (id doubles as the lookup order)
CREATE TABLE IF NOT EXISTS namespaces (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One response snapshot per request identity per namespace
CREATE TABLE IF NOT EXISTS entries (
    namespace_id INTEGER NOT NULL,
    request_hash TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    status_text TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (namespace_id, request_hash),
    FOREIGN KEY (namespace_id) REFERENCES namespaces(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_entries_hash ON entries(request_hash);
"#;

/// Get the id of a namespace, creating it if needed.
fn ensure_namespace(conn: &Connection, namespace: &str) -> Result<i64> {
  conn
    .execute(
      "INSERT OR IGNORE INTO namespaces (name) VALUES (?)",
      params![namespace],
    )
    .map_err(|e| eyre!("Failed to create namespace {}: {}", namespace, e))?;

  conn
    .query_row(
      "SELECT id FROM namespaces WHERE name = ?",
      params![namespace],
      |row| row.get(0),
    )
    .map_err(|e| eyre!("Failed to look up namespace {}: {}", namespace, e))
}

fn insert_entry(
  conn: &Connection,
  namespace_id: i64,
  identity: &RequestIdentity,
  response: &ResponseSnapshot,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO entries
         (namespace_id, request_hash, method, url, status, status_text, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        namespace_id,
        identity.cache_hash(),
        identity.method(),
        identity.url(),
        response.status,
        response.status_text,
        headers,
        response.body,
      ],
    )
    .map_err(|e| eyre!("Failed to store entry {}: {}", identity, e))?;

  Ok(())
}

/// Raw columns of a stored entry; headers are decoded outside the row closure.
fn read_entry(row: &Row<'_>) -> rusqlite::Result<(u16, String, String, Vec<u8>)> {
  Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_snapshot(raw: (u16, String, String, Vec<u8>)) -> Result<ResponseSnapshot> {
  let (status, status_text, headers, body) = raw;
  let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
    .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

  Ok(ResponseSnapshot {
    status,
    status_text,
    headers,
    body,
  })
}

#[async_trait]
impl CacheStore for SqliteStore {
  async fn open(&self, namespace: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_namespace(&conn, namespace)?;
    Ok(())
  }

  async fn match_any(&self, identity: &RequestIdentity) -> Result<Option<ResponseSnapshot>> {
    let conn = self.lock()?;

    let raw = conn
      .query_row(
        "SELECT e.status, e.status_text, e.headers, e.body FROM entries e
         INNER JOIN namespaces n ON n.id = e.namespace_id
         WHERE e.request_hash = ?
         ORDER BY n.id
         LIMIT 1",
        params![identity.cache_hash()],
        read_entry,
      )
      .optional()
      .map_err(|e| eyre!("Failed to match {}: {}", identity, e))?;

    raw.map(into_snapshot).transpose()
  }

  async fn match_in(
    &self,
    namespace: &str,
    identity: &RequestIdentity,
  ) -> Result<Option<ResponseSnapshot>> {
    let conn = self.lock()?;

    let raw = conn
      .query_row(
        "SELECT e.status, e.status_text, e.headers, e.body FROM entries e
         INNER JOIN namespaces n ON n.id = e.namespace_id
         WHERE n.name = ? AND e.request_hash = ?",
        params![namespace, identity.cache_hash()],
        read_entry,
      )
      .optional()
      .map_err(|e| eyre!("Failed to match {} in {}: {}", identity, namespace, e))?;

    raw.map(into_snapshot).transpose()
  }

  async fn put(
    &self,
    namespace: &str,
    identity: &RequestIdentity,
    response: &ResponseSnapshot,
  ) -> Result<()> {
    let conn = self.lock()?;
    let namespace_id = ensure_namespace(&conn, namespace)?;
    insert_entry(&conn, namespace_id, identity, response)
  }

  async fn put_all(
    &self,
    namespace: &str,
    entries: &[(RequestIdentity, ResponseSnapshot)],
  ) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    let namespace_id = ensure_namespace(&tx, namespace)?;
    for (identity, response) in entries {
      insert_entry(&tx, namespace_id, identity, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  async fn list_namespaces(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;

    let mut stmt = conn
      .prepare("SELECT name FROM namespaces ORDER BY id")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list namespaces: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to read namespace: {}", e))?;

    Ok(names)
  }

  async fn delete(&self, namespace: &str) -> Result<bool> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "DELETE FROM entries WHERE namespace_id IN (SELECT id FROM namespaces WHERE name = ?)",
      params![namespace],
    )
    .map_err(|e| eyre!("Failed to delete entries of {}: {}", namespace, e))?;

    let removed = tx
      .execute("DELETE FROM namespaces WHERE name = ?", params![namespace])
      .map_err(|e| eyre!("Failed to delete namespace {}: {}", namespace, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(removed > 0)
  }

  async fn entry_count(&self, namespace: &str) -> Result<usize> {
    let conn = self.lock()?;

    let count: i64 = conn
      .query_row(
        "SELECT COUNT(*) FROM entries e
         INNER JOIN namespaces n ON n.id = e.namespace_id
         WHERE n.name = ?",
        params![namespace],
        |row| row.get(0),
      )
      .map_err(|e| eyre!("Failed to count entries of {}: {}", namespace, e))?;

    Ok(count as usize)
  }
}
