//! Content-addressable store backing the response cache.
//!
//! One SQLite database per cache directory holds three independent
//! namespaces (requests, responses, response headers) keyed by request
//! fingerprint. WAL mode lets several adapter processes share a directory;
//! within a process a single connection is guarded by a mutex held only for
//! the duration of one statement.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::adapter::headers_to_map;
use crate::error::{AdapterError, Result};
use axum::http::HeaderMap;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DB_FILE: &str = "cache.db";
const KEY_PAGE_SIZE: i64 = 256;

/// The three independent key spaces of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Requests,
    Responses,
    Headers,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Requests, Namespace::Responses, Namespace::Headers];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Requests => "requests",
            Namespace::Responses => "responses",
            Namespace::Headers => "headers",
        }
    }
}

/// File-backed key/value store partitioned by [`Namespace`].
#[derive(Clone)]
pub struct CacheStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl CacheStore {
    /// Open (creating if needed) the store inside `dir`.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir).map_err(|e| {
            AdapterError::Storage(format!("Failed to create cache directory {}: {}", dir.display(), e))
        })?;

        let db_path = dir.join(DB_FILE);
        let conn = Connection::open(&db_path)
            .map_err(|e| AdapterError::Storage(format!("Failed to open cache database: {}", e)))?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| AdapterError::Storage(format!("Failed to set pragmas: {}", e)))?;
        conn.busy_timeout(Duration::from_secs(5))?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(db_path),
        };
        store.initialize_schema()?;
        debug!("Opened cache store at {}", dir.display());
        Ok(store)
    }

    /// An in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AdapterError::Storage(format!("Failed to create in-memory database: {}", e)))?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Path of the database file, if on disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn
            .lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS entries (
                    namespace TEXT NOT NULL,
                    key TEXT NOT NULL,
                    value BLOB NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now')),
                    PRIMARY KEY (namespace, key)
                ) WITHOUT ROWID;
                "#,
            )
            .map_err(|e| AdapterError::Storage(format!("Failed to initialize schema: {}", e)))
    }

    pub fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM entries WHERE namespace = ?1 AND key = ?2",
                params![namespace.as_str(), key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn put(&self, namespace: Namespace, key: &str, value: &[u8]) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO entries (namespace, key, value) VALUES (?1, ?2, ?3)",
            params![namespace.as_str(), key, value],
        )?;
        Ok(())
    }

    pub fn contains(&self, namespace: Namespace, key: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM entries WHERE namespace = ?1 AND key = ?2",
                params![namespace.as_str(), key],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn len(&self, namespace: Namespace) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE namespace = ?1",
            params![namespace.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn is_empty(&self, namespace: Namespace) -> Result<bool> {
        Ok(self.len(namespace)? == 0)
    }

    /// Lazily iterate the keys of `namespace` in key order.
    ///
    /// Every call starts a fresh scan. Keys are fetched a page at a time, so
    /// writers are not blocked for the length of the iteration.
    pub fn iter_keys(&self, namespace: Namespace) -> KeyIter {
        KeyIter {
            conn: self.conn.clone(),
            namespace,
            last_key: None,
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Store a header map as a plain sorted JSON object.
    pub fn put_headers(&self, key: &str, headers: &HeaderMap) -> Result<()> {
        self.put_header_map(key, &headers_to_map(headers))
    }

    pub fn put_header_map(&self, key: &str, headers: &BTreeMap<String, String>) -> Result<()> {
        let encoded = serde_json::to_vec(headers)?;
        self.put(Namespace::Headers, key, &encoded)
    }

    pub fn get_headers(&self, key: &str) -> Result<Option<BTreeMap<String, String>>> {
        match self.get(Namespace::Headers, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn fetch_page(
    conn: &Arc<Mutex<Connection>>,
    namespace: Namespace,
    after: Option<&str>,
) -> Result<Vec<String>> {
    let conn = conn.lock();
    let keys = match after {
        Some(after) => {
            let mut stmt = conn.prepare_cached(
                "SELECT key FROM entries WHERE namespace = ?1 AND key > ?2 ORDER BY key LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![namespace.as_str(), after, KEY_PAGE_SIZE], |row| {
                row.get::<_, String>(0)
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        }
        None => {
            let mut stmt = conn.prepare_cached(
                "SELECT key FROM entries WHERE namespace = ?1 ORDER BY key LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![namespace.as_str(), KEY_PAGE_SIZE], |row| {
                row.get::<_, String>(0)
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()?
        }
    };
    Ok(keys)
}

/// Keyset-paginated iterator returned by [`CacheStore::iter_keys`].
pub struct KeyIter {
    conn: Arc<Mutex<Connection>>,
    namespace: Namespace,
    last_key: Option<String>,
    buffer: VecDeque<String>,
    exhausted: bool,
}

impl Iterator for KeyIter {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match fetch_page(&self.conn, self.namespace, self.last_key.as_deref()) {
                Ok(page) => {
                    if (page.len() as i64) < KEY_PAGE_SIZE {
                        self.exhausted = true;
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        let key = self.buffer.pop_front()?;
        self.last_key = Some(key.clone());
        Some(Ok(key))
    }
}
