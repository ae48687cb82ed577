//! SQLite-based cache storage.

use super::traits::CacheStorage;
use crate::error::{OfflineError, Result};
use crate::http::{headers_to_pairs, pairs_to_headers, FetchResponse, RequestKey, ResponseType};
use bytes::Bytes;
use chrono::Utc;
use http::StatusCode;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;
use url::Url;

/// SQLite-based cache storage.
///
/// Every named store lives in the same database. Thread-safe via an internal
/// mutex on the connection, which also serializes individual operations.
pub struct SqliteCacheStorage {
    /// Database connection (wrapped for thread safety).
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStorage {
    /// Open the storage at the specified database path.
    ///
    /// Creates the database and tables if they don't exist.
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| OfflineError::Io {
                message: format!("Failed to create cache directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| OfflineError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        // Enable WAL mode for better concurrent access
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        Self::from_connection(conn)
    }

    /// Open a private, non-persistent storage.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| OfflineError::Database {
            message: format!("Failed to open in-memory cache database: {}", e),
            source: Some(e),
        })?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let storage = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        storage.init_schema()?;
        Ok(storage)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| OfflineError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            -- Named stores, ordered by creation
            CREATE TABLE IF NOT EXISTS cache_stores (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            -- Stored responses
            CREATE TABLE IF NOT EXISTS cache_entries (
                store TEXT NOT NULL,
                method TEXT NOT NULL,
                url TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                response_type TEXT NOT NULL,
                url_final TEXT,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (store, method, url)
            );
            "#,
        )
        .map_err(|e| OfflineError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }

    /// Create the store row if it is missing. Returns `true` when created.
    fn ensure_store(conn: &Connection, name: &str) -> Result<bool> {
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO cache_stores (name, created_at) VALUES (?1, ?2)",
                params![name, Utc::now().to_rfc3339()],
            )
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to open cache store {}: {}", name, e),
                source: Some(e),
            })?;
        Ok(inserted > 0)
    }

    fn insert_entry(
        conn: &Connection,
        name: &str,
        key: &RequestKey,
        response: &FetchResponse,
    ) -> Result<()> {
        if !key.is_cacheable() {
            return Err(OfflineError::Other(format!(
                "Cannot store {}: only GET requests are cacheable",
                key
            )));
        }

        let headers = serde_json::to_string(&headers_to_pairs(&response.headers))?;
        let url_final = response.url.as_ref().map(|u| u.as_str().to_string());

        conn.execute(
            r#"
            INSERT OR REPLACE INTO cache_entries
            (store, method, url, status, headers, body, response_type, url_final, cached_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                name,
                key.method.as_str(),
                key.url,
                response.status.as_u16() as i64,
                headers,
                response.body.as_ref(),
                response.response_type.as_str(),
                url_final,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| OfflineError::Database {
            message: format!("Failed to store {} in {}: {}", key, name, e),
            source: Some(e),
        })?;

        Ok(())
    }
}

impl CacheStorage for SqliteCacheStorage {
    fn open(&self, name: &str) -> Result<bool> {
        let conn = self.lock()?;
        let created = Self::ensure_store(&conn, name)?;
        if created {
            debug!("Created cache store '{}'", name);
        }
        Ok(created)
    }

    fn has(&self, name: &str) -> Result<bool> {
        let conn = self.lock()?;

        let exists = conn
            .query_row(
                "SELECT 1 FROM cache_stores WHERE name = ?1 LIMIT 1",
                params![name],
                |_| Ok(true),
            )
            .optional()
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to check cache store: {}", e),
                source: Some(e),
            })?
            .unwrap_or(false);

        Ok(exists)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare("SELECT name FROM cache_stores ORDER BY id")
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to prepare store listing: {}", e),
                source: Some(e),
            })?;

        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to list cache stores: {}", e),
                source: Some(e),
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(names)
    }

    fn delete(&self, name: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let entries = tx
            .execute("DELETE FROM cache_entries WHERE store = ?1", params![name])
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to delete entries of {}: {}", name, e),
                source: Some(e),
            })?;
        let stores = tx
            .execute("DELETE FROM cache_stores WHERE name = ?1", params![name])
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to delete cache store {}: {}", name, e),
                source: Some(e),
            })?;

        tx.commit()?;

        if stores > 0 {
            debug!("Deleted cache store '{}' ({} entries)", name, entries);
        }

        Ok(stores > 0)
    }

    fn match_request(&self, name: &str, key: &RequestKey) -> Result<Option<FetchResponse>> {
        if !key.is_cacheable() {
            return Ok(None);
        }

        let conn = self.lock()?;

        let row: Option<(i64, String, Vec<u8>, String, Option<String>)> = conn
            .query_row(
                r#"
                SELECT status, headers, body, response_type, url_final
                FROM cache_entries
                WHERE store = ?1 AND method = ?2 AND url = ?3
                "#,
                params![name, key.method.as_str(), key.url],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        let (status, headers, body, response_type, url_final) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let status = u16::try_from(status)
            .ok()
            .and_then(|s| StatusCode::from_u16(s).ok())
            .ok_or_else(|| OfflineError::Database {
                message: format!("Invalid stored status {} for {}", status, key),
                source: None,
            })?;
        let pairs: Vec<(String, String)> = serde_json::from_str(&headers)?;
        let response_type = ResponseType::parse(&response_type).unwrap_or(ResponseType::Basic);

        Ok(Some(FetchResponse {
            status,
            headers: pairs_to_headers(&pairs),
            body: Bytes::from(body),
            url: url_final.and_then(|u| Url::parse(&u).ok()),
            response_type,
        }))
    }

    fn put(&self, name: &str, key: &RequestKey, response: &FetchResponse) -> Result<()> {
        let conn = self.lock()?;
        Self::ensure_store(&conn, name)?;
        Self::insert_entry(&conn, name, key, response)
    }

    fn put_all(&self, name: &str, entries: &[(RequestKey, FetchResponse)]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        Self::ensure_store(&tx, name)?;
        for (key, response) in entries {
            Self::insert_entry(&tx, name, key, response)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn entry_count(&self, name: &str) -> Result<usize> {
        let conn = self.lock()?;

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM cache_entries WHERE store = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(|e| OfflineError::Database {
                message: format!("Failed to count cache entries: {}", e),
                source: Some(e),
            })?;

        Ok(count as usize)
    }
}
