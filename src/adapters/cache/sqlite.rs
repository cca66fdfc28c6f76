//! Durable tier of the embedding cache: a single `rusqlite` connection
//! guarded by a blocking-pool dispatch so callers on the cooperative
//! scheduler never wait on disk I/O directly.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::domain::error::{Error, Result};

pub(super) struct SqliteCacheStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCacheStore {
    pub(super) fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cache_entries (
                namespace   TEXT NOT NULL,
                key         TEXT NOT NULL,
                value       BLOB NOT NULL,
                inserted_at INTEGER NOT NULL,
                expires_at  INTEGER NOT NULL,
                PRIMARY KEY (namespace, key)
            );
            CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(super) async fn get(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.conn.clone();
        let namespace = namespace.to_string();
        let key = key.to_string();
        blocking(move || {
            let conn = conn.lock();
            let now = Utc::now().timestamp();
            let value: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT value FROM cache_entries
                     WHERE namespace = ?1 AND key = ?2 AND expires_at > ?3",
                    params![namespace, key, now],
                    |row| row.get(0),
                )
                .ok();
            Ok(value)
        })
        .await
    }

    pub(super) async fn put(
        &self,
        namespace: &str,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<()> {
        let conn = self.conn.clone();
        let namespace = namespace.to_string();
        let key = key.to_string();
        let value = value.to_vec();
        let now = Utc::now().timestamp();
        let expires_at = now + ttl.as_secs() as i64;
        blocking(move || {
            conn.lock().execute(
                "INSERT INTO cache_entries (namespace, key, value, inserted_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(namespace, key) DO UPDATE SET
                    value = excluded.value,
                    inserted_at = excluded.inserted_at,
                    expires_at = excluded.expires_at",
                params![namespace, key, value, now, expires_at],
            )?;
            Ok(())
        })
        .await
    }

    pub(super) async fn invalidate(&self, namespace: &str, key: &str) -> Result<()> {
        let conn = self.conn.clone();
        let namespace = namespace.to_string();
        let key = key.to_string();
        blocking(move || {
            conn.lock().execute(
                "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )?;
            Ok(())
        })
        .await
    }

    pub(super) async fn clear_namespace(&self, namespace: &str) -> Result<()> {
        let conn = self.conn.clone();
        let namespace = namespace.to_string();
        blocking(move || {
            conn.lock().execute(
                "DELETE FROM cache_entries WHERE namespace = ?1",
                params![namespace],
            )?;
            Ok(())
        })
        .await
    }

    pub(super) async fn count(&self, namespace: &str) -> Result<u64> {
        let conn = self.conn.clone();
        let namespace = namespace.to_string();
        blocking(move || {
            let now = Utc::now().timestamp();
            let count: i64 = conn.lock().query_row(
                "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1 AND expires_at > ?2",
                params![namespace, now],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    /// Removes every entry whose `expires_at` has passed, regardless of
    /// namespace. Returns the number of rows removed.
    #[allow(dead_code)]
    pub(super) async fn vacuum(&self) -> Result<u64> {
        let conn = self.conn.clone();
        blocking(move || {
            let now = Utc::now().timestamp();
            let removed = conn
                .lock()
                .execute("DELETE FROM cache_entries WHERE expires_at <= ?1", params![now])?;
            Ok(removed as u64)
        })
        .await
    }
}

async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::generic(format!("cache worker task panicked: {e}")))?
}
