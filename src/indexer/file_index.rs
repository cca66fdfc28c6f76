//! File-index table (`metadata.db`): the last-indexed hash per
//! `(project_name, absolute_path)`, used to decide whether a file needs
//! re-indexing (spec.md §4.7 steps 2-3).

use std::path::Path;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::sync::Arc;

use crate::domain::error::{Error, Result};

pub struct FileIndexStore {
    conn: Arc<Mutex<Connection>>,
}

impl FileIndexStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS file_index (
                project_name  TEXT NOT NULL,
                absolute_path TEXT NOT NULL,
                file_hash     TEXT NOT NULL,
                indexed_at    INTEGER NOT NULL,
                unit_count    INTEGER NOT NULL,
                PRIMARY KEY (project_name, absolute_path)
            );",
        )?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Returns the last-indexed hash for this file, if any.
    pub async fn last_hash(&self, project_name: &str, absolute_path: &str) -> Result<Option<String>> {
        let conn = self.conn.clone();
        let project_name = project_name.to_string();
        let absolute_path = absolute_path.to_string();
        blocking(move || {
            let hash: Option<String> = conn
                .lock()
                .query_row(
                    "SELECT file_hash FROM file_index WHERE project_name = ?1 AND absolute_path = ?2",
                    params![project_name, absolute_path],
                    |row| row.get(0),
                )
                .ok();
            Ok(hash)
        })
        .await
    }

    /// Records (or updates) the indexed state of a file.
    pub async fn record(
        &self,
        project_name: &str,
        absolute_path: &str,
        file_hash: &str,
        unit_count: usize,
    ) -> Result<()> {
        let conn = self.conn.clone();
        let project_name = project_name.to_string();
        let absolute_path = absolute_path.to_string();
        let file_hash = file_hash.to_string();
        let now = Utc::now().timestamp();
        blocking(move || {
            conn.lock().execute(
                "INSERT INTO file_index (project_name, absolute_path, file_hash, indexed_at, unit_count)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(project_name, absolute_path) DO UPDATE SET
                    file_hash = excluded.file_hash,
                    indexed_at = excluded.indexed_at,
                    unit_count = excluded.unit_count",
                params![project_name, absolute_path, file_hash, now, unit_count as i64],
            )?;
            Ok(())
        })
        .await
    }

    /// Removes a single file's row.
    pub async fn remove(&self, project_name: &str, absolute_path: &str) -> Result<()> {
        let conn = self.conn.clone();
        let project_name = project_name.to_string();
        let absolute_path = absolute_path.to_string();
        blocking(move || {
            conn.lock().execute(
                "DELETE FROM file_index WHERE project_name = ?1 AND absolute_path = ?2",
                params![project_name, absolute_path],
            )?;
            Ok(())
        })
        .await
    }

    /// Removes every row for a project (used by `reindex_project`).
    pub async fn clear_project(&self, project_name: &str) -> Result<()> {
        let conn = self.conn.clone();
        let project_name = project_name.to_string();
        blocking(move || {
            conn.lock()
                .execute("DELETE FROM file_index WHERE project_name = ?1", params![project_name])?;
            Ok(())
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
        .map_err(|e| Error::generic(format!("file-index worker task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn record_then_last_hash_round_trips() {
        let dir = tempdir().unwrap();
        let store = FileIndexStore::open(&dir.path().join("metadata.db")).unwrap();
        assert_eq!(store.last_hash("p", "/a.rs").await.unwrap(), None);
        store.record("p", "/a.rs", "abc123", 3).await.unwrap();
        assert_eq!(store.last_hash("p", "/a.rs").await.unwrap(), Some("abc123".to_string()));
    }

    #[tokio::test]
    async fn clear_project_removes_all_its_rows() {
        let dir = tempdir().unwrap();
        let store = FileIndexStore::open(&dir.path().join("metadata.db")).unwrap();
        store.record("p", "/a.rs", "h1", 1).await.unwrap();
        store.record("p", "/b.rs", "h2", 2).await.unwrap();
        store.clear_project("p").await.unwrap();
        assert_eq!(store.last_hash("p", "/a.rs").await.unwrap(), None);
        assert_eq!(store.last_hash("p", "/b.rs").await.unwrap(), None);
    }
}
