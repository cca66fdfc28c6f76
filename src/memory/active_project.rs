//! Active-project pointer: a one-row table in `metadata.db` (spec.md §6)
//! recording which project `auto_switch_project`-aware callers currently
//! default to.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::domain::error::{Error, Result};

pub struct ActiveProjectStore {
    conn: Arc<Mutex<Connection>>,
}

impl ActiveProjectStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS active_project (
                id INTEGER PRIMARY KEY CHECK (id = 0),
                project_name TEXT
            );",
        )?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// The currently active project, if any has been set.
    pub async fn get(&self) -> Result<Option<String>> {
        let conn = self.conn.clone();
        blocking(move || {
            let name: Option<String> = conn
                .lock()
                .query_row("SELECT project_name FROM active_project WHERE id = 0", [], |row| row.get(0))
                .ok()
                .flatten();
            Ok(name)
        })
        .await
    }

    /// Sets (or clears, with `None`) the active project.
    pub async fn set(&self, project_name: Option<String>) -> Result<()> {
        let conn = self.conn.clone();
        blocking(move || {
            conn.lock().execute(
                "INSERT INTO active_project (id, project_name) VALUES (0, ?1)
                 ON CONFLICT(id) DO UPDATE SET project_name = excluded.project_name",
                params![project_name],
            )?;
            Ok(())
        })
        .await
    }

    /// Clears the active project if it currently equals `project_name`
    /// (used when the active project is deleted or renamed away).
    pub async fn clear_if(&self, project_name: &str) -> Result<()> {
        if self.get().await?.as_deref() == Some(project_name) {
            self.set(None).await?;
        }
        Ok(())
    }
}

async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::generic(format!("active-project store worker task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn get_before_set_is_none() {
        let dir = tempdir().unwrap();
        let store = ActiveProjectStore::open(&dir.path().join("metadata.db")).unwrap();
        assert_eq!(store.get().await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let dir = tempdir().unwrap();
        let store = ActiveProjectStore::open(&dir.path().join("metadata.db")).unwrap();
        store.set(Some("demo".to_string())).await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some("demo".to_string()));
    }

    #[tokio::test]
    async fn clear_if_only_clears_matching_project() {
        let dir = tempdir().unwrap();
        let store = ActiveProjectStore::open(&dir.path().join("metadata.db")).unwrap();
        store.set(Some("demo".to_string())).await.unwrap();
        store.clear_if("other").await.unwrap();
        assert_eq!(store.get().await.unwrap(), Some("demo".to_string()));
        store.clear_if("demo").await.unwrap();
        assert_eq!(store.get().await.unwrap(), None);
    }
}
