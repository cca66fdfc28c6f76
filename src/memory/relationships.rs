//! Relationship adjacency table: a small `rusqlite` store enforcing
//! "reflexive forbidden, at most one relationship of each kind per
//! ordered pair" (spec.md §3) at the storage layer via its primary key.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::domain::error::{Error, Result};
use crate::domain::types::{DetectedBy, Relationship, RelationshipKind};

fn kind_str(kind: RelationshipKind) -> &'static str {
    match kind {
        RelationshipKind::Supports => "supports",
        RelationshipKind::Contradicts => "contradicts",
        RelationshipKind::Related => "related",
        RelationshipKind::Supersedes => "supersedes",
    }
}

fn parse_kind(s: &str) -> Result<RelationshipKind> {
    Ok(match s {
        "supports" => RelationshipKind::Supports,
        "contradicts" => RelationshipKind::Contradicts,
        "related" => RelationshipKind::Related,
        "supersedes" => RelationshipKind::Supersedes,
        other => return Err(Error::invalid_argument(format!("unknown relationship kind '{other}'"))),
    })
}

fn detected_by_str(d: DetectedBy) -> &'static str {
    crate::domain::payload::detected_by_str(d)
}

/// Durable store for the relationship graph, keyed by `(source_id,
/// target_id, kind)`.
pub struct RelationshipStore {
    conn: Arc<Mutex<Connection>>,
}

impl RelationshipStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS relationships (
                source_id   TEXT NOT NULL,
                target_id   TEXT NOT NULL,
                kind        TEXT NOT NULL,
                confidence  REAL NOT NULL,
                detected_at INTEGER NOT NULL,
                detected_by TEXT NOT NULL,
                PRIMARY KEY (source_id, target_id, kind)
            );",
        )?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Adds (or replaces, if the same `(source, target, kind)` triple
    /// already exists) a relationship.
    pub async fn add(&self, relationship: Relationship) -> Result<()> {
        let conn = self.conn.clone();
        blocking(move || {
            conn.lock().execute(
                "INSERT INTO relationships (source_id, target_id, kind, confidence, detected_at, detected_by)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(source_id, target_id, kind) DO UPDATE SET
                    confidence = excluded.confidence,
                    detected_at = excluded.detected_at,
                    detected_by = excluded.detected_by",
                params![
                    relationship.source_id.to_string(),
                    relationship.target_id.to_string(),
                    kind_str(relationship.kind),
                    relationship.confidence,
                    relationship.detected_at.timestamp(),
                    detected_by_str(relationship.detected_by),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Every relationship where `memory_id` is either endpoint.
    pub async fn list_for(&self, memory_id: Uuid) -> Result<Vec<Relationship>> {
        let conn = self.conn.clone();
        let id = memory_id.to_string();
        blocking(move || {
            let conn = conn.lock();
            let mut stmt = conn.prepare(
                "SELECT source_id, target_id, kind, confidence, detected_at, detected_by
                 FROM relationships WHERE source_id = ?1 OR target_id = ?1",
            )?;
            let rows = stmt.query_map(params![id], row_to_relationship)?;
            rows.collect::<std::result::Result<Vec<_>, _>>().map_err(Error::from)
        })
        .await
    }

    /// Repoints every relationship touching `from` to `to` instead,
    /// dropping any row that would become reflexive or collide with an
    /// existing `(to, other, kind)` row (used by `merge`).
    pub async fn repoint(&self, from: Uuid, to: Uuid) -> Result<()> {
        let conn = self.conn.clone();
        blocking(move || {
            let conn = conn.lock();
            let mut stmt = conn.prepare(
                "SELECT source_id, target_id, kind, confidence, detected_at, detected_by
                 FROM relationships WHERE source_id = ?1 OR target_id = ?1",
            )?;
            let from_str = from.to_string();
            let rows: Vec<Relationship> = stmt
                .query_map(params![from_str], row_to_relationship)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            drop(stmt);

            conn.execute("DELETE FROM relationships WHERE source_id = ?1 OR target_id = ?1", params![from_str])?;

            for r in rows {
                let source_id = if r.source_id == from { to } else { r.source_id };
                let target_id = if r.target_id == from { to } else { r.target_id };
                if source_id == target_id {
                    continue;
                }
                conn.execute(
                    "INSERT OR IGNORE INTO relationships (source_id, target_id, kind, confidence, detected_at, detected_by)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        source_id.to_string(),
                        target_id.to_string(),
                        kind_str(r.kind),
                        r.confidence,
                        r.detected_at.timestamp(),
                        detected_by_str(r.detected_by),
                    ],
                )?;
            }
            Ok(())
        })
        .await
    }

    /// Removes every relationship touching `memory_id` (used when a
    /// memory is deleted outright, as opposed to merged).
    pub async fn delete_for_memory(&self, memory_id: Uuid) -> Result<()> {
        let conn = self.conn.clone();
        let id = memory_id.to_string();
        blocking(move || {
            conn.lock()
                .execute("DELETE FROM relationships WHERE source_id = ?1 OR target_id = ?1", params![id])?;
            Ok(())
        })
        .await
    }
}

fn row_to_relationship(row: &rusqlite::Row<'_>) -> rusqlite::Result<Relationship> {
    let source_id: String = row.get(0)?;
    let target_id: String = row.get(1)?;
    let kind: String = row.get(2)?;
    let confidence: f32 = row.get(3)?;
    let detected_at: i64 = row.get(4)?;
    let detected_by: String = row.get(5)?;
    Ok(Relationship {
        source_id: Uuid::parse_str(&source_id).unwrap_or_default(),
        target_id: Uuid::parse_str(&target_id).unwrap_or_default(),
        kind: parse_kind(&kind).unwrap_or(RelationshipKind::Related),
        confidence,
        detected_at: timestamp_to_utc(detected_at),
        detected_by: parse_detected_by_or_auto(&detected_by),
    })
}

fn parse_detected_by_or_auto(s: &str) -> DetectedBy {
    crate::domain::payload::parse_detected_by(s).unwrap_or(DetectedBy::Auto)
}

fn timestamp_to_utc(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

async fn blocking<F, T>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::generic(format!("relationship store worker task panicked: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn add_then_list_for_returns_both_endpoints() {
        let dir = tempdir().unwrap();
        let store = RelationshipStore::open(&dir.path().join("rel.db")).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let rel = Relationship::new(a, b, RelationshipKind::Supports, 0.9, DetectedBy::User).unwrap();
        store.add(rel).await.unwrap();

        assert_eq!(store.list_for(a).await.unwrap().len(), 1);
        assert_eq!(store.list_for(b).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn adding_same_pair_and_kind_twice_replaces_not_duplicates() {
        let dir = tempdir().unwrap();
        let store = RelationshipStore::open(&dir.path().join("rel.db")).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        store.add(Relationship::new(a, b, RelationshipKind::Related, 0.5, DetectedBy::Auto).unwrap()).await.unwrap();
        store.add(Relationship::new(a, b, RelationshipKind::Related, 0.9, DetectedBy::User).unwrap()).await.unwrap();

        let rels = store.list_for(a).await.unwrap();
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].confidence, 0.9);
    }

    #[tokio::test]
    async fn repoint_moves_relationships_and_drops_reflexive_results() {
        let dir = tempdir().unwrap();
        let store = RelationshipStore::open(&dir.path().join("rel.db")).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let keep = Uuid::new_v4();
        store.add(Relationship::new(a, b, RelationshipKind::Related, 0.5, DetectedBy::Auto).unwrap()).await.unwrap();
        store.add(Relationship::new(a, keep, RelationshipKind::Supports, 0.5, DetectedBy::Auto).unwrap()).await.unwrap();

        store.repoint(a, keep).await.unwrap();

        let rels = store.list_for(keep).await.unwrap();
        // a->b becomes keep->b; a->keep becomes reflexive (keep->keep) and is dropped.
        assert_eq!(rels.len(), 1);
        assert_eq!(rels[0].target_id, b);
    }
}
