//! Conversion between [`Memory`] and the JSON payload stored on a vector
//! point (spec.md §6's reserved payload keys).
//!
//! The embedding itself is never part of the payload (§3: "not persisted in
//! export form") — it lives only in the point's vector component. A
//! [`Memory`] reconstructed from a payload therefore always has
//! `embedding: None`; callers that need the vector back fetch it from the
//! store separately (see [`crate::adapters::vector_store`]'s scroll-with-
//! vectors helpers).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::error::{Error, Result};
use crate::domain::types::{
    ContextLevel, DetectedBy, LifecycleState, Memory, MemoryCategory, MemoryScope, Provenance,
    ProvenanceSource,
};

/// Current payload schema version. Bumped whenever a reserved key's shape
/// changes in a way that requires migration; the adapter refuses to search
/// a collection whose stored version exceeds this (spec.md §4.3).
pub const SCHEMA_VERSION: u32 = 1;

fn provenance_to_json(p: &Provenance) -> Value {
    json!({
        "source": provenance_source_str(p.source),
        "confidence": p.confidence,
        "verified": p.verified,
        "file_context": p.file_context,
        "conversation_id": p.conversation_id,
    })
}

fn provenance_source_str(source: ProvenanceSource) -> &'static str {
    match source {
        ProvenanceSource::UserExplicit => "user_explicit",
        ProvenanceSource::Inferred => "inferred",
        ProvenanceSource::Documentation => "documentation",
        ProvenanceSource::AutoClassified => "auto_classified",
        ProvenanceSource::Imported => "imported",
    }
}

fn parse_provenance_source(s: &str) -> Result<ProvenanceSource> {
    Ok(match s {
        "user_explicit" => ProvenanceSource::UserExplicit,
        "inferred" => ProvenanceSource::Inferred,
        "documentation" => ProvenanceSource::Documentation,
        "auto_classified" => ProvenanceSource::AutoClassified,
        "imported" => ProvenanceSource::Imported,
        other => return Err(Error::invalid_argument(format!("unknown provenance source '{other}'"))),
    })
}

fn parse_provenance(value: &Value) -> Result<Provenance> {
    let source = parse_provenance_source(value["source"].as_str().unwrap_or("inferred"))?;
    Ok(Provenance {
        source,
        confidence: value["confidence"].as_f64().unwrap_or(0.5) as f32,
        verified: value["verified"].as_bool().unwrap_or(false),
        file_context: value["file_context"].as_str().map(str::to_string),
        conversation_id: value["conversation_id"].as_str().map(str::to_string),
    })
}

fn category_str(c: MemoryCategory) -> &'static str {
    c.as_str()
}

fn parse_category(s: &str) -> Result<MemoryCategory> {
    Ok(match s {
        "conversation" => MemoryCategory::Conversation,
        "code" => MemoryCategory::Code,
        "documentation" => MemoryCategory::Documentation,
        "preference" => MemoryCategory::Preference,
        "fact" => MemoryCategory::Fact,
        "event" => MemoryCategory::Event,
        "project-context" => MemoryCategory::ProjectContext,
        "session-state" => MemoryCategory::SessionState,
        other => return Err(Error::invalid_argument(format!("unknown category '{other}'"))),
    })
}

fn scope_str(s: MemoryScope) -> &'static str {
    match s {
        MemoryScope::Global => "global",
        MemoryScope::Project => "project",
    }
}

fn parse_scope(s: &str) -> Result<MemoryScope> {
    Ok(match s {
        "global" => MemoryScope::Global,
        "project" => MemoryScope::Project,
        other => return Err(Error::invalid_argument(format!("unknown scope '{other}'"))),
    })
}

fn context_level_str(c: ContextLevel) -> &'static str {
    match c {
        ContextLevel::Critical => "critical",
        ContextLevel::Core => "core",
        ContextLevel::Detail => "detail",
        ContextLevel::Archive => "archive",
    }
}

fn parse_context_level(s: &str) -> Result<ContextLevel> {
    Ok(match s {
        "critical" => ContextLevel::Critical,
        "core" => ContextLevel::Core,
        "detail" => ContextLevel::Detail,
        "archive" => ContextLevel::Archive,
        other => return Err(Error::invalid_argument(format!("unknown context_level '{other}'"))),
    })
}

fn lifecycle_str(s: LifecycleState) -> &'static str {
    match s {
        LifecycleState::Active => "active",
        LifecycleState::Recent => "recent",
        LifecycleState::Archived => "archived",
        LifecycleState::Stale => "stale",
    }
}

fn parse_lifecycle(s: &str) -> Result<LifecycleState> {
    Ok(match s {
        "active" => LifecycleState::Active,
        "recent" => LifecycleState::Recent,
        "archived" => LifecycleState::Archived,
        "stale" => LifecycleState::Stale,
        other => return Err(Error::invalid_argument(format!("unknown lifecycle_state '{other}'"))),
    })
}

fn parse_timestamp(value: &Value, field: &str) -> Result<DateTime<Utc>> {
    let s = value
        .as_str()
        .ok_or_else(|| Error::invalid_argument(format!("payload field '{field}' must be an RFC 3339 string")))?;
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::invalid_argument(format!("payload field '{field}' is not a valid offset-aware timestamp: {e}")))
}

/// Builds the JSON payload stored alongside a memory's vector, covering
/// every reserved key in spec.md §6 plus `content`, `scope`, and the open
/// `metadata` map.
pub fn memory_to_payload(memory: &Memory) -> Value {
    let mut obj = serde_json::Map::new();
    obj.insert("id".to_string(), json!(memory.id.to_string()));
    obj.insert("content".to_string(), json!(memory.content));
    obj.insert("category".to_string(), json!(category_str(memory.category)));
    obj.insert("project_name".to_string(), json!(memory.project_name));
    obj.insert("scope".to_string(), json!(scope_str(memory.scope)));
    obj.insert("context_level".to_string(), json!(context_level_str(memory.context_level)));
    obj.insert("importance".to_string(), json!(memory.importance));
    obj.insert("tags".to_string(), json!(memory.tags));
    obj.insert("created_at".to_string(), json!(memory.created_at.to_rfc3339()));
    obj.insert("updated_at".to_string(), json!(memory.updated_at.to_rfc3339()));
    obj.insert("last_accessed".to_string(), json!(memory.last_accessed.to_rfc3339()));
    obj.insert("lifecycle_state".to_string(), json!(lifecycle_str(memory.lifecycle_state)));
    obj.insert("access_count".to_string(), json!(memory.access_count));
    obj.insert("provenance".to_string(), provenance_to_json(&memory.provenance));
    obj.insert("schema_version".to_string(), json!(SCHEMA_VERSION));
    obj.insert("metadata".to_string(), json!(memory.metadata));
    // Code-category metadata (file_path, language, unit_type, start_line,
    // end_line, file_hash) lives in `memory.metadata` already and is
    // re-exposed flat for payload filters that key directly on these
    // fields (e.g. delete-before-reinsert's `(project_name, file_path)`
    // filter in the indexer).
    for key in ["file_path", "language", "unit_type", "start_line", "end_line", "file_hash"] {
        if let Some(v) = memory.metadata.get(key) {
            obj.insert(key.to_string(), v.clone());
        }
    }
    Value::Object(obj)
}

/// Reconstructs a [`Memory`] from a stored payload and its point id.
/// `embedding` is always `None` on the result; see the module docs.
pub fn memory_from_payload(id: Uuid, payload: &Value) -> Result<Memory> {
    let content = payload["content"]
        .as_str()
        .ok_or_else(|| Error::invalid_argument("payload missing 'content'"))?
        .to_string();
    let category = parse_category(payload["category"].as_str().unwrap_or(""))?;
    let project_name = payload["project_name"].as_str().map(str::to_string);
    let scope = parse_scope(payload["scope"].as_str().unwrap_or("global"))?;
    let context_level = parse_context_level(payload["context_level"].as_str().unwrap_or("core"))?;
    let importance = payload["importance"].as_f64().unwrap_or(0.0) as f32;
    let tags: Vec<String> = payload["tags"]
        .as_array()
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    let created_at = parse_timestamp(&payload["created_at"], "created_at")?;
    let updated_at = parse_timestamp(&payload["updated_at"], "updated_at")?;
    let last_accessed = parse_timestamp(&payload["last_accessed"], "last_accessed")?;
    let lifecycle_state = parse_lifecycle(payload["lifecycle_state"].as_str().unwrap_or("active"))?;
    let access_count = payload["access_count"].as_u64().unwrap_or(0);
    let provenance = parse_provenance(&payload["provenance"])?;
    let metadata: HashMap<String, Value> = payload["metadata"]
        .as_object()
        .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
        .unwrap_or_default();

    Ok(Memory {
        id,
        content,
        category,
        project_name,
        scope,
        context_level,
        importance,
        tags,
        embedding: None,
        created_at,
        updated_at,
        last_accessed,
        lifecycle_state,
        access_count,
        provenance,
        metadata,
    })
}

/// Detected-by enum string form, used by the relationship store (kept
/// alongside the memory payload codec since both serialize the same
/// domain enums to stable strings).
pub fn detected_by_str(d: DetectedBy) -> &'static str {
    match d {
        DetectedBy::Auto => "auto",
        DetectedBy::User => "user",
        DetectedBy::System => "system",
    }
}

/// Parses [`DetectedBy`] from its stable string form.
pub fn parse_detected_by(s: &str) -> Result<DetectedBy> {
    Ok(match s {
        "auto" => DetectedBy::Auto,
        "user" => DetectedBy::User,
        "system" => DetectedBy::System,
        other => return Err(Error::invalid_argument(format!("unknown detected_by '{other}'"))),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ProvenanceSource;
    use std::collections::HashMap;

    fn sample() -> Memory {
        let mut metadata = HashMap::new();
        metadata.insert("file_path".to_string(), json!("src/lib.rs"));
        metadata.insert("language".to_string(), json!("Rust"));
        metadata.insert("unit_type".to_string(), json!("function"));
        metadata.insert("start_line".to_string(), json!(1));
        metadata.insert("end_line".to_string(), json!(3));
        Memory::new(
            "fn main() {}".to_string(),
            MemoryCategory::Code,
            Some("demo".to_string()),
            MemoryScope::Project,
            ContextLevel::Core,
            0.7,
            vec!["rust".to_string()],
            Provenance::from_source(ProvenanceSource::AutoClassified),
            metadata,
        )
        .unwrap()
    }

    #[test]
    fn round_trips_through_payload() {
        let memory = sample();
        let payload = memory_to_payload(&memory);
        let restored = memory_from_payload(memory.id, &payload).unwrap();
        assert_eq!(restored.id, memory.id);
        assert_eq!(restored.content, memory.content);
        assert_eq!(restored.category, memory.category);
        assert_eq!(restored.project_name, memory.project_name);
        assert_eq!(restored.importance, memory.importance);
        assert_eq!(restored.tags, memory.tags);
        assert_eq!(restored.created_at, memory.created_at);
        assert!(restored.embedding.is_none());
    }

    #[test]
    fn flattens_code_metadata_for_filter_pushdown() {
        let payload = memory_to_payload(&sample());
        assert_eq!(payload["file_path"], json!("src/lib.rs"));
        assert_eq!(payload["language"], json!("Rust"));
    }

    #[test]
    fn rejects_offset_naive_timestamp_strings() {
        let mut payload = memory_to_payload(&sample());
        payload["created_at"] = json!("2024-01-01T00:00:00");
        let err = memory_from_payload(Uuid::new_v4(), &payload).unwrap_err();
        assert_eq!(err.kind_name(), "invalid_argument");
    }
}
