//! Domain data model: [`Memory`], [`SemanticUnit`], [`Relationship`] and the
//! small closed-set enums that make up a memory's identity and classification.
//!
//! These are plain value types; persistence and indexing live in the
//! adapters. The invariants documented on [`Memory`] are enforced by
//! [`Memory::new`] and [`Memory::validate`], not by the type system alone,
//! since several of them (e.g. `updated_at >= created_at`) span multiple
//! fields.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::{Error, Result};

/// Closed set of embedding models the engine knows the dimension of.
///
/// Collections are bound to a model's dimension at creation; the vector
/// store adapter refuses to search a collection whose stored dimension
/// disagrees with the model in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingModel {
    /// 384-dimensional, fastest of the three.
    AllMiniLmL6V2,
    /// 384-dimensional, deeper than L6.
    AllMiniLmL12V2,
    /// 768-dimensional, the default.
    AllMpnetBaseV2,
}

impl EmbeddingModel {
    /// Canonical model name as used in config and payload metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingModel::AllMiniLmL6V2 => "all-MiniLM-L6-v2",
            EmbeddingModel::AllMiniLmL12V2 => "all-MiniLM-L12-v2",
            EmbeddingModel::AllMpnetBaseV2 => "all-mpnet-base-v2",
        }
    }

    /// Vector dimension produced by this model.
    pub fn dimensions(&self) -> usize {
        match self {
            EmbeddingModel::AllMiniLmL6V2 => 384,
            EmbeddingModel::AllMiniLmL12V2 => 384,
            EmbeddingModel::AllMpnetBaseV2 => 768,
        }
    }

    /// Parses a model name, rejecting anything outside the closed set.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "all-MiniLM-L6-v2" => Ok(EmbeddingModel::AllMiniLmL6V2),
            "all-MiniLM-L12-v2" => Ok(EmbeddingModel::AllMiniLmL12V2),
            "all-mpnet-base-v2" => Ok(EmbeddingModel::AllMpnetBaseV2),
            other => Err(Error::invalid_argument(format!(
                "unknown embedding model '{other}', expected one of \
                 all-MiniLM-L6-v2, all-MiniLM-L12-v2, all-mpnet-base-v2"
            ))),
        }
    }
}

impl Default for EmbeddingModel {
    fn default() -> Self {
        EmbeddingModel::AllMpnetBaseV2
    }
}

impl std::fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Programming/markup language of a [`SemanticUnit`], in canonical
/// capitalized form (matches the payload metadata convention in §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
pub enum Language {
    Rust,
    Python,
    JavaScript,
    TypeScript,
    Go,
    Java,
    C,
    Cpp,
    CSharp,
    Php,
    Ruby,
    Swift,
    Kotlin,
    Scala,
    Haskell,
    Shell,
    Sql,
    Html,
    Xml,
    Json,
    Yaml,
    Toml,
    Markdown,
    PlainText,
    Unknown,
}

impl Language {
    /// Guesses a language from a file extension (without the leading dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "rs" => Language::Rust,
            "py" | "pyi" => Language::Python,
            "js" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" => Language::TypeScript,
            "go" => Language::Go,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cpp" | "cc" | "cxx" | "hpp" | "hh" => Language::Cpp,
            "cs" => Language::CSharp,
            "php" => Language::Php,
            "rb" => Language::Ruby,
            "swift" => Language::Swift,
            "kt" | "kts" => Language::Kotlin,
            "scala" => Language::Scala,
            "hs" => Language::Haskell,
            "sh" | "bash" | "zsh" | "fish" => Language::Shell,
            "sql" => Language::Sql,
            "html" | "htm" => Language::Html,
            "xml" => Language::Xml,
            "json" => Language::Json,
            "yaml" | "yml" => Language::Yaml,
            "toml" => Language::Toml,
            "md" | "markdown" => Language::Markdown,
            "txt" | "text" => Language::PlainText,
            _ => Language::Unknown,
        }
    }

    /// Canonical capitalized name, e.g. `"Python"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Rust => "Rust",
            Language::Python => "Python",
            Language::JavaScript => "JavaScript",
            Language::TypeScript => "TypeScript",
            Language::Go => "Go",
            Language::Java => "Java",
            Language::C => "C",
            Language::Cpp => "Cpp",
            Language::CSharp => "CSharp",
            Language::Php => "Php",
            Language::Ruby => "Ruby",
            Language::Swift => "Swift",
            Language::Kotlin => "Kotlin",
            Language::Scala => "Scala",
            Language::Haskell => "Haskell",
            Language::Shell => "Shell",
            Language::Sql => "SQL",
            Language::Html => "HTML",
            Language::Xml => "XML",
            Language::Json => "JSON",
            Language::Yaml => "YAML",
            Language::Toml => "TOML",
            Language::Markdown => "Markdown",
            Language::PlainText => "PlainText",
            Language::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Category of a [`Memory`]; `Code` is the only category with mandatory
/// code-shaped metadata (see [`Memory::validate`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemoryCategory {
    Conversation,
    Code,
    Documentation,
    Preference,
    Fact,
    Event,
    ProjectContext,
    SessionState,
}

impl MemoryCategory {
    /// Stable string form, as stored in payload metadata.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Conversation => "conversation",
            MemoryCategory::Code => "code",
            MemoryCategory::Documentation => "documentation",
            MemoryCategory::Preference => "preference",
            MemoryCategory::Fact => "fact",
            MemoryCategory::Event => "event",
            MemoryCategory::ProjectContext => "project-context",
            MemoryCategory::SessionState => "session-state",
        }
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a [`Memory`] belongs to one project or is visible globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryScope {
    Global,
    Project,
}

/// Coarse importance bucket, independent of the finer `importance` float.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextLevel {
    Archive,
    Detail,
    Core,
    Critical,
}

/// Derived lifecycle bucket, persisted for fast filtering without
/// recomputing from `last_accessed` on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Active,
    Recent,
    Archived,
    Stale,
}

/// Unit kind extracted by the parser (C6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    Function,
    Class,
    Module,
    Protocol,
    Struct,
    Method,
}

impl UnitType {
    /// Stable string form used in deterministic id derivation and payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::Function => "function",
            UnitType::Class => "class",
            UnitType::Module => "module",
            UnitType::Protocol => "protocol",
            UnitType::Struct => "struct",
            UnitType::Method => "method",
        }
    }
}

impl std::fmt::Display for UnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of relationship between two memories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationshipKind {
    Supports,
    Contradicts,
    Related,
    Supersedes,
}

/// Who or what detected a [`Relationship`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedBy {
    Auto,
    User,
    System,
}

/// How a [`Memory`] came to exist, carried on [`Provenance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvenanceSource {
    UserExplicit,
    Inferred,
    Documentation,
    AutoClassified,
    Imported,
}

impl ProvenanceSource {
    /// Default confidence assigned when a memory is created from this source.
    pub fn default_confidence(&self) -> f32 {
        match self {
            ProvenanceSource::UserExplicit => 0.8,
            ProvenanceSource::Imported => 0.5,
            ProvenanceSource::Inferred
            | ProvenanceSource::Documentation
            | ProvenanceSource::AutoClassified => 0.5,
        }
    }
}

/// Origin record embedded on every [`Memory`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source: ProvenanceSource,
    pub confidence: f32,
    pub verified: bool,
    pub file_context: Option<String>,
    pub conversation_id: Option<String>,
}

impl Provenance {
    /// Builds provenance with the source's default confidence and
    /// `verified = false`, per the creation-time defaults.
    pub fn from_source(source: ProvenanceSource) -> Self {
        Self {
            confidence: source.default_confidence(),
            source,
            verified: false,
            file_context: None,
            conversation_id: None,
        }
    }
}

/// The unit of storage: a piece of content with classification,
/// lifecycle, and provenance attached.
///
/// See the module-level invariants; construct with [`Memory::new`] rather
/// than populating fields directly so they are checked once, at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub content: String,
    pub category: MemoryCategory,
    pub project_name: Option<String>,
    pub scope: MemoryScope,
    pub context_level: ContextLevel,
    pub importance: f32,
    pub tags: Vec<String>,
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub lifecycle_state: LifecycleState,
    pub access_count: u64,
    pub provenance: Provenance,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Memory {
    /// Creates a new memory, validating invariants and stamping all three
    /// timestamps to the same instant.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        content: String,
        category: MemoryCategory,
        project_name: Option<String>,
        scope: MemoryScope,
        context_level: ContextLevel,
        importance: f32,
        tags: Vec<String>,
        provenance: Provenance,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Self> {
        let now = Utc::now();
        let memory = Self {
            id: Uuid::new_v4(),
            content,
            category,
            project_name,
            scope,
            context_level,
            importance,
            tags: tags.into_iter().map(|t| normalize_tag(&t)).collect(),
            embedding: None,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            lifecycle_state: LifecycleState::Active,
            access_count: 0,
            provenance,
            metadata,
        };
        memory.validate()?;
        Ok(memory)
    }

    /// Checks the invariants documented in the module header. Called by
    /// [`Memory::new`] and should be called again after any in-place patch.
    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(Error::invalid_argument("memory content must not be empty"));
        }
        if self.scope == MemoryScope::Project && self.project_name.is_none() {
            return Err(Error::invalid_argument(
                "scope == project requires project_name to be set",
            ));
        }
        if !(0.0..=1.0).contains(&self.importance) {
            return Err(Error::invalid_argument("importance must be within [0, 1]"));
        }
        if self.updated_at < self.created_at {
            return Err(Error::invalid_argument("updated_at must be >= created_at"));
        }
        if self.category == MemoryCategory::Code {
            for key in ["file_path", "language", "unit_type", "start_line", "end_line"] {
                if !self.metadata.contains_key(key) {
                    return Err(Error::invalid_argument(format!(
                        "category 'code' requires metadata key '{key}'"
                    )));
                }
            }
        }
        for tag in &self.tags {
            if tag.len() > 64 || !is_normalized_tag(tag) {
                return Err(Error::invalid_argument(format!("invalid tag '{tag}'")));
            }
        }
        Ok(())
    }

    /// Records a retrieval: bumps `access_count`, stamps `last_accessed`,
    /// and promotes `recent` back to `active` (see §4.9).
    pub fn record_access(&mut self) {
        self.access_count += 1;
        self.last_accessed = Utc::now();
        if self.lifecycle_state == LifecycleState::Recent {
            self.lifecycle_state = LifecycleState::Active;
        }
    }
}

fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

fn is_normalized_tag(tag: &str) -> bool {
    !tag.is_empty()
        && tag
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '/'))
}

/// Output of the parser (C6): a transient value object that becomes a
/// `category == code` [`Memory`] once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticUnit {
    pub unit_type: UnitType,
    pub name: String,
    pub signature: Option<String>,
    pub content: String,
    pub language: Language,
    pub start_line: u32,
    pub end_line: u32,
    pub start_byte: usize,
    pub end_byte: usize,
}

impl SemanticUnit {
    /// Derives the deterministic id of the Memory this unit becomes.
    ///
    /// Units have no identity of their own; the same `(project_name,
    /// file_path, unit_type, name, start_line)` tuple must always produce
    /// the same id so re-indexing an unchanged file is idempotent.
    pub fn derive_memory_id(
        project_name: Option<&str>,
        file_path: &str,
        unit_type: UnitType,
        name: &str,
        start_line: u32,
    ) -> Uuid {
        let key = format!(
            "{}\0{}\0{}\0{}\0{}",
            project_name.unwrap_or(""),
            file_path,
            unit_type.as_str(),
            name,
            start_line
        );
        Uuid::new_v5(&Uuid::NAMESPACE_OID, key.as_bytes())
    }
}

/// A directed, typed edge between two memories.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: Uuid,
    pub target_id: Uuid,
    pub kind: RelationshipKind,
    pub confidence: f32,
    pub detected_at: DateTime<Utc>,
    pub detected_by: DetectedBy,
}

impl Relationship {
    /// Builds a relationship, rejecting the reflexive case up front.
    /// The "at most one per kind per ordered pair" rule is an adjacency-table
    /// invariant enforced by the memory service, not representable here.
    pub fn new(
        source_id: Uuid,
        target_id: Uuid,
        kind: RelationshipKind,
        confidence: f32,
        detected_by: DetectedBy,
    ) -> Result<Self> {
        if source_id == target_id {
            return Err(Error::invalid_argument(
                "a memory cannot have a relationship with itself",
            ));
        }
        if !(0.0..=1.0).contains(&confidence) {
            return Err(Error::invalid_argument("confidence must be within [0, 1]"));
        }
        Ok(Self {
            source_id,
            target_id,
            kind,
            confidence,
            detected_at: Utc::now(),
            detected_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provenance() -> Provenance {
        Provenance::from_source(ProvenanceSource::UserExplicit)
    }

    #[test]
    fn global_memory_does_not_require_project_name() {
        let m = Memory::new(
            "hello".to_string(),
            MemoryCategory::Fact,
            None,
            MemoryScope::Global,
            ContextLevel::Core,
            0.5,
            vec![],
            provenance(),
            HashMap::new(),
        );
        assert!(m.is_ok());
    }

    #[test]
    fn project_scope_without_project_name_is_rejected() {
        let m = Memory::new(
            "hello".to_string(),
            MemoryCategory::Fact,
            None,
            MemoryScope::Project,
            ContextLevel::Core,
            0.5,
            vec![],
            provenance(),
            HashMap::new(),
        );
        assert!(m.is_err());
    }

    #[test]
    fn importance_out_of_range_is_rejected() {
        let m = Memory::new(
            "hello".to_string(),
            MemoryCategory::Fact,
            None,
            MemoryScope::Global,
            ContextLevel::Core,
            1.5,
            vec![],
            provenance(),
            HashMap::new(),
        );
        assert!(m.is_err());
    }

    #[test]
    fn empty_content_is_rejected() {
        let m = Memory::new(
            "   ".to_string(),
            MemoryCategory::Fact,
            None,
            MemoryScope::Global,
            ContextLevel::Core,
            0.5,
            vec![],
            provenance(),
            HashMap::new(),
        );
        assert!(m.is_err());
    }

    #[test]
    fn code_category_requires_code_metadata() {
        let m = Memory::new(
            "fn main() {}".to_string(),
            MemoryCategory::Code,
            Some("demo".to_string()),
            MemoryScope::Project,
            ContextLevel::Core,
            0.5,
            vec![],
            provenance(),
            HashMap::new(),
        );
        assert!(m.is_err());

        let mut metadata = HashMap::new();
        metadata.insert("file_path".to_string(), serde_json::json!("src/main.rs"));
        metadata.insert("language".to_string(), serde_json::json!("Rust"));
        metadata.insert("unit_type".to_string(), serde_json::json!("function"));
        metadata.insert("start_line".to_string(), serde_json::json!(1));
        metadata.insert("end_line".to_string(), serde_json::json!(3));
        let m = Memory::new(
            "fn main() {}".to_string(),
            MemoryCategory::Code,
            Some("demo".to_string()),
            MemoryScope::Project,
            ContextLevel::Core,
            0.5,
            vec![],
            provenance(),
            metadata,
        );
        assert!(m.is_ok());
    }

    #[test]
    fn tags_are_normalized_to_lowercase() {
        let m = Memory::new(
            "hello".to_string(),
            MemoryCategory::Fact,
            None,
            MemoryScope::Global,
            ContextLevel::Core,
            0.5,
            vec!["Rust-Lang".to_string()],
            provenance(),
            HashMap::new(),
        )
        .unwrap();
        assert_eq!(m.tags, vec!["rust-lang".to_string()]);
    }

    #[test]
    fn record_access_promotes_recent_to_active_and_bumps_count() {
        let mut m = Memory::new(
            "hello".to_string(),
            MemoryCategory::Fact,
            None,
            MemoryScope::Global,
            ContextLevel::Core,
            0.5,
            vec![],
            provenance(),
            HashMap::new(),
        )
        .unwrap();
        m.lifecycle_state = LifecycleState::Recent;
        m.record_access();
        assert_eq!(m.access_count, 1);
        assert_eq!(m.lifecycle_state, LifecycleState::Active);
    }

    #[test]
    fn semantic_unit_id_derivation_is_deterministic() {
        let a = SemanticUnit::derive_memory_id(Some("demo"), "src/lib.rs", UnitType::Function, "run", 10);
        let b = SemanticUnit::derive_memory_id(Some("demo"), "src/lib.rs", UnitType::Function, "run", 10);
        let c = SemanticUnit::derive_memory_id(Some("demo"), "src/lib.rs", UnitType::Function, "run", 11);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn relationship_rejects_reflexive_edges() {
        let id = Uuid::new_v4();
        let r = Relationship::new(id, id, RelationshipKind::Related, 0.9, DetectedBy::Auto);
        assert!(r.is_err());
    }

    #[test]
    fn embedding_model_dimensions_match_closed_set() {
        assert_eq!(EmbeddingModel::AllMiniLmL6V2.dimensions(), 384);
        assert_eq!(EmbeddingModel::AllMiniLmL12V2.dimensions(), 384);
        assert_eq!(EmbeddingModel::AllMpnetBaseV2.dimensions(), 768);
        assert!(EmbeddingModel::parse("unknown-model").is_err());
    }

    #[test]
    fn language_roundtrips_through_extension_and_display() {
        assert_eq!(Language::from_extension("RS"), Language::Rust);
        assert_eq!(Language::Rust.to_string(), "Rust");
        assert_eq!(Language::from_extension("weird"), Language::Unknown);
    }
}
