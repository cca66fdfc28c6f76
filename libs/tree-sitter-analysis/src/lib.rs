//! Unified AST analysis library for semantic code analysis.
//!
//! Dispatches source text to a tree-sitter grammar keyed by language name and
//! walks the resulting syntax tree for a small, closed set of structural
//! "unit" kinds (function, class, struct, protocol, method, module). Falls
//! back to a line-window chunker for languages without a registered grammar,
//! or when a grammar fails to produce a usable tree.
//!
//! This crate knows nothing about the host crate's `Memory`/`SemanticUnit`
//! types; [`CodeChunk`] is the leaf-level value the caller adapts into its
//! own domain type.

mod fallback;
mod languages;
pub mod processor;

pub use processor::MultiLanguageProcessor;

/// Structural kind of an extracted [`CodeChunk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// A free function, not bound to a type.
    Function,
    /// A class definition.
    Class,
    /// A whole-file or whole-namespace grouping, used by the fallback
    /// chunker and for config-format files with no finer structure.
    Module,
    /// An interface/protocol-like declaration (Swift `protocol`, Java/C#
    /// `interface`, TypeScript `interface`).
    Protocol,
    /// A plain data struct (Rust/Go/C/C++/Swift `struct`).
    Struct,
    /// A method bound to an enclosing class/struct/impl block.
    Method,
}

/// One extracted chunk of source: a structural unit with its name, content,
/// and byte/line span within the original source text.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeChunk {
    /// Structural kind of this chunk.
    pub kind: UnitKind,
    /// Identifier name (function/class/struct name, or a synthetic name for
    /// fallback chunks).
    pub name: String,
    /// A short one-line signature, when one could be derived cheaply.
    pub signature: Option<String>,
    /// The chunk's source text, byte-for-byte from the original file.
    pub content: String,
    /// 1-based, inclusive start line.
    pub start_line: u32,
    /// 1-based, inclusive end line.
    pub end_line: u32,
    /// 0-based start byte offset.
    pub start_byte: usize,
    /// 0-based end byte offset (exclusive).
    pub end_byte: usize,
}

/// Limits applied while chunking a single file.
#[derive(Debug, Clone, Copy)]
pub struct ChunkConfig {
    /// Files larger than this are sent straight to the fallback chunker
    /// rather than parsed with tree-sitter.
    pub max_parse_bytes: u64,
    /// Chunks shorter than this (in characters) are dropped.
    pub min_chunk_chars: usize,
    /// Hard cap on chunks emitted for one file.
    pub max_chunks_per_file: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_parse_bytes: 2 * 1024 * 1024,
            min_chunk_chars: 20,
            max_chunks_per_file: 500,
        }
    }
}

/// A processor able to chunk one or more languages into [`CodeChunk`]s.
pub trait LanguageProcessor: Send + Sync {
    /// Chunk `source` (the language is implied by how the processor was
    /// constructed / dispatched to).
    fn chunk_code(&self, source: &str, config: &ChunkConfig) -> anyhow::Result<Vec<CodeChunk>>;

    /// The unit kinds this processor is capable of emitting for the
    /// current language. Callers must not assume feature parity across
    /// languages (e.g. Swift never emits `Function`, Ruby never emits
    /// `Method` for singleton methods).
    fn supported_kinds(&self) -> &'static [UnitKind];
}
