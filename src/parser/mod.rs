//! Parser (C6): dispatches a file's content to the
//! `tree-sitter-analysis` workspace crate by [`Language`], then adapts its
//! leaf-level `CodeChunk`s into this crate's [`SemanticUnit`]s.
//!
//! Per spec.md §4.6, an unparsable file yields an empty list plus a soft
//! diagnostic (logged, not propagated) rather than aborting the directory
//! walk that called it.

use tracing::warn;
use tree_sitter_analysis::{ChunkConfig, CodeChunk, LanguageProcessor, MultiLanguageProcessor, UnitKind};

use crate::config::ParserConfig;
use crate::domain::types::{Language, SemanticUnit, UnitType};

fn to_unit_type(kind: UnitKind) -> UnitType {
    match kind {
        UnitKind::Function => UnitType::Function,
        UnitKind::Class => UnitType::Class,
        UnitKind::Module => UnitType::Module,
        UnitKind::Protocol => UnitType::Protocol,
        UnitKind::Struct => UnitType::Struct,
        UnitKind::Method => UnitType::Method,
    }
}

fn to_chunk_config(config: &ParserConfig) -> ChunkConfig {
    ChunkConfig {
        max_parse_bytes: config.max_parse_bytes,
        min_chunk_chars: config.min_chunk_chars,
        max_chunks_per_file: config.max_chunks_per_file,
    }
}

fn chunk_to_unit(chunk: CodeChunk, language: Language) -> SemanticUnit {
    SemanticUnit {
        unit_type: to_unit_type(chunk.kind),
        name: chunk.name,
        signature: chunk.signature,
        content: chunk.content,
        language,
        start_line: chunk.start_line,
        end_line: chunk.end_line,
        start_byte: chunk.start_byte,
        end_byte: chunk.end_byte,
    }
}

/// Extracts semantic units from `source`, dispatching on `language` to the
/// matching tree-sitter grammar (or the line-window fallback for languages
/// with none). Never errors: a parse failure is logged and yields an empty
/// list so the caller's directory walk continues.
pub fn extract_units(source: &str, language: Language, config: &ParserConfig) -> Vec<SemanticUnit> {
    if language == Language::Unknown {
        warn!("skipping extraction for unrecognized language");
        return Vec::new();
    }

    let processor = MultiLanguageProcessor::new(language.as_str());
    let chunk_config = to_chunk_config(config);
    match processor.chunk_code(source, &chunk_config) {
        Ok(chunks) => chunks
            .into_iter()
            .filter(|c| c.content.chars().count() >= config.min_chunk_chars)
            .map(|c| chunk_to_unit(c, language))
            .collect(),
        Err(e) => {
            warn!(language = language.as_str(), error = %e, "parse failed, yielding no units for this file");
            Vec::new()
        }
    }
}

/// Canonical capitalized language names with a registered tree-sitter
/// grammar (spec.md §4.6's "fast native backend" set). Languages outside
/// this list still extract via the line-window fallback.
pub fn natively_supported_languages() -> &'static [&'static str] {
    MultiLanguageProcessor::supported_languages()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_rust_function_as_semantic_unit() {
        let source = "fn greet(name: &str) -> String {\n    format!(\"hi {name}\")\n}\n";
        let units = extract_units(source, Language::Rust, &ParserConfig::default());
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].unit_type, UnitType::Function);
        assert_eq!(units[0].name, "greet");
        assert_eq!(units[0].language, Language::Rust);
    }

    #[test]
    fn unknown_language_yields_no_units() {
        let units = extract_units("whatever", Language::Unknown, &ParserConfig::default());
        assert!(units.is_empty());
    }

    #[test]
    fn config_without_grammar_falls_back_to_line_windows() {
        let source = (0..10).map(|i| format!("line {i}\n")).collect::<String>();
        let units = extract_units(&source, Language::Yaml, &ParserConfig::default());
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].unit_type, UnitType::Module);
    }
}
