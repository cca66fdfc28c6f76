//! Language processor implementations for AST analysis.
//!
//! [`MultiLanguageProcessor`] dispatches to the tree-sitter grammar
//! registered for its language (see [`crate::languages`]) and walks the
//! resulting tree against that language's node-kind rules. Languages with
//! no registered grammar, or a grammar that fails to parse, fall through to
//! the line-window [`crate::fallback`] chunker.

use anyhow::{anyhow, Result};
use tree_sitter::{Node, Parser};

use crate::languages::{self, NodeRule};
use crate::{fallback, ChunkConfig, CodeChunk, UnitKind};

/// Dispatches chunking to the tree-sitter grammar for a fixed language,
/// falling back to line-window chunking when no grammar is registered or
/// parsing fails outright.
#[derive(Debug, Clone)]
pub struct MultiLanguageProcessor {
    language: String,
}

impl MultiLanguageProcessor {
    /// Create a new processor for the given canonical language name (e.g.
    /// `"Python"`, matching the host crate's `Language::as_str`).
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
        }
    }

    /// Canonical language names with a registered tree-sitter grammar.
    pub fn supported_languages() -> &'static [&'static str] {
        &[
            "Rust", "Python", "JavaScript", "TypeScript", "Go", "Java", "Ruby", "Php", "Swift",
            "Kotlin", "C", "Cpp", "CSharp",
        ]
    }
}

impl crate::LanguageProcessor for MultiLanguageProcessor {
    fn chunk_code(&self, source: &str, config: &ChunkConfig) -> Result<Vec<CodeChunk>> {
        if source.len() as u64 > config.max_parse_bytes {
            return Ok(fallback::chunk(source, config));
        }

        let Some(spec) = languages::spec_for(&self.language) else {
            return Ok(fallback::chunk(source, config));
        };

        let mut parser = Parser::new();
        parser
            .set_language(&(spec.language)())
            .map_err(|e| anyhow!("failed to load {} grammar: {e}", self.language))?;

        let tree = parser
            .parse(source, None)
            .ok_or_else(|| anyhow!("tree-sitter produced no tree for {}", self.language))?;

        let mut chunks = Vec::new();
        let mut ancestors: Vec<&'static str> = Vec::new();
        walk(tree.root_node(), source, &mut ancestors, spec.rules, config, &mut chunks);

        if chunks.is_empty() {
            return Ok(fallback::chunk(source, config));
        }
        Ok(chunks)
    }

    fn supported_kinds(&self) -> &'static [UnitKind] {
        match self.language.as_str() {
            "Rust" => &[UnitKind::Function, UnitKind::Method, UnitKind::Struct, UnitKind::Protocol, UnitKind::Module],
            "Python" => &[UnitKind::Function, UnitKind::Method, UnitKind::Class],
            "JavaScript" => &[UnitKind::Function, UnitKind::Method, UnitKind::Class],
            "TypeScript" => &[UnitKind::Function, UnitKind::Method, UnitKind::Class, UnitKind::Protocol],
            "Go" => &[UnitKind::Function, UnitKind::Method, UnitKind::Struct],
            "Java" => &[UnitKind::Method, UnitKind::Class, UnitKind::Protocol],
            "Ruby" => &[UnitKind::Method, UnitKind::Class],
            "Php" => &[UnitKind::Function, UnitKind::Method, UnitKind::Class],
            "Swift" => &[UnitKind::Class, UnitKind::Protocol, UnitKind::Struct],
            "Kotlin" => &[UnitKind::Function, UnitKind::Method, UnitKind::Class],
            "C" => &[UnitKind::Function, UnitKind::Struct],
            "Cpp" => &[UnitKind::Function, UnitKind::Class, UnitKind::Struct],
            "CSharp" => &[UnitKind::Method, UnitKind::Class, UnitKind::Protocol],
            _ => &[UnitKind::Module],
        }
    }
}

fn classify<'a>(kind: &str, ancestors: &[&str], rules: &'a [NodeRule]) -> Option<&'a NodeRule> {
    rules
        .iter()
        .find(|r| r.kind == kind && r.requires_ancestor.is_some_and(|a| ancestors.contains(&a)))
        .or_else(|| rules.iter().find(|r| r.kind == kind && r.requires_ancestor.is_none()))
}

fn walk<'tree>(
    node: Node<'tree>,
    source: &str,
    ancestors: &mut Vec<&'tree str>,
    rules: &[NodeRule],
    config: &ChunkConfig,
    out: &mut Vec<CodeChunk>,
) {
    if out.len() >= config.max_chunks_per_file {
        return;
    }

    if let Some(rule) = classify(node.kind(), ancestors, rules) {
        if let Some(chunk) = build_chunk(node, source, rule) {
            if chunk.content.chars().count() >= config.min_chunk_chars {
                out.push(chunk);
            }
        }
    }

    ancestors.push(node.kind());
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, ancestors, rules, config, out);
        if out.len() >= config.max_chunks_per_file {
            break;
        }
    }
    ancestors.pop();
}

fn build_chunk(node: Node, source: &str, rule: &NodeRule) -> Option<CodeChunk> {
    let name = extract_name(node, source, rule.name_field)?;
    let start_byte = node.start_byte();
    let end_byte = node.end_byte();
    let content = source.get(start_byte..end_byte)?.to_string();
    let signature = content
        .lines()
        .next()
        .map(|line| line.trim().chars().take(200).collect::<String>());

    Some(CodeChunk {
        kind: rule.unit,
        name,
        signature,
        content,
        start_line: (node.start_position().row + 1) as u32,
        end_line: (node.end_position().row + 1) as u32,
        start_byte,
        end_byte,
    })
}

/// Extracts the identifier text for a node's `name_field`. When the field
/// doesn't resolve directly to a leaf identifier (e.g. C/C++'s `declarator`
/// field on a function definition points at a `function_declarator`, not an
/// `identifier`), searches the field's subtree for the first node whose
/// kind ends in `identifier`.
fn extract_name(node: Node, source: &str, name_field: &str) -> Option<String> {
    let field_node = node.child_by_field_name(name_field)?;
    let direct = field_node.utf8_text(source.as_bytes()).ok()?;
    if field_node.kind().ends_with("identifier") {
        return Some(direct.to_string());
    }
    find_identifier(field_node, source)
}

fn find_identifier(node: Node, source: &str) -> Option<String> {
    if node.kind().ends_with("identifier") {
        return node.utf8_text(source.as_bytes()).ok().map(|s| s.to_string());
    }
    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if let Some(found) = find_identifier(child, source) {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LanguageProcessor;

    #[test]
    fn extracts_rust_function_and_struct() {
        let source = r#"
struct Point { x: i32, y: i32 }

fn distance(a: &Point, b: &Point) -> f64 {
    0.0
}

impl Point {
    fn magnitude(&self) -> f64 {
        0.0
    }
}
"#;
        let processor = MultiLanguageProcessor::new("Rust");
        let chunks = processor.chunk_code(source, &ChunkConfig::default()).unwrap();
        let names: Vec<&str> = chunks.iter().map(|c| c.name.as_str()).collect();
        assert!(names.contains(&"Point"));
        assert!(names.contains(&"distance"));
        assert!(names.contains(&"magnitude"));

        let magnitude = chunks.iter().find(|c| c.name == "magnitude").unwrap();
        assert_eq!(magnitude.kind, UnitKind::Method);
        let distance = chunks.iter().find(|c| c.name == "distance").unwrap();
        assert_eq!(distance.kind, UnitKind::Function);
    }

    #[test]
    fn extracts_python_class_and_methods() {
        let source = "class Greeter:\n    def hello(self):\n        return 'hi'\n\ndef standalone():\n    pass\n";
        let processor = MultiLanguageProcessor::new("Python");
        let chunks = processor.chunk_code(source, &ChunkConfig::default()).unwrap();
        let hello = chunks.iter().find(|c| c.name == "hello").unwrap();
        assert_eq!(hello.kind, UnitKind::Method);
        let standalone = chunks.iter().find(|c| c.name == "standalone").unwrap();
        assert_eq!(standalone.kind, UnitKind::Function);
    }

    #[test]
    fn swift_extracts_struct_but_not_free_functions() {
        let source = "struct Vector2 {\n    var x: Double\n}\n\nfunc length() -> Double {\n    return 0.0\n}\n";
        let processor = MultiLanguageProcessor::new("Swift");
        let chunks = processor.chunk_code(source, &ChunkConfig::default()).unwrap();
        assert!(chunks.iter().any(|c| c.name == "Vector2" && c.kind == UnitKind::Struct));
        assert!(!chunks.iter().any(|c| c.name == "length"));
    }

    #[test]
    fn unknown_language_falls_back_to_line_windows() {
        let source = "SELECT * FROM users WHERE id = 1;\n";
        let processor = MultiLanguageProcessor::new("SQL");
        let chunks = processor.chunk_code(source, &ChunkConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, UnitKind::Module);
    }
}
