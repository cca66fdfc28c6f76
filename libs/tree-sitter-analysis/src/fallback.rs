//! Line-window fallback chunker, used for languages without a registered
//! tree-sitter grammar (SQL, JSON, YAML, TOML, and anything unrecognized)
//! and for any file whose grammar fails to produce a tree.

use crate::{ChunkConfig, CodeChunk, UnitKind};

const WINDOW_LINES: usize = 60;

/// Splits `source` into fixed-size line windows, each becoming a `Module`
/// chunk. Trailing windows shorter than `min_chunk_chars` are merged into
/// the previous window rather than dropped, so small files still produce at
/// least one chunk.
pub(crate) fn chunk(source: &str, config: &ChunkConfig) -> Vec<CodeChunk> {
    if source.trim().is_empty() {
        return Vec::new();
    }

    let lines: Vec<&str> = source.lines().collect();
    let mut chunks = Vec::new();
    let mut start_line = 0usize;
    let mut byte_offset = 0usize;

    while start_line < lines.len() && chunks.len() < config.max_chunks_per_file {
        let end_line = (start_line + WINDOW_LINES).min(lines.len());
        let window = &lines[start_line..end_line];
        let content = window.join("\n");
        let start_byte = byte_offset;
        let end_byte = start_byte + content.len();

        if content.trim().chars().count() >= config.min_chunk_chars {
            chunks.push(CodeChunk {
                kind: UnitKind::Module,
                name: format!("chunk_{}", chunks.len() + 1),
                signature: None,
                content,
                start_line: (start_line + 1) as u32,
                end_line: end_line as u32,
                start_byte,
                end_byte,
            });
        } else if let Some(last) = chunks.last_mut() {
            // Merge a short trailing window into the previous chunk instead
            // of dropping it outright.
            last.content.push('\n');
            last.content.push_str(&content);
            last.end_line = end_line as u32;
            last.end_byte = end_byte;
        }

        byte_offset = end_byte + 1; // account for the newline join boundary
        start_line = end_line;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_source_yields_no_chunks() {
        assert!(chunk("", &ChunkConfig::default()).is_empty());
    }

    #[test]
    fn short_file_yields_single_chunk() {
        let source = "line one\nline two\nline three";
        let chunks = chunk(source, &ChunkConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_line, 1);
    }

    #[test]
    fn long_file_splits_into_multiple_windows() {
        let source = (0..200).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let chunks = chunk(&source, &ChunkConfig::default());
        assert!(chunks.len() > 1);
    }
}
