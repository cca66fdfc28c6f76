//! File discovery: gitignore-aware walking plus binary detection
//! (spec.md §4.7 step 1).

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::domain::error::Result;

/// Custom ignore-file name recognized in addition to `.gitignore`.
pub const RAGIGNORE_FILENAME: &str = ".ragignore";

/// Walks `root`, honoring `.gitignore`/`.ragignore` plus `builtin_excludes`
/// (matched against any path component), and returns every non-ignored,
/// non-binary regular file.
pub fn discover_files(root: &Path, builtin_excludes: &[String], binary_sniff_bytes: usize) -> Result<Vec<PathBuf>> {
    let mut builder = WalkBuilder::new(root);
    builder.hidden(false).add_custom_ignore_filename(RAGIGNORE_FILENAME);

    let mut files = Vec::new();
    for entry in builder.build() {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };
        let path = entry.path();
        if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            continue;
        }
        if is_builtin_excluded(path, root, builtin_excludes) {
            continue;
        }
        if is_binary_file(path, binary_sniff_bytes).unwrap_or(true) {
            continue;
        }
        files.push(path.to_path_buf());
    }
    Ok(files)
}

/// Whether any path component between `root` and `path` matches a
/// built-in exclude (VCS dirs, build artifacts, vendored dependencies).
pub fn is_builtin_excluded(path: &Path, root: &Path, builtin_excludes: &[String]) -> bool {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .any(|c| builtin_excludes.iter().any(|ex| c.as_os_str() == ex.as_str()))
}

/// Sniffs the first `sniff_bytes` of `path`: binary if it contains a NUL
/// byte or fails to decode as UTF-8.
pub fn is_binary_file(path: &Path, sniff_bytes: usize) -> std::io::Result<bool> {
    use std::io::Read;
    let mut file = std::fs::File::open(path)?;
    let mut buf = vec![0u8; sniff_bytes];
    let n = file.read(&mut buf)?;
    buf.truncate(n);
    Ok(buf.contains(&0) || std::str::from_utf8(&buf).is_err())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn excludes_match_any_path_component() {
        let root = Path::new("/repo");
        let excludes = vec!["node_modules".to_string(), ".git".to_string()];
        assert!(is_builtin_excluded(Path::new("/repo/node_modules/lib/index.js"), root, &excludes));
        assert!(!is_builtin_excluded(Path::new("/repo/src/lib.rs"), root, &excludes));
    }

    #[test]
    fn nul_byte_marks_a_file_binary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bin.dat");
        std::fs::File::create(&path).unwrap().write_all(&[0x41, 0x00, 0x42]).unwrap();
        assert!(is_binary_file(&path, 8192).unwrap());
    }

    #[test]
    fn valid_utf8_text_is_not_binary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("text.rs");
        std::fs::File::create(&path).unwrap().write_all(b"fn main() {}").unwrap();
        assert!(!is_binary_file(&path, 8192).unwrap());
    }

    #[test]
    fn discover_files_skips_builtin_excludes_and_binaries() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        std::fs::write(dir.path().join("node_modules/lib.js"), "ignored").unwrap();
        std::fs::write(dir.path().join("main.rs"), "fn main() {}").unwrap();
        std::fs::File::create(dir.path().join("blob.bin"))
            .unwrap()
            .write_all(&[0, 1, 2])
            .unwrap();

        let found = discover_files(dir.path(), &["node_modules".to_string()], 8192).unwrap();
        let names: Vec<_> = found.iter().filter_map(|p| p.file_name()).map(|n| n.to_string_lossy().to_string()).collect();
        assert!(names.contains(&"main.rs".to_string()));
        assert!(!names.contains(&"lib.js".to_string()));
        assert!(!names.contains(&"blob.bin".to_string()));
    }
}
