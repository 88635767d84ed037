//! Architectural Enforcement Integration Tests
//!
//! This package contains integration tests that enforce architectural principles
//! of `tripwise-core`:
//! - No `unwrap()`/`expect()` outside tests; errors are propagated
//! - No sleeping in production code; waits go through the cache or channels
//! - Logging through `tracing`, never `println!`
//! - The HTTP client stays inside the HTTP transport
//! - Cache internals are reached only through the `cache` re-exports
//!
//! These tests are designed to catch violations early in the development cycle.

use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// One source file of the core crate, with its test module stripped
#[derive(Debug)]
pub struct SourceFile {
    /// Path relative to the crate's `src/`
    pub path: PathBuf,
    /// Lines before the first `#[cfg(test)]`, with their 1-based line numbers
    pub production: Vec<(usize, String)>,
}

impl SourceFile {
    /// Whether the file lives under `dir` (relative to `src/`)
    pub fn is_under(&self, dir: &str) -> bool {
        self.path.starts_with(dir)
    }
}

/// A rule violation
#[derive(Debug, PartialEq, Eq)]
pub struct Violation {
    /// File relative to `src/`
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// Offending line, trimmed
    pub text: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.path.display(), self.line, self.text)
    }
}

/// `src/` of the core crate
pub fn core_src_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("client")
        .join("core")
        .join("src")
}

/// Every `.rs` file under `root`, test modules stripped
pub fn production_sources(root: &Path) -> Vec<SourceFile> {
    let mut files: Vec<SourceFile> = WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .filter_map(|e| {
            let contents = fs::read_to_string(e.path()).ok()?;
            let path = e.path().strip_prefix(root).ok()?.to_path_buf();
            Some(SourceFile {
                path,
                production: strip_tests(&contents),
            })
        })
        .collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    files
}

/// Lines before the first `#[cfg(test)]`, skipping comments
pub fn strip_tests(contents: &str) -> Vec<(usize, String)> {
    contents
        .lines()
        .enumerate()
        .take_while(|(_, line)| line.trim() != "#[cfg(test)]")
        .filter(|(_, line)| !line.trim_start().starts_with("//"))
        .map(|(i, line)| (i + 1, line.to_string()))
        .collect()
}

/// Lines of `files` matching `pattern`, excluding files for which `exempt` holds
pub fn find_violations(
    files: &[SourceFile],
    pattern: &str,
    exempt: impl Fn(&SourceFile) -> bool,
) -> Vec<Violation> {
    files
        .iter()
        .filter(|f| !exempt(f))
        .flat_map(|f| {
            f.production
                .iter()
                .filter(|(_, line)| line.contains(pattern))
                .map(|(n, line)| Violation {
                    path: f.path.clone(),
                    line: *n,
                    text: line.trim().to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_tests_stops_at_test_module() {
        let src = "fn a() {}\n// x.unwrap()\nfn b() {}\n#[cfg(test)]\nmod tests {}\n";
        let lines = strip_tests(src);
        assert_eq!(
            lines,
            vec![(1, "fn a() {}".to_string()), (3, "fn b() {}".to_string())]
        );
    }

    #[test]
    fn test_find_violations_reports_line() {
        let files = vec![SourceFile {
            path: PathBuf::from("ledger.rs"),
            production: vec![(7, "    let x = y.unwrap();".to_string())],
        }];
        let found = find_violations(&files, ".unwrap()", |_| false);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].to_string(), "ledger.rs:7: let x = y.unwrap();");
        assert!(find_violations(&files, ".unwrap()", |_| true).is_empty());
    }
}
