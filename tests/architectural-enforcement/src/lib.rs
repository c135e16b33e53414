//! Architectural Enforcement Integration Tests
//!
//! Source scans that keep the engine honest:
//! - No sleep() outside the async job poll loop
//! - No blocking file I/O inside async functions
//! - No provider hostnames baked into the engine
//!
//! The helpers here are shared by the test files under `tests/`.

use std::fs;
use std::path::{Path, PathBuf};

/// Workspace root (two levels above this crate)
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Production source directories, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["adapter/core/src", "adapter/runner/src"];

/// A scanned source file
pub struct SourceFile {
    /// Path relative to the workspace root, `/`-separated
    pub relative: String,
    /// File lines
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Lines before the `#[cfg(test)]` module, paired with 1-based numbers
    pub fn production_lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines
            .iter()
            .take_while(|l| l.trim() != "#[cfg(test)]")
            .enumerate()
            .map(|(idx, line)| (idx + 1, line.as_str()))
    }
}

/// Every `.rs` file under `dir` (relative to the workspace root)
#[must_use]
pub fn rust_files(dir: &str) -> Vec<SourceFile> {
    let root = workspace_root();
    let path = root.join(dir);
    if !path.exists() {
        return Vec::new();
    }

    walkdir::WalkDir::new(&path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("rs"))
        .filter_map(|e| {
            let content = fs::read_to_string(e.path()).ok()?;
            let relative = e
                .path()
                .strip_prefix(&root)
                .unwrap_or(e.path())
                .to_string_lossy()
                .replace('\\', "/");
            Some(SourceFile {
                relative,
                lines: content.lines().map(str::to_string).collect(),
            })
        })
        .collect()
}

/// Code portion of a line, with `//` comments removed
#[must_use]
pub fn code_part(line: &str) -> &str {
    let trimmed = line.trim_start();
    if trimmed.starts_with("//") {
        return "";
    }
    match line.find(" //") {
        Some(idx) => &line[..idx],
        None => line,
    }
}

/// Name of the innermost `fn` declared at or above `idx`, if any
#[must_use]
pub fn enclosing_fn<'a>(lines: &'a [String], idx: usize) -> Option<&'a str> {
    lines[..=idx.min(lines.len().saturating_sub(1))]
        .iter()
        .rev()
        .find_map(|line| fn_name(line))
}

/// Whether the innermost `fn` at or above `idx` is `async`
#[must_use]
pub fn in_async_fn(lines: &[String], idx: usize) -> bool {
    lines[..=idx.min(lines.len().saturating_sub(1))]
        .iter()
        .rev()
        .find(|line| fn_name(line).is_some())
        .is_some_and(|line| line.contains("async fn "))
}

fn fn_name(line: &str) -> Option<&str> {
    let code = code_part(line);
    let start = code.find("fn ")?;
    if start > 0 && !code[..start].ends_with(' ') {
        return None;
    }
    let rest = &code[start + 3..];
    let end = rest.find(|c: char| !(c.is_alphanumeric() || c == '_'))?;
    let name = &rest[..end];
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_code_part_strips_comments() {
        assert_eq!(code_part("    // tokio::time::sleep(x)"), "");
        assert_eq!(code_part("let x = 1; // sleep"), "let x = 1;");
        assert_eq!(code_part("let url = \"http://x\";"), "let url = \"http://x\";");
    }

    #[test]
    fn test_enclosing_fn() {
        let src = lines(&[
            "impl Orchestrator {",
            "    async fn poll(&self) {",
            "        tokio::time::sleep(d).await;",
            "    }",
            "}",
        ]);
        assert_eq!(enclosing_fn(&src, 2), Some("poll"));
        assert!(in_async_fn(&src, 2));
        assert_eq!(enclosing_fn(&src, 0), None);
    }

    #[test]
    fn test_production_lines_stop_at_tests() {
        let file = SourceFile {
            relative: "a.rs".into(),
            lines: lines(&["fn a() {}", "#[cfg(test)]", "mod tests {}"]),
        };
        assert_eq!(file.production_lines().count(), 1);
    }

    #[test]
    fn test_workspace_root_has_manifest() {
        assert!(workspace_root().join("Cargo.toml").exists());
    }
}
