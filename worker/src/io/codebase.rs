//! Codebase introspection: file listing, grep and symbol search.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use glob::{MatchOptions, Pattern};
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};
use walkdir::{DirEntry, WalkDir};

const SKIP_DIRS: [&str; 4] = [".git", ".worker", "target", "node_modules"];

const SOURCE_EXTENSIONS: [&str; 6] = ["rs", "py", "js", "jsx", "ts", "tsx"];

const KEY_FILES: [&str; 11] = [
    "README.md",
    "Cargo.toml",
    "pyproject.toml",
    "package.json",
    "main.rs",
    "lib.rs",
    "mod.rs",
    "main.py",
    "__init__.py",
    "index.js",
    "index.ts",
];

static SYMBOL_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:export\s+)?(?:default\s+)?(?:async\s+)?(fn|struct|enum|trait|class|def|function)\s+([A-Za-z_]\w*)",
    )
    .expect("symbol regex should compile")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrepHit {
    pub path: String,
    pub line: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolHit {
    pub path: String,
    pub line: usize,
    pub kind: String,
    pub name: String,
    pub score: f64,
}

/// Read-only view of the workspace consumed by planning and search steps.
pub trait Codebase {
    fn workspace_summary(&self, max_files: usize) -> Result<String>;
    fn candidate_focus_paths(&self, limit: usize) -> Result<Vec<String>>;
    /// Workspace-relative paths of every indexed file.
    fn file_names(&self) -> Result<Vec<String>>;
    fn grep(&self, pattern: &str, globs: &[String]) -> Result<Vec<GrepHit>>;
    fn semantic_search(&self, query: &str, limit: usize) -> Result<Vec<SymbolHit>>;
}

/// Filesystem-backed [`Codebase`]. With `enhanced` off, symbol indexing is
/// skipped: semantic search degrades to grep and summaries omit symbols.
#[derive(Debug, Clone)]
pub struct WorkspaceIndex {
    root: PathBuf,
    enhanced: bool,
}

struct Symbol {
    line: usize,
    kind: String,
    name: String,
    text: String,
}

impl WorkspaceIndex {
    pub fn new(root: &Path, enhanced: bool) -> Self {
        Self {
            root: root.to_path_buf(),
            enhanced,
        }
    }

    fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_skipped(e))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(DirEntry::into_path)
            .collect();
        files.sort();
        files
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn symbols(&self, path: &Path) -> Vec<Symbol> {
        let is_source = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext));
        if !is_source {
            return Vec::new();
        }
        let Ok(content) = fs::read_to_string(path) else {
            return Vec::new();
        };
        content
            .lines()
            .enumerate()
            .filter_map(|(idx, line)| {
                let caps = SYMBOL_DEF.captures(line)?;
                Some(Symbol {
                    line: idx + 1,
                    kind: caps[1].to_string(),
                    name: caps[2].to_string(),
                    text: line.trim().to_string(),
                })
            })
            .collect()
    }
}

impl Codebase for WorkspaceIndex {
    #[instrument(skip_all, fields(max_files))]
    fn workspace_summary(&self, max_files: usize) -> Result<String> {
        let files = self.files();
        let mut by_extension: BTreeMap<String, usize> = BTreeMap::new();
        for file in &files {
            let ext = file
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_else(|| "no extension".to_string());
            *by_extension.entry(ext).or_default() += 1;
        }

        let mut summary = format!("Workspace: {}\nTotal files: {}\n", self.root.display(), files.len());
        summary.push_str("\nFile types:\n");
        for (ext, count) in &by_extension {
            summary.push_str(&format!("  {ext}: {count}\n"));
        }

        if self.enhanced {
            let mut by_kind: BTreeMap<String, usize> = BTreeMap::new();
            for file in &files {
                for symbol in self.symbols(file) {
                    *by_kind.entry(symbol.kind).or_default() += 1;
                }
            }
            let total: usize = by_kind.values().sum();
            summary.push_str(&format!("\nTotal symbols: {total}\nSymbol types:\n"));
            for (kind, count) in &by_kind {
                summary.push_str(&format!("  {kind}: {count}\n"));
            }
        }

        summary.push_str("\nFiles:\n");
        for file in files.iter().take(max_files) {
            summary.push_str(&format!("  {}\n", self.relative(file)));
        }
        if files.len() > max_files {
            summary.push_str(&format!("  ... and {} more\n", files.len() - max_files));
        }
        Ok(summary)
    }

    fn candidate_focus_paths(&self, limit: usize) -> Result<Vec<String>> {
        let files = self.files();
        let mut candidates: Vec<String> = files
            .iter()
            .filter(|f| {
                f.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| KEY_FILES.contains(&n))
            })
            .map(|f| self.relative(f))
            .collect();

        if self.enhanced {
            let mut dense: Vec<(usize, String)> = files
                .iter()
                .map(|f| (self.symbols(f).len(), self.relative(f)))
                .filter(|(count, _)| *count > 5)
                .collect();
            dense.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
            candidates.extend(dense.into_iter().take(10).map(|(_, path)| path));
        }
        if candidates.is_empty() {
            candidates.extend(files.iter().map(|f| self.relative(f)));
        }

        let mut unique = Vec::new();
        for candidate in candidates {
            if !unique.contains(&candidate) {
                unique.push(candidate);
            }
        }
        unique.truncate(limit);
        Ok(unique)
    }

    fn file_names(&self) -> Result<Vec<String>> {
        Ok(self.files().iter().map(|f| self.relative(f)).collect())
    }

    #[instrument(skip_all, fields(pattern = %pattern))]
    fn grep(&self, pattern: &str, globs: &[String]) -> Result<Vec<GrepHit>> {
        let regex = Regex::new(pattern).with_context(|| format!("invalid search pattern `{pattern}`"))?;
        let patterns: Vec<Pattern> = globs
            .iter()
            .map(|g| Pattern::new(g).with_context(|| format!("invalid glob `{g}`")))
            .collect::<Result<_>>()?;

        let mut hits = Vec::new();
        for file in self.files() {
            let rel = self.relative(&file);
            if !patterns.is_empty() && !patterns.iter().any(|p| glob_matches(p, &rel)) {
                continue;
            }
            let Ok(content) = fs::read_to_string(&file) else {
                continue;
            };
            for (idx, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    hits.push(GrepHit {
                        path: rel.clone(),
                        line: idx + 1,
                        text: line.to_string(),
                    });
                }
            }
        }
        debug!(hits = hits.len(), "grep finished");
        Ok(hits)
    }

    #[instrument(skip_all, fields(query = %query, limit))]
    fn semantic_search(&self, query: &str, limit: usize) -> Result<Vec<SymbolHit>> {
        if !self.enhanced {
            let hits = self.grep(&regex::escape(query), &[])?;
            return Ok(hits
                .into_iter()
                .take(limit)
                .map(|hit| SymbolHit {
                    path: hit.path,
                    line: hit.line,
                    kind: "match".to_string(),
                    name: hit.text.trim().to_string(),
                    score: 1.0,
                })
                .collect());
        }

        let query = query.to_lowercase();
        let mut results = Vec::new();
        for file in self.files() {
            for symbol in self.symbols(&file) {
                let score = relevance(&symbol.name, &symbol.text, &query);
                if score > 0.0 {
                    results.push(SymbolHit {
                        path: self.relative(&file),
                        line: symbol.line,
                        kind: symbol.kind,
                        name: symbol.name,
                        score,
                    });
                }
            }
        }
        results.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.path.cmp(&b.path)));
        results.truncate(limit);
        Ok(results)
    }
}

fn is_skipped(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    SKIP_DIRS.contains(&name.as_ref()) || name.starts_with('.')
}

fn glob_matches(pattern: &Pattern, rel: &str) -> bool {
    let options = MatchOptions {
        case_sensitive: true,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    if pattern.matches_with(rel, options) {
        return true;
    }
    // `**/x` also covers files at the root.
    pattern
        .as_str()
        .strip_prefix("**/")
        .and_then(|rest| Pattern::new(rest).ok())
        .is_some_and(|rest| rest.matches_with(rel, options))
}

/// Token-overlap relevance of a symbol to a lowercase query.
fn relevance(name: &str, text: &str, query: &str) -> f64 {
    let name = name.to_lowercase();
    let text = text.to_lowercase();
    let mut score = 0.0;
    if name == query {
        score += 10.0;
    } else if name.contains(query) {
        score += 5.0;
    }
    if text.contains(query) {
        score += 2.0;
    }
    for word in query.split_whitespace() {
        if name.contains(word) {
            score += 1.0;
        }
        if text.contains(word) {
            score += 0.5;
        }
    }
    score
}
