//! Per-directory override rules (`.yo-resolve` files).
//!
//! A rule file holds one `<glob> [status]` pair per line. Lookups walk from
//! the file's directory up to the filesystem root; the first directory with
//! a matching rule decides, and within that directory the first matching
//! line wins. A backslash escapes the next character, so literal paths
//! with spaces or glob characters survive as patterns.
//!
//! ```text
//! # keep local edits
//! src/config.json skip
//! *.lock=force
//! !src/** skip
//! pages/\[id\].tsx skip
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::errors::ConflicterError;
use crate::models::{ConflictFile, ConflictStatus};
use crate::transform::FileTransform;

/// Default name of the override file.
pub const DEFAULT_YO_RESOLVE_FILE_NAME: &str = ".yo-resolve";

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// A glob and the status it mandates, scoped to the directory of its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionRule {
    /// Glob relative to the rule file's directory, without the `!` prefix.
    pub pattern: String,
    pub negate: bool,
    pub status: ConflictStatus,
}

impl ResolutionRule {
    /// Parse one line. Blank lines and comments yield `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = split_line(line).into_iter();

        let raw = parts.next()?;
        let raw = raw.as_str();
        let status: ConflictStatus = match parts.next() {
            Some(word) => word.parse().unwrap_or(ConflictStatus::Skip),
            None => ConflictStatus::Skip,
        };
        if let ConflictStatus::Other(word) = &status {
            warn!(pattern = raw, status = word.as_str(), "unrecognized status in override rule");
        }

        let (negate, pattern) = match raw.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, raw),
        };
        let pattern = pattern.trim_start_matches("./").trim_start_matches('/');

        Some(Self {
            pattern: pattern.to_string(),
            negate,
            status,
        })
    }

    /// Test a path relative to the rule's directory (forward slashes).
    pub fn matches(&self, relative_path: &str) -> bool {
        glob_match::glob_match(&self.pattern, relative_path) != self.negate
    }
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || c == '=' || c == '+'
}

/// Split a rule line on unescaped separators, stopping at an unescaped `#`.
/// Escapes stay in the tokens; the glob matcher reads them as literals.
fn split_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            '#' => break,
            c if is_separator(c) => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Escape a relative path so it matches only itself as a rule pattern.
pub fn escape_pattern(path: &str) -> String {
    let mut escaped = String::with_capacity(path.len());
    for c in path.chars() {
        if matches!(c, '\\' | '*' | '?' | '[' | ']' | '{' | '}' | '!' | '#') || is_separator(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Parse a whole rule file, keeping declaration order.
pub fn parse_rules(contents: &str) -> Vec<ResolutionRule> {
    contents.lines().filter_map(ResolutionRule::parse_line).collect()
}

// ---------------------------------------------------------------------------
// YoResolve
// ---------------------------------------------------------------------------

type RuleSet = Arc<Vec<ResolutionRule>>;

/// Answers "what status is mandated for this path?" from override files.
///
/// Rule sets are loaded lazily per directory and cached for the lifetime of
/// the resolver. Unreadable or missing files count as "no rules".
pub struct YoResolve {
    file_name: String,
    cache: RwLock<HashMap<PathBuf, Option<RuleSet>>>,
}

impl YoResolve {
    pub fn new() -> Self {
        Self::with_file_name(DEFAULT_YO_RESOLVE_FILE_NAME)
    }

    pub fn with_file_name(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Status mandated for `path`, or `None` when no rule applies.
    pub async fn get_status_for_file(&self, path: &Path) -> Option<ConflictStatus> {
        let start = path.parent()?;
        for folder in start.ancestors() {
            let Some(rules) = self.rules_for_folder(folder).await else {
                continue;
            };
            let Ok(relative) = path.strip_prefix(folder) else {
                continue;
            };
            let relative = relative.to_string_lossy().replace('\\', "/");

            if let Some(rule) = rules.iter().find(|rule| rule.matches(&relative)) {
                debug!(
                    path = %path.display(),
                    folder = %folder.display(),
                    pattern = rule.pattern.as_str(),
                    status = %rule.status,
                    "override rule matched"
                );
                return Some(rule.status.clone());
            }
        }
        None
    }

    /// Rules declared in `folder`, loading and caching them on first use.
    pub async fn rules_for_folder(&self, folder: &Path) -> Option<RuleSet> {
        let cached = self
            .cache
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(folder)
            .cloned();
        if let Some(rules) = cached {
            return rules;
        }

        let rules = self.load_rules(folder).await;
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(folder.to_path_buf(), rules.clone());
        rules
    }

    async fn load_rules(&self, folder: &Path) -> Option<RuleSet> {
        let rule_file = folder.join(&self.file_name);
        match tokio::fs::metadata(&rule_file).await {
            Ok(metadata) if metadata.is_file() => {}
            Ok(_) => return None,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(path = %rule_file.display(), error = %e, "cannot stat override file");
                }
                return None;
            }
        }

        match tokio::fs::read_to_string(&rule_file).await {
            Ok(contents) => {
                let rules = parse_rules(&contents);
                debug!(path = %rule_file.display(), count = rules.len(), "loaded override rules");
                Some(Arc::new(rules))
            }
            Err(e) => {
                debug!(path = %rule_file.display(), error = %e, "ignoring unreadable override file");
                None
            }
        }
    }

    /// Assign the mandated status to a file that has none yet.
    pub async fn apply(&self, file: &mut ConflictFile) {
        if file.status.is_some() {
            return;
        }
        file.status = self.get_status_for_file(&file.path).await;
    }
}

impl Default for YoResolve {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileTransform for YoResolve {
    async fn transform(&self, mut file: ConflictFile) -> Result<Option<ConflictFile>, ConflicterError> {
        self.apply(&mut file).await;
        Ok(Some(file))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_parse_line_forms() {
        assert_eq!(ResolutionRule::parse_line(""), None);
        assert_eq!(ResolutionRule::parse_line("   # only a comment"), None);

        let rule = ResolutionRule::parse_line("src/*.js").unwrap();
        assert_eq!(rule.pattern, "src/*.js");
        assert_eq!(rule.status, ConflictStatus::Skip);
        assert!(!rule.negate);

        let rule = ResolutionRule::parse_line("*.lock=force # regenerate").unwrap();
        assert_eq!(rule.pattern, "*.lock");
        assert_eq!(rule.status, ConflictStatus::Force);

        let rule = ResolutionRule::parse_line("!keep.txt\tforce").unwrap();
        assert!(rule.negate);
        assert_eq!(rule.pattern, "keep.txt");

        let rule = ResolutionRule::parse_line("./a.txt merge").unwrap();
        assert_eq!(rule.pattern, "a.txt");
        assert_eq!(rule.status, ConflictStatus::Other("merge".into()));
    }

    #[test]
    fn test_escaped_paths_match_literally() {
        for path in ["pages/[id].tsx", "my notes.txt", "a+b=c.txt", "#tag {x}.md", "!bang?.txt"] {
            let rule = ResolutionRule::parse_line(&format!("{} force", escape_pattern(path)))
                .unwrap();
            assert!(!rule.negate, "{path}");
            assert_eq!(rule.status, ConflictStatus::Force, "{path}");
            assert!(rule.matches(path), "{path}");
        }

        let rule = ResolutionRule::parse_line("pages/\\[id\\].tsx").unwrap();
        assert!(!rule.matches("pages/i.tsx"));
    }

    #[test]
    fn test_negated_rule_matches_everything_else() {
        let rule = ResolutionRule::parse_line("!keep.txt").unwrap();
        assert!(!rule.matches("keep.txt"));
        assert!(rule.matches("other.txt"));
    }

    #[test]
    fn test_parse_rules_keeps_order() {
        let rules = parse_rules("a.txt force\n\n# c\nb.txt\r\n*.txt ignore\n");
        let patterns: Vec<_> = rules.iter().map(|r| r.pattern.as_str()).collect();
        assert_eq!(patterns, vec!["a.txt", "b.txt", "*.txt"]);
        assert_eq!(rules[2].status, ConflictStatus::Ignore);
    }

    #[tokio::test]
    async fn test_nearest_directory_wins() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        write(&a.join(".yo-resolve"), "*.txt skip\n");
        write(&a.join("b/.yo-resolve"), "*.txt force\n");

        let resolver = YoResolve::new();
        assert_eq!(
            resolver.get_status_for_file(&a.join("b/x.txt")).await,
            Some(ConflictStatus::Force)
        );
        assert_eq!(
            resolver.get_status_for_file(&a.join("y.txt")).await,
            Some(ConflictStatus::Skip)
        );
    }

    #[tokio::test]
    async fn test_first_matching_line_wins_and_ancestors_are_searched() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(&root.join(".yo-resolve"), "root-to-skip\nsub/match-to-skip\n");
        write(
            &root.join("sub/.yo-resolve"),
            "sub-to-skip\nsub2-to-force force\nsub2-to-force skip\n",
        );

        let resolver = YoResolve::new();
        let cases = [
            ("root-to-skip", Some(ConflictStatus::Skip)),
            ("sub/sub-to-skip", Some(ConflictStatus::Skip)),
            ("sub/sub2-to-force", Some(ConflictStatus::Force)),
            ("sub/match-to-skip", Some(ConflictStatus::Skip)),
            ("sub/no-resolve", None),
        ];
        for (relative, expected) in cases {
            let path = root.join(relative);
            assert_eq!(resolver.get_status_for_file(&path).await, expected, "{relative}");
        }
    }

    #[tokio::test]
    async fn test_rules_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let rule_file = dir.path().join(".yo-resolve");
        write(&rule_file, "a.txt force\n");

        let resolver = YoResolve::new();
        let target = dir.path().join("a.txt");
        assert_eq!(resolver.get_status_for_file(&target).await, Some(ConflictStatus::Force));

        std::fs::write(&rule_file, "a.txt skip\n").unwrap();
        assert_eq!(resolver.get_status_for_file(&target).await, Some(ConflictStatus::Force));
        assert_eq!(
            YoResolve::new().get_status_for_file(&target).await,
            Some(ConflictStatus::Skip)
        );
    }

    #[tokio::test]
    async fn test_unreadable_rule_file_means_no_rules() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".yo-resolve"), b"*.txt force\n\xff\xfe\n").unwrap();

        let resolver = YoResolve::new();
        assert!(resolver.rules_for_folder(dir.path()).await.is_none());
        assert_eq!(resolver.get_status_for_file(&dir.path().join("a.txt")).await, None);
    }

    #[tokio::test]
    async fn test_directory_named_like_rule_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".yo-resolve")).unwrap();
        let resolver = YoResolve::new();
        assert_eq!(resolver.get_status_for_file(&dir.path().join("a.txt")).await, None);
    }

    #[tokio::test]
    async fn test_custom_file_name_and_apply() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join(".overrides"), "*.md force\n");
        let resolver = YoResolve::with_file_name(".overrides");

        let mut file = ConflictFile::new(dir.path().join("README.md"), Some(b"x".to_vec()));
        resolver.apply(&mut file).await;
        assert_eq!(file.status, Some(ConflictStatus::Force));

        let mut preset = ConflictFile::new(dir.path().join("README.md"), None)
            .with_status(ConflictStatus::Skip);
        resolver.apply(&mut preset).await;
        assert_eq!(preset.status, Some(ConflictStatus::Skip));
    }
}
