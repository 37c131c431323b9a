//! Exclusion patterns for source discovery.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use glob::{MatchOptions, Pattern};

use crate::error::Result;

/// Ignore files read from the scan root, in load order.
///
/// Both are optional. Their patterns are unioned; there is no precedence
/// and no negation.
pub const EXCLUDE_FILES: [&str; 2] = ["exclude.txt", ".gitignore"];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A single normalized exclusion pattern.
///
/// Holds the pattern as written (with forward slashes) and its compiled
/// forms: as given, and prefixed with `**/` so bare names match at any depth.
#[derive(Debug, Clone)]
pub struct ExcludePattern {
    raw: String,
    anchored: Pattern,
    any_depth: Pattern,
}

impl ExcludePattern {
    /// Compile a pattern. Backslashes are normalized to forward slashes.
    pub fn new(raw: &str) -> std::result::Result<Self, glob::PatternError> {
        let raw = raw.replace('\\', "/");
        let anchored = Pattern::new(&raw)?;
        let any_depth = Pattern::new(&format!("**/{raw}"))?;
        Ok(Self {
            raw,
            anchored,
            any_depth,
        })
    }

    /// The normalized pattern text.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `relative_path` (forward slashes) matches this pattern.
    pub fn matches(&self, relative_path: &str) -> bool {
        self.anchored.matches_with(relative_path, MATCH_OPTIONS)
            || self.any_depth.matches_with(relative_path, MATCH_OPTIONS)
    }
}

/// The merged set of exclusion patterns for one scan root.
#[derive(Debug, Clone, Default)]
pub struct ExcludeMatcher {
    patterns: Vec<ExcludePattern>,
}

impl ExcludeMatcher {
    /// Load and merge the ignore files found in `root`.
    ///
    /// Missing files contribute nothing. Blank lines and `#` comments are
    /// skipped. Patterns that are not valid globs are logged and dropped.
    pub fn load(root: &Path) -> Result<Self> {
        let mut lines = Vec::new();

        for name in EXCLUDE_FILES {
            let path = root.join(name);
            match fs::read_to_string(&path) {
                Ok(content) => {
                    tracing::debug!(file = %path.display(), "Loading exclusion patterns");
                    lines.extend(content.lines().map(str::to_owned));
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(Self::from_lines(lines.iter().map(String::as_str)))
    }

    /// Build a matcher from pattern lines, applying the same filtering as
    /// [`ExcludeMatcher::load`].
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut seen = BTreeSet::new();
        let mut patterns = Vec::new();

        for line in lines {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            match ExcludePattern::new(line) {
                Ok(pattern) => {
                    if seen.insert(pattern.as_str().to_owned()) {
                        patterns.push(pattern);
                    }
                }
                Err(e) => {
                    tracing::warn!(pattern = line, error = %e, "Ignoring invalid exclusion pattern");
                }
            }
        }

        Self { patterns }
    }

    /// Whether `relative_path` is excluded by any pattern.
    ///
    /// Backslashes in the path are treated as separators.
    pub fn is_excluded(&self, relative_path: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let normalized = relative_path.replace('\\', "/");
        self.patterns.iter().any(|p| p.matches(&normalized))
    }

    /// The loaded patterns.
    pub fn patterns(&self) -> &[ExcludePattern] {
        &self.patterns
    }

    /// Number of distinct patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// True when nothing is excluded.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_files_yield_no_patterns() {
        let temp = TempDir::new().unwrap();
        let matcher = ExcludeMatcher::load(temp.path()).unwrap();
        assert!(matcher.is_empty());
        assert!(!matcher.is_excluded("pkg/a.py"));
    }

    #[test]
    fn test_merges_both_files() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("exclude.txt"), "# comment\n\nsetup.py\n  tests\\*  \n").unwrap();
        fs::write(temp.path().join(".gitignore"), "venv/*\nsetup.py\n").unwrap();

        let matcher = ExcludeMatcher::load(temp.path()).unwrap();
        let raw: Vec<_> = matcher.patterns().iter().map(|p| p.as_str()).collect();

        assert_eq!(raw, vec!["setup.py", "tests/*", "venv/*"]);
    }

    #[test]
    fn test_bare_name_matches_at_any_depth() {
        let matcher = ExcludeMatcher::from_lines(["b.py"]);
        assert!(matcher.is_excluded("b.py"));
        assert!(matcher.is_excluded("pkg/b.py"));
        assert!(matcher.is_excluded("pkg/deep/nested/b.py"));
        assert!(!matcher.is_excluded("pkg/ab.py"));
        assert!(!matcher.is_excluded("pkg/b.pyc"));
    }

    #[test]
    fn test_directory_pattern() {
        let matcher = ExcludeMatcher::from_lines(["tests/*"]);
        assert!(matcher.is_excluded("tests/test_a.py"));
        assert!(matcher.is_excluded("pkg/tests/test_a.py"));
        // `*` crosses separators, as in shell-style fnmatch.
        assert!(matcher.is_excluded("tests/unit/test_a.py"));
        assert!(!matcher.is_excluded("pkg/test_a.py"));
    }

    #[test]
    fn test_case_sensitive() {
        let matcher = ExcludeMatcher::from_lines(["Setup.py"]);
        assert!(matcher.is_excluded("Setup.py"));
        assert!(!matcher.is_excluded("setup.py"));
    }

    #[test]
    fn test_windows_separators_in_path() {
        let matcher = ExcludeMatcher::from_lines(["pkg/gen_*.py"]);
        assert!(matcher.is_excluded("pkg\\gen_tables.py"));
    }

    #[test]
    fn test_invalid_pattern_is_dropped() {
        let matcher = ExcludeMatcher::from_lines(["[unclosed", "ok.py"]);
        assert_eq!(matcher.len(), 1);
        assert!(matcher.is_excluded("ok.py"));
    }
}
