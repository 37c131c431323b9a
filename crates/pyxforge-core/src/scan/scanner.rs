//! Recursive discovery of eligible source files.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::exclude::ExcludeMatcher;
use crate::error::{Error, Result};

/// Extension of files eligible for transformation.
pub const SOURCE_EXTENSION: &str = "py";

/// One discovered source file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceUnit {
    /// Absolute path of the file.
    pub path: PathBuf,

    /// Path relative to the scan root.
    pub relative: PathBuf,
}

impl SourceUnit {
    /// Relative path with forward slashes, as matched by exclusion patterns.
    pub fn relative_str(&self) -> String {
        self.relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Discovers source files under a root, applying exclusion once.
///
/// Stateless: every call to [`SourceScanner::scan`] walks the filesystem
/// again. Results are sorted by relative path.
#[derive(Debug, Clone, Default)]
pub struct SourceScanner {
    matcher: Option<ExcludeMatcher>,
}

impl SourceScanner {
    /// Scanner that loads exclusion patterns from each scan root.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scanner with a fixed matcher instead of the root's ignore files.
    pub fn with_matcher(matcher: ExcludeMatcher) -> Self {
        Self {
            matcher: Some(matcher),
        }
    }

    /// Check that `root` is an existing directory and canonicalize it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Scan`] if `root` does not exist or is not a
    /// directory.
    pub fn validate_root(root: &Path) -> Result<PathBuf> {
        if !root.exists() {
            return Err(Error::Scan {
                root: root.to_path_buf(),
                reason: "path does not exist".to_string(),
            });
        }
        if !root.is_dir() {
            return Err(Error::Scan {
                root: root.to_path_buf(),
                reason: "not a directory".to_string(),
            });
        }
        Ok(root.canonicalize()?)
    }

    /// Enumerate every non-excluded `.py` file under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Scan`] if `root` does not exist or is not a
    /// directory. Unreadable entries below the root are logged and skipped.
    pub fn scan(&self, root: &Path) -> Result<Vec<SourceUnit>> {
        let root = Self::validate_root(root)?;
        let loaded;
        let matcher = match &self.matcher {
            Some(m) => m,
            None => {
                loaded = ExcludeMatcher::load(&root)?;
                &loaded
            }
        };

        let mut units = Vec::new();
        let mut excluded = 0usize;

        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };

            if !entry.file_type().is_file()
                || entry.path().extension().and_then(|e| e.to_str()) != Some(SOURCE_EXTENSION)
            {
                continue;
            }

            let Ok(relative) = entry.path().strip_prefix(&root) else {
                continue;
            };
            let unit = SourceUnit {
                path: entry.path().to_path_buf(),
                relative: relative.to_path_buf(),
            };

            if matcher.is_excluded(&unit.relative_str()) {
                tracing::debug!(file = %unit.relative.display(), "Excluded");
                excluded += 1;
                continue;
            }

            units.push(unit);
        }

        units.sort_by(|a, b| a.relative.cmp(&b.relative));
        tracing::info!(
            root = %root.display(),
            files = units.len(),
            excluded,
            "Scan complete"
        );

        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "x = 1\n").unwrap();
    }

    fn relatives(units: &[SourceUnit]) -> BTreeSet<String> {
        units.iter().map(SourceUnit::relative_str).collect()
    }

    #[test]
    fn test_scan_finds_nested_sources() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "main.py");
        touch(temp.path(), "pkg/__init__.py");
        touch(temp.path(), "pkg/sub/deep.py");
        touch(temp.path(), "pkg/data.json");
        touch(temp.path(), "README.md");

        let units = SourceScanner::new().scan(temp.path()).unwrap();

        assert_eq!(
            relatives(&units),
            BTreeSet::from([
                "main.py".to_string(),
                "pkg/__init__.py".to_string(),
                "pkg/sub/deep.py".to_string(),
            ])
        );
        assert!(units.iter().all(|u| u.path.is_absolute()));
    }

    #[test]
    fn test_scan_applies_ignore_files() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a.py");
        touch(temp.path(), "b.py");
        touch(temp.path(), "pkg/b.py");
        touch(temp.path(), "pkg/deep/er/b.py");
        touch(temp.path(), "venv/lib/site.py");
        fs::write(temp.path().join("exclude.txt"), "b.py\n").unwrap();
        fs::write(temp.path().join(".gitignore"), "venv/*\n").unwrap();

        let units = SourceScanner::new().scan(temp.path()).unwrap();

        assert_eq!(relatives(&units), BTreeSet::from(["a.py".to_string()]));
    }

    #[test]
    fn test_scan_with_fixed_matcher() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "keep.py");
        touch(temp.path(), "gen/drop.py");

        let scanner = SourceScanner::with_matcher(ExcludeMatcher::from_lines(["gen/*"]));
        let units = scanner.scan(temp.path()).unwrap();

        assert_eq!(relatives(&units), BTreeSet::from(["keep.py".to_string()]));
    }

    #[test]
    fn test_scan_missing_root() {
        let temp = TempDir::new().unwrap();
        let err = SourceScanner::new().scan(&temp.path().join("nope")).unwrap_err();
        assert!(matches!(err, Error::Scan { .. }));
    }

    #[test]
    fn test_scan_file_root() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "single.py");
        let err = SourceScanner::new().scan(&temp.path().join("single.py")).unwrap_err();
        assert!(matches!(err, Error::Scan { .. }));
    }
}
