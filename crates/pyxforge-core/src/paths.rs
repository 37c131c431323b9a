//! Build directory management.
//!
//! Keeps the on-disk layout of a build invocation in one place so the
//! pipeline, the CLI and the clean command agree on every path:
//!
//! ```text
//! <workspace>/
//! ├── build_lib/        # Output root: transformed .pyx + in-place artifacts
//! ├── cython_cache/     # Stable compiler cache, reused across runs
//! ├── build/            # Compiler scratch space (setuptools)
//! └── .pyxforge_tmp/    # Staging copies for library mode
//!     └── <lib>/
//! ```
//!
//! A build invocation owns its output root exclusively. Callers must
//! serialize invocations that share an output root; nothing here locks.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default output directory name.
pub const DEFAULT_OUTPUT_DIR: &str = "build_lib";

/// Default compiler cache directory name.
pub const CACHE_DIR_NAME: &str = "cython_cache";

/// Staging root for copies of installed libraries.
pub const STAGING_DIR_NAME: &str = ".pyxforge_tmp";

/// Scratch directory used by the compiler backend.
pub const SCRATCH_DIR_NAME: &str = "build";

/// Directory layout for one build invocation.
#[derive(Debug, Clone)]
pub struct BuildDirs {
    /// Directory everything else is resolved against.
    pub workspace: PathBuf,

    /// Output root for transformed units and in-place artifacts.
    pub output_dir: PathBuf,

    /// Stable cache directory handed to the compiler backend.
    pub cache_dir: PathBuf,

    /// Staging root for library mode.
    pub staging_root: PathBuf,
}

impl BuildDirs {
    /// Layout rooted at `workspace` with the given output directory.
    ///
    /// Relative output paths are resolved against `workspace`. No directory
    /// is created here.
    pub fn new(workspace: impl AsRef<Path>, output_dir: impl AsRef<Path>) -> Self {
        let workspace = workspace.as_ref().to_path_buf();
        let output_dir = workspace.join(output_dir.as_ref());

        Self {
            cache_dir: workspace.join(CACHE_DIR_NAME),
            staging_root: workspace.join(STAGING_DIR_NAME),
            output_dir,
            workspace,
        }
    }

    /// Layout rooted at the current working directory.
    pub fn in_current_dir(output_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(std::env::current_dir()?, output_dir))
    }

    /// Staging directory for a copy of the library `name`.
    pub fn staging_dir(&self, name: &str) -> PathBuf {
        self.staging_root.join(name)
    }

    /// Compiler scratch directory.
    pub fn scratch_dir(&self) -> PathBuf {
        self.workspace.join(SCRATCH_DIR_NAME)
    }

    /// Remove any stale output and recreate an empty output root.
    ///
    /// Refuses to purge when the output root is the scan root or one of its
    /// ancestors, since that would delete the sources being built.
    pub fn purge_output(&self, scan_root: &Path) -> Result<()> {
        purge_dir(&self.output_dir, scan_root)
    }

    /// Create the cache directory if it does not exist yet.
    pub fn ensure_cache(&self) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)?;
        Ok(())
    }

    /// Remove all build products under the workspace.
    ///
    /// Removes the output root, the compiler cache, the scratch directory,
    /// the staging root and compiled extension files lying directly in the
    /// workspace. Returns the paths that were removed.
    pub fn clean(&self) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();

        for dir in [
            &self.output_dir,
            &self.cache_dir,
            &self.scratch_dir(),
            &self.staging_root,
        ] {
            if dir.is_dir() {
                fs::remove_dir_all(dir)?;
                removed.push(dir.clone());
            }
        }

        for entry in fs::read_dir(&self.workspace)? {
            let path = entry?.path();
            if path.is_file() && is_extension_artifact(&path) {
                fs::remove_file(&path)?;
                removed.push(path);
            }
        }

        tracing::info!(removed = removed.len(), "Workspace cleaned");
        Ok(removed)
    }
}

/// Remove `dir` and recreate it empty, unless it would swallow `protected`.
pub fn purge_dir(dir: &Path, protected: &Path) -> Result<()> {
    let dir_abs = absolute(dir)?;
    let protected_abs = absolute(protected)?;

    if protected_abs.starts_with(&dir_abs) {
        return Err(Error::InvalidOperation(format!(
            "refusing to purge {}: it contains the source tree {}",
            dir.display(),
            protected.display()
        )));
    }

    if dir.exists() {
        tracing::debug!(dir = %dir.display(), "Purging stale output");
        fs::remove_dir_all(dir)?;
    }
    fs::create_dir_all(dir)?;
    Ok(())
}

/// True for compiled extension modules (`.so` / `.pyd`).
pub fn is_extension_artifact(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("so") | Some("pyd")
    )
}

fn absolute(path: &Path) -> Result<PathBuf> {
    match path.canonicalize() {
        Ok(p) => Ok(p),
        Err(_) => Ok(std::path::absolute(path)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let dirs = BuildDirs::new("/work", "out");
        assert_eq!(dirs.output_dir, PathBuf::from("/work/out"));
        assert_eq!(dirs.cache_dir, PathBuf::from("/work/cython_cache"));
        assert_eq!(dirs.staging_dir("requests"), PathBuf::from("/work/.pyxforge_tmp/requests"));
        assert_eq!(dirs.scratch_dir(), PathBuf::from("/work/build"));
    }

    #[test]
    fn test_purge_output_removes_stale_files() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();

        let dirs = BuildDirs::new(temp.path(), "out");
        fs::create_dir_all(dirs.output_dir.join("stale")).unwrap();
        fs::write(dirs.output_dir.join("stale/old.pyx"), "x = 1").unwrap();

        dirs.purge_output(&src).expect("Failed to purge");

        assert!(dirs.output_dir.is_dir());
        assert_eq!(fs::read_dir(&dirs.output_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_purge_refuses_source_ancestor() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let src = temp.path().join("project/src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("keep.py"), "x = 1").unwrap();

        let dirs = BuildDirs::new(temp.path(), "project");
        let err = dirs.purge_output(&src).unwrap_err();

        assert!(matches!(err, Error::InvalidOperation(_)));
        assert!(src.join("keep.py").exists());
    }

    #[test]
    fn test_clean() {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let dirs = BuildDirs::new(temp.path(), "out");

        fs::create_dir_all(&dirs.output_dir).unwrap();
        dirs.ensure_cache().unwrap();
        fs::create_dir_all(dirs.staging_dir("lib")).unwrap();
        fs::write(temp.path().join("mod.cpython-312-x86_64-linux-gnu.so"), "").unwrap();
        fs::write(temp.path().join("notes.txt"), "keep").unwrap();

        let removed = dirs.clean().expect("Failed to clean");

        assert_eq!(removed.len(), 4);
        assert!(!dirs.output_dir.exists());
        assert!(!dirs.cache_dir.exists());
        assert!(!dirs.staging_root.exists());
        assert!(temp.path().join("notes.txt").exists());
    }
}
