//! Error types for pyxforge-core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for pyxforge-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pyxforge-core.
///
/// Per-file problems during transformation are not raised through this type;
/// they are collected as [`crate::TransformFailure`] values so one bad file
/// never aborts a scan.
#[derive(Debug, Error)]
pub enum Error {
    /// The scan root does not exist or is not a directory.
    #[error("cannot scan {}: {reason}", root.display())]
    Scan { root: PathBuf, reason: String },

    /// A single source file could not be read or written.
    #[error("failed to transform {}: {message}", path.display())]
    Transform { path: PathBuf, message: String },

    /// Renaming a shadowing package failed; no references were rewritten.
    #[error("shadow resolution failed{}: {message}", path.as_ref().map(|p| format!(" at {}", p.display())).unwrap_or_default())]
    ShadowResolution {
        path: Option<PathBuf>,
        message: String,
    },

    /// The compiler backend reported failure.
    #[error("build failed: {0}")]
    Build(String),

    /// The packaging backend could not produce an installable unit.
    #[error("packaging failed: {0}")]
    Packaging(String),

    /// Installing the built unit failed.
    #[error("install failed: {0}")]
    Install(String),

    /// The Python toolchain could not be located or probed.
    #[error("toolchain error: {0}")]
    Toolchain(String),

    /// An installed library could not be located.
    #[error("library not found: {0}")]
    LibraryNotFound(String),

    /// Serialization of a backend request or probe response failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid operation (e.g., purging an output dir that contains the sources).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl Error {
    /// Short recovery hint for the user, if one applies.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Scan { .. } => Some("pass an existing directory as the build target"),
            Self::Build(_) => Some("rerun with --verbose to see the full compiler output"),
            Self::Packaging(_) => Some("make sure the `build` package is installed: pip install build"),
            Self::Install(_) => Some("check that pip can write to the active environment"),
            Self::Toolchain(_) => {
                Some("install Python with Cython and setuptools, or set PYXFORGE_PYTHON")
            }
            Self::LibraryNotFound(_) => Some("check the name with `python -c \"import <name>\"`"),
            Self::ShadowResolution { .. } => {
                Some("remove the stale staging directory .pyxforge_tmp and retry")
            }
            _ => None,
        }
    }

    /// Render the error followed by its recovery hint.
    pub fn with_hint(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{self}\n  hint: {hint}"),
            None => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_error_message() {
        let err = Error::Scan {
            root: PathBuf::from("missing/src"),
            reason: "not a directory".to_string(),
        };
        assert_eq!(err.to_string(), "cannot scan missing/src: not a directory");
    }

    #[test]
    fn test_with_hint() {
        let err = Error::Build("exit status 1".to_string());
        let rendered = err.with_hint();
        assert!(rendered.starts_with("build failed: exit status 1"));
        assert!(rendered.contains("hint: rerun with --verbose"));

        let err = Error::InvalidOperation("nope".to_string());
        assert_eq!(err.with_hint(), "invalid operation: nope");
    }

    #[test]
    fn test_shadow_error_without_path() {
        let err = Error::ShadowResolution {
            path: None,
            message: "target exists".to_string(),
        };
        assert_eq!(err.to_string(), "shadow resolution failed: target exists");
    }
}
