//! Python toolchain management.
//!
//! Locates the interpreter that drives Cython, setuptools, `build` and pip,
//! and runs the small probes the pipeline needs (module lookup, library
//! location).

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use serde::Deserialize;

use crate::error::{Error, Result};

/// Environment variable overriding interpreter discovery.
pub const PYTHON_ENV: &str = "PYXFORGE_PYTHON";

/// Exit code of the find_spec probe for "not importable".
const NOT_FOUND_EXIT: i32 = 3;

const FIND_SPEC_PROBE: &str = r#"
import importlib.util, sys
try:
    found = importlib.util.find_spec(sys.argv[1]) is not None
except (ImportError, ValueError):
    found = False
sys.exit(0 if found else 3)
"#;

const LOCATE_LIBRARY_PROBE: &str = r#"
import importlib.metadata, importlib.util, json, sys
name = sys.argv[1]
spec = importlib.util.find_spec(name)
if spec is None or spec.origin is None:
    print("null")
    sys.exit(0)
try:
    version = importlib.metadata.version(name)
except Exception:
    version = None
print(json.dumps({"origin": spec.origin, "version": version}))
"#;

/// Where an installed library lives.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LibraryInfo {
    /// File the import system loads for the library (`.../pkg/__init__.py`).
    pub origin: PathBuf,

    /// Distribution version, if the library has metadata.
    pub version: Option<String>,
}

impl LibraryInfo {
    /// The package directory, if the library is a package.
    ///
    /// Single-file modules return `None`: their parent is the whole
    /// `site-packages` directory.
    pub fn package_dir(&self) -> Option<&Path> {
        let is_package_init = self
            .origin
            .file_stem()
            .and_then(|s| s.to_str())
            .is_some_and(|s| s == "__init__" || s.starts_with("__init__."));
        if is_package_init {
            self.origin.parent()
        } else {
            None
        }
    }
}

/// Finds installed libraries for library mode.
pub trait LibraryLocator {
    /// Locate the library importable as `name`.
    fn locate(&self, name: &str) -> Result<LibraryInfo>;
}

/// Manages the Python interpreter used by the pipeline.
#[derive(Debug, Clone)]
pub struct PythonToolchain {
    /// Path to the interpreter
    python: PathBuf,

    /// `python --version` output
    version: String,
}

impl PythonToolchain {
    /// Detect the interpreter: `PYXFORGE_PYTHON`, then `python3`, then `python`.
    pub fn new() -> Result<Self> {
        Self::with_interpreter(Self::find_python()?)
    }

    /// Use a specific interpreter.
    pub fn with_interpreter(python: impl Into<PathBuf>) -> Result<Self> {
        let python = python.into();
        let version = Self::get_version(&python)?;
        tracing::debug!(python = %python.display(), version = %version, "Python toolchain detected");
        Ok(Self { python, version })
    }

    /// The interpreter path.
    pub fn python(&self) -> &Path {
        &self.python
    }

    /// The interpreter version string, e.g. `Python 3.12.1`.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// A command running the interpreter.
    pub fn command(&self) -> Command {
        Command::new(&self.python)
    }

    /// Run `python -m <module> <args>` in `cwd`, capturing output.
    pub fn run_module(&self, module: &str, args: &[&str], cwd: &Path) -> Result<Output> {
        self.command()
            .arg("-m")
            .arg(module)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|e| {
                Error::Toolchain(format!(
                    "failed to run {} -m {module}: {e}",
                    self.python.display()
                ))
            })
    }

    /// Whether `module` is importable.
    pub fn find_spec(&self, module: &str) -> Result<bool> {
        let status = self
            .command()
            .args(["-c", FIND_SPEC_PROBE, module])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map_err(|e| Error::Toolchain(format!("failed to probe module {module}: {e}")))?;

        match status.code() {
            Some(0) => Ok(true),
            Some(NOT_FOUND_EXIT) => Ok(false),
            other => Err(Error::Toolchain(format!(
                "module probe for {module} exited with {other:?}"
            ))),
        }
    }

    /// Locate an installed library by import name.
    pub fn locate_library(&self, name: &str) -> Result<LibraryInfo> {
        let output = self
            .command()
            .args(["-c", LOCATE_LIBRARY_PROBE, name])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::Toolchain(format!("failed to locate library {name}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Toolchain(format!(
                "library probe for {name} failed: {}",
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let info: Option<LibraryInfo> = serde_json::from_str(stdout.trim())?;
        info.ok_or_else(|| Error::LibraryNotFound(name.to_string()))
    }

    /// Fail unless Cython and setuptools are importable.
    pub fn ensure_build_modules(&self) -> Result<()> {
        for module in ["Cython", "setuptools"] {
            if !self.find_spec(module)? {
                return Err(Error::Toolchain(format!(
                    "Python module `{module}` is not installed for {}",
                    self.python.display()
                )));
            }
        }
        Ok(())
    }

    fn find_python() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(PYTHON_ENV)
            && !path.is_empty()
        {
            return Ok(PathBuf::from(path));
        }

        which::which("python3")
            .or_else(|_| which::which("python"))
            .map_err(|_| Error::Toolchain("python3/python not found in PATH".to_string()))
    }

    fn get_version(python: &Path) -> Result<String> {
        let output = Command::new(python)
            .arg("--version")
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::Toolchain(format!("failed to run {}: {e}", python.display())))?;

        if !output.status.success() {
            return Err(Error::Toolchain(format!(
                "{} --version failed",
                python.display()
            )));
        }

        // Python 2 printed the version on stderr.
        let text = if output.stdout.is_empty() {
            &output.stderr
        } else {
            &output.stdout
        };
        Ok(String::from_utf8_lossy(text).trim().to_string())
    }
}

impl LibraryLocator for PythonToolchain {
    fn locate(&self, name: &str) -> Result<LibraryInfo> {
        self.locate_library(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_dir() {
        let info = LibraryInfo {
            origin: PathBuf::from("/site-packages/requests/__init__.py"),
            version: Some("2.31.0".to_string()),
        };
        assert_eq!(info.package_dir(), Some(Path::new("/site-packages/requests")));

        let compiled = LibraryInfo {
            origin: PathBuf::from("/site-packages/fast/__init__.cpython-312-x86_64-linux-gnu.so"),
            version: None,
        };
        assert_eq!(compiled.package_dir(), Some(Path::new("/site-packages/fast")));

        let single = LibraryInfo {
            origin: PathBuf::from("/site-packages/six.py"),
            version: None,
        };
        assert_eq!(single.package_dir(), None);
    }

    #[test]
    fn test_library_info_json() {
        let info: Option<LibraryInfo> =
            serde_json::from_str(r#"{"origin": "/x/pkg/__init__.py", "version": null}"#).unwrap();
        assert_eq!(info.unwrap().origin, PathBuf::from("/x/pkg/__init__.py"));

        let none: Option<LibraryInfo> = serde_json::from_str("null").unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_missing_interpreter() {
        let err = PythonToolchain::with_interpreter("/definitely/not/a/python").unwrap_err();
        assert!(matches!(err, Error::Toolchain(_)));
    }
}
