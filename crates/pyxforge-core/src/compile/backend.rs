//! Compiler backend interface and the Cython/setuptools implementation.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use super::directives::DirectiveProfile;
use super::toolchain::PythonToolchain;
use crate::error::{Error, Result};
use crate::paths::is_extension_artifact;

/// One extension module to build.
///
/// References its sources by path relative to the build root; it owns no
/// files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionDescriptor {
    /// Dotted module name, e.g. `pkg.sub.mod`.
    pub name: String,

    /// Intermediate sources, relative to the build root.
    pub sources: Vec<PathBuf>,

    pub extra_compile_args: Vec<String>,

    pub extra_link_args: Vec<String>,
}

/// Everything a backend needs for one build.
#[derive(Debug, Clone, Serialize)]
pub struct CompileRequest {
    pub descriptors: Vec<ExtensionDescriptor>,

    pub directives: DirectiveProfile,

    /// Stable cache directory, reused across runs.
    pub cache_dir: PathBuf,

    /// Scratch directory for object files.
    pub scratch_dir: PathBuf,

    /// Requested compile parallelism.
    pub workers: usize,

    /// Directory sources are relative to; artifacts are placed in it.
    pub build_root: PathBuf,
}

/// Turns extension descriptors into compiled artifacts.
///
/// A single blocking call; any internal parallelism is the backend's own.
pub trait CompilerBackend {
    /// Build every descriptor in place under `request.build_root`.
    ///
    /// Returns the produced artifacts, or [`Error::Build`] on failure.
    fn compile(&self, request: &CompileRequest) -> Result<Vec<PathBuf>>;
}

/// File name of the serialized request inside the build root.
pub const REQUEST_FILE: &str = "pyxforge_build.json";

/// File name of the generated setup script inside the build root.
pub const SETUP_FILE: &str = "pyxforge_setup.py";

const SETUP_SCRIPT: &str = r#"# Generated by pyxforge. Builds the extensions described in the JSON request.
import json
import sys

from Cython.Build import cythonize
from setuptools import Extension, setup

with open(sys.argv[1], encoding="utf-8") as f:
    request = json.load(f)

extensions = [
    Extension(
        d["name"],
        d["sources"],
        extra_compile_args=d["extra_compile_args"],
        extra_link_args=d["extra_link_args"],
    )
    for d in request["descriptors"]
]

ext_modules = cythonize(
    extensions,
    compiler_directives=request["directives"],
    build_dir=request["cache_dir"],
    cache=True,
    nthreads=request["workers"],
)

setup(
    name="pyxforge-build",
    script_args=[
        "build_ext",
        "--inplace",
        "--build-temp",
        request["scratch_dir"],
        "--parallel",
        str(request["workers"]),
    ],
    ext_modules=ext_modules,
)
"#;

/// Backend that drives Cython and setuptools through the Python toolchain.
pub struct CythonBackend {
    toolchain: PythonToolchain,
}

impl CythonBackend {
    pub fn new(toolchain: PythonToolchain) -> Self {
        Self { toolchain }
    }

    fn write_inputs(&self, request: &CompileRequest) -> Result<(PathBuf, PathBuf)> {
        let request_path = request.build_root.join(REQUEST_FILE);
        let setup_path = request.build_root.join(SETUP_FILE);
        fs::write(&request_path, serde_json::to_string_pretty(request)?)?;
        fs::write(&setup_path, SETUP_SCRIPT)?;
        Ok((request_path, setup_path))
    }
}

impl CompilerBackend for CythonBackend {
    fn compile(&self, request: &CompileRequest) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&request.cache_dir)?;
        fs::create_dir_all(&request.scratch_dir)?;
        let (request_path, setup_path) = self.write_inputs(request)?;

        tracing::info!(
            python = %self.toolchain.python().display(),
            extensions = request.descriptors.len(),
            workers = request.workers,
            "Running Cython build"
        );

        let output = self
            .toolchain
            .command()
            .arg(SETUP_FILE)
            .arg(REQUEST_FILE)
            .current_dir(&request.build_root)
            .output()
            .map_err(|e| {
                Error::Build(format!(
                    "failed to run {} (working dir: {}): {e}",
                    self.toolchain.python().display(),
                    request.build_root.display()
                ))
            });

        // The generated inputs must not end up in a packaged tree.
        remove_generated(&[request_path.as_path(), setup_path.as_path()]);

        let output = output?;
        tracing::debug!(stdout = %String::from_utf8_lossy(&output.stdout), "Cython build output");

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Build(format!(
                "compiler exited with {} for {}:\n{}",
                output.status,
                request.build_root.display(),
                tail(&stderr, 40)
            )));
        }

        Ok(collect_artifacts(&request.build_root))
    }
}

/// Compiled extension files under `root`.
pub fn collect_artifacts(root: &Path) -> Vec<PathBuf> {
    let mut artifacts: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file() && is_extension_artifact(e.path()))
        .map(|e| e.into_path())
        .collect();
    artifacts.sort();
    artifacts
}

/// Delete generated build inputs, logging the ones that cannot be removed.
fn remove_generated(paths: &[&Path]) -> usize {
    let mut removed = 0;
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => tracing::warn!(
                file = %path.display(),
                error = %e,
                "Could not remove generated build input"
            ),
        }
    }
    removed
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_request_serialization() {
        let request = CompileRequest {
            descriptors: vec![ExtensionDescriptor {
                name: "pkg.a".to_string(),
                sources: vec![PathBuf::from("pkg/a.pyx")],
                extra_compile_args: vec!["-O3".to_string()],
                extra_link_args: vec![],
            }],
            directives: DirectiveProfile::aggressive(),
            cache_dir: PathBuf::from("/work/cython_cache"),
            scratch_dir: PathBuf::from("/work/build"),
            workers: 4,
            build_root: PathBuf::from("/work/out"),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["descriptors"][0]["name"], "pkg.a");
        assert_eq!(json["descriptors"][0]["sources"][0], "pkg/a.pyx");
        assert_eq!(json["directives"]["boundscheck"], false);
        assert_eq!(json["cache_dir"], "/work/cython_cache");
        assert_eq!(json["workers"], 4);
    }

    #[test]
    fn test_collect_artifacts() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("pkg")).unwrap();
        fs::write(temp.path().join("pkg/a.cpython-312-x86_64-linux-gnu.so"), "").unwrap();
        fs::write(temp.path().join("pkg/a.pyx"), "").unwrap();
        fs::write(temp.path().join("b.pyd"), "").unwrap();

        let artifacts = collect_artifacts(temp.path());

        assert_eq!(artifacts.len(), 2);
        assert!(artifacts.iter().all(|a| is_extension_artifact(a)));
    }

    #[test]
    fn test_remove_generated_tolerates_missing_inputs() {
        let temp = TempDir::new().unwrap();
        let request = temp.path().join(REQUEST_FILE);
        let setup = temp.path().join(SETUP_FILE);
        fs::write(&request, "{}").unwrap();

        assert_eq!(remove_generated(&[request.as_path(), setup.as_path()]), 1);
        assert!(!request.exists());
    }

    #[test]
    fn test_tail() {
        assert_eq!(tail("a\nb\nc\nd", 2), "c\nd");
        assert_eq!(tail("a", 5), "a");
    }

    #[test]
    fn test_setup_script_builds_in_place() {
        assert!(SETUP_SCRIPT.contains("\"--inplace\""));
        assert!(SETUP_SCRIPT.contains("cache=True"));
        assert!(SETUP_SCRIPT.contains("build_dir=request[\"cache_dir\"]"));
    }
}
