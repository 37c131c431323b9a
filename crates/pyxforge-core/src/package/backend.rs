//! Packaging backend interface and the wheel/pip implementation.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Output;

use super::manifest::{PYPROJECT_FILE, PackageManifest};
use crate::compile::PythonToolchain;
use crate::error::{Error, Result};

/// Directory wheels are written to, inside the tree root.
pub const DIST_DIR: &str = "dist";

/// Produces and installs an installable unit from a built tree.
pub trait PackagingBackend {
    /// Package the tree at `tree_root` described by `manifest`.
    ///
    /// Returns the path of the installable unit.
    fn package(&self, manifest: &PackageManifest, tree_root: &Path) -> Result<PathBuf>;

    /// Install a unit produced by [`PackagingBackend::package`].
    fn install(&self, unit: &Path) -> Result<()>;
}

/// Builds a wheel with `python -m build` and installs it with pip.
pub struct WheelBackend {
    toolchain: PythonToolchain,
}

impl WheelBackend {
    pub fn new(toolchain: PythonToolchain) -> Self {
        Self { toolchain }
    }
}

impl PackagingBackend for WheelBackend {
    fn package(&self, manifest: &PackageManifest, tree_root: &Path) -> Result<PathBuf> {
        fs::write(tree_root.join(PYPROJECT_FILE), manifest.to_pyproject())?;

        let dist = tree_root.join(DIST_DIR);
        let dist_arg = dist.to_string_lossy().into_owned();
        tracing::info!(
            name = %manifest.name,
            version = %manifest.version,
            tree = %tree_root.display(),
            "Building wheel"
        );

        let output = self
            .toolchain
            .run_module("build", &["--wheel", "--outdir", &dist_arg], tree_root)
            .map_err(|e| Error::Packaging(e.to_string()))?;
        check(&output).map_err(Error::Packaging)?;

        latest_wheel(&dist)?.ok_or_else(|| {
            Error::Packaging(format!("no wheel found in {}", dist.display()))
        })
    }

    fn install(&self, unit: &Path) -> Result<()> {
        let unit_arg = unit.to_string_lossy().into_owned();
        let cwd = unit.parent().unwrap_or(Path::new("."));
        tracing::info!(wheel = %unit.display(), "Installing wheel");

        let output = self
            .toolchain
            .run_module("pip", &["install", "--upgrade", &unit_arg], cwd)
            .map_err(|e| Error::Install(e.to_string()))?;
        check(&output).map_err(Error::Install)
    }
}

/// The most recently modified `*.whl` in `dist`, if any.
pub fn latest_wheel(dist: &Path) -> Result<Option<PathBuf>> {
    if !dist.is_dir() {
        return Ok(None);
    }

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    for entry in fs::read_dir(dist)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("whl") {
            continue;
        }
        let modified = entry.metadata()?.modified()?;
        // Ties go to the later name so the pick is deterministic.
        let newer = match &newest {
            Some((time, best)) => modified > *time || (modified == *time && path > *best),
            None => true,
        };
        if newer {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

fn check(output: &Output) -> std::result::Result<(), String> {
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    Err(format!("exited with {}: {}", output.status, stderr.trim()))
}
