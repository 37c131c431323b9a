//! Package manifest derivation and `pyproject.toml` generation.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::paths::is_extension_artifact;

/// File name of the generated manifest inside the tree root.
pub const PYPROJECT_FILE: &str = "pyproject.toml";

/// Version used when the caller does not provide one.
pub const DEFAULT_VERSION: &str = "0.1.0";

/// Minimal description of an installable tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageManifest {
    /// Distribution name.
    pub name: String,

    /// Distribution version.
    pub version: String,

    /// Dotted names of every importable package, parents before children.
    pub packages: Vec<String>,
}

impl PackageManifest {
    /// Render as a setuptools `pyproject.toml`.
    ///
    /// Compiled extensions are declared as package data so the wheel
    /// carries them.
    pub fn to_pyproject(&self) -> String {
        let mut toml = String::new();

        toml.push_str("[build-system]\n");
        toml.push_str("requires = [\"setuptools>=61\", \"wheel\"]\n");
        toml.push_str("build-backend = \"setuptools.build_meta\"\n");
        toml.push('\n');

        toml.push_str("[project]\n");
        toml.push_str(&format!("name = \"{}\"\n", escape(&self.name)));
        toml.push_str(&format!("version = \"{}\"\n", escape(&self.version)));
        toml.push('\n');

        toml.push_str("[tool.setuptools]\n");
        let packages: Vec<_> = self
            .packages
            .iter()
            .map(|p| format!("\"{}\"", escape(p)))
            .collect();
        toml.push_str(&format!("packages = [{}]\n", packages.join(", ")));
        toml.push_str("include-package-data = true\n");
        toml.push('\n');

        toml.push_str("[tool.setuptools.package-data]\n");
        toml.push_str("\"*\" = [\"*.so\", \"*.pyd\"]\n");

        toml
    }
}

/// Derive the manifest for the tree at `tree_root`.
///
/// A directory is a package when it holds an `__init__` module in source,
/// intermediate or compiled form and every directory between it and
/// `tree_root` is a package too.
///
/// # Errors
///
/// Returns [`Error::Packaging`] if the tree holds no importable package.
pub fn prepare_package(tree_root: &Path, name: &str, version: &str) -> Result<PackageManifest> {
    let packages = discover_packages(tree_root);
    if packages.is_empty() {
        return Err(Error::Packaging(format!(
            "no importable package under {}",
            tree_root.display()
        )));
    }

    tracing::debug!(name, version, packages = packages.len(), "Package manifest prepared");
    Ok(PackageManifest {
        name: name.to_string(),
        version: version.to_string(),
        packages,
    })
}

/// Dotted names of the importable packages under `root`, sorted.
pub fn discover_packages(root: &Path) -> Vec<String> {
    let mut packages = Vec::new();

    let mut walker = WalkDir::new(root).min_depth(1).sort_by_file_name().into_iter();
    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_dir() {
            continue;
        }
        if !is_package_dir(entry.path()) {
            // Nothing below a non-package is importable as a subpackage.
            walker.skip_current_dir();
            continue;
        }
        if let Some(name) = dotted_name(root, entry.path()) {
            packages.push(name);
        }
    }

    packages.sort();
    packages
}

/// Whether `dir` holds an `__init__` module.
pub fn is_package_dir(dir: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return false;
    };
    entries.filter_map(|e| e.ok()).any(|e| {
        let path: PathBuf = e.path();
        let is_init = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("__init__."));
        is_init
            && (matches!(
                path.extension().and_then(|x| x.to_str()),
                Some("py" | "pyx")
            ) || is_extension_artifact(&path))
    })
}

fn dotted_name(root: &Path, dir: &Path) -> Option<String> {
    let relative = dir.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("."))
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    #[test]
    fn test_discovers_nested_packages() {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        touch(root, "lib/__init__.pyx");
        touch(root, "lib/core/__init__.cpython-312-x86_64-linux-gnu.so");
        touch(root, "lib/core/fast.so");
        touch(root, "lib/data/readme.txt");
        touch(root, "lib/data/inner/__init__.py");
        touch(root, "loose/mod.py");

        assert_eq!(discover_packages(root), vec!["lib", "lib.core"]);
    }

    #[test]
    fn test_empty_tree_is_packaging_error() {
        let temp = TempDir::new().unwrap();
        touch(temp.path(), "a.so");

        let err = prepare_package(temp.path(), "demo", DEFAULT_VERSION).unwrap_err();
        assert!(matches!(err, Error::Packaging(_)));
    }

    #[test]
    fn test_pyproject_rendering() {
        let manifest = PackageManifest {
            name: "requests".to_string(),
            version: "2.31.0".to_string(),
            packages: vec!["requests".to_string(), "requests.json_pyx".to_string()],
        };

        let toml = manifest.to_pyproject();

        assert!(toml.contains("build-backend = \"setuptools.build_meta\""));
        assert!(toml.contains("name = \"requests\"\nversion = \"2.31.0\"\n"));
        assert!(toml.contains("packages = [\"requests\", \"requests.json_pyx\"]"));
        assert!(toml.contains("\"*\" = [\"*.so\", \"*.pyd\"]"));
    }
}
