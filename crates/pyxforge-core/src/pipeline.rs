//! End-to-end pipeline for one invocation.
//!
//! Wires the components together for each mode:
//!
//! - **build**: purge output → scan → parallel transform → compile in place
//! - **build + install**: build → prepare manifest → package → install
//! - **library**: locate → copy to staging → resolve shadowing → build →
//!   package with the library's version → install → remove staging
//!
//! Cleaning needs no backend and lives on [`BuildDirs::clean`].
//!
//! Backends and the module resolver are injected, so every mode runs
//! against fakes in tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use crate::compile::{
    BuildOptions, BuildOrchestrator, BuildResult, CompilerBackend, CythonBackend, LibraryLocator,
    PythonToolchain,
};
use crate::error::{Error, Result};
use crate::package::{
    DEFAULT_VERSION, PackagingBackend, WheelBackend, is_package_dir, prepare_package,
};
use crate::paths::{BuildDirs, DEFAULT_OUTPUT_DIR, purge_dir};
use crate::report::BuildReporter;
use crate::scan::SourceScanner;
use crate::shadow::ShadowResolver;
use crate::transform::{
    FileTransformer, ModuleResolver, ParallelTransformer, PythonResolver, SourceTreeResolver,
    TransformOptions, available_workers,
};

/// Directories never copied into a staging tree.
const SKIPPED_DIRS: [&str; 2] = ["__pycache__", ".git"];

/// Knobs for one invocation.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub transform: TransformOptions,

    /// Transformation pool size and requested compile parallelism.
    pub workers: usize,

    /// Version for packages built from a source tree.
    pub package_version: String,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            transform: TransformOptions::default(),
            workers: available_workers(),
            package_version: DEFAULT_VERSION.to_string(),
        }
    }
}

/// A build that was packaged and installed.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    pub build: BuildResult,

    /// The installed wheel.
    pub wheel: PathBuf,

    /// Version the package was built with.
    pub version: String,
}

/// Runs the pipeline modes against injected backends.
pub struct Pipeline<C, P> {
    dirs: BuildDirs,
    options: PipelineOptions,
    orchestrator: BuildOrchestrator<C>,
    packager: P,
    resolver: Arc<dyn ModuleResolver>,
}

impl Pipeline<CythonBackend, WheelBackend> {
    /// Pipeline backed by the given interpreter for every external step.
    pub fn with_toolchain(dirs: BuildDirs, options: PipelineOptions, toolchain: PythonToolchain) -> Self {
        let resolver = Arc::new(PythonResolver::new(toolchain.clone()));
        Self::new(
            dirs,
            options,
            CythonBackend::new(toolchain.clone()),
            WheelBackend::new(toolchain),
            resolver,
        )
    }
}

impl<C: CompilerBackend, P: PackagingBackend> Pipeline<C, P> {
    pub fn new(
        dirs: BuildDirs,
        options: PipelineOptions,
        compiler: C,
        packager: P,
        resolver: Arc<dyn ModuleResolver>,
    ) -> Self {
        Self {
            dirs,
            options,
            orchestrator: BuildOrchestrator::new(compiler),
            packager,
            resolver,
        }
    }

    /// Build `target` into the output root.
    ///
    /// # Errors
    ///
    /// [`Error::Scan`] for a bad target and [`Error::Build`] when the
    /// compiler fails. Diagnostics are handed to the reporter first.
    pub fn build(&self, target: &Path, reporter: &dyn BuildReporter) -> Result<BuildResult> {
        self.build_tree(target, &self.dirs.output_dir, reporter)
    }

    /// Build `target`, then package the output root and install it.
    ///
    /// The package is named after `name`, or the target directory.
    pub fn build_and_install(
        &self,
        target: &Path,
        name: Option<&str>,
        reporter: &dyn BuildReporter,
    ) -> Result<InstallOutcome> {
        let build = self.build(target, reporter)?;
        let name = match name {
            Some(name) => name.to_string(),
            None => tree_name(target)?,
        };
        let version = self.options.package_version.clone();
        let wheel = self.package_and_install(&self.dirs.output_dir, &name, &version, reporter)?;

        Ok(InstallOutcome {
            build,
            wheel,
            version,
        })
    }

    /// Compile an installed library and reinstall it.
    ///
    /// Works on a copy in the staging directory; the installed sources are
    /// never modified. Staging is removed once the wheel is installed and
    /// kept for inspection when a step fails.
    pub fn build_library(
        &self,
        locator: &dyn LibraryLocator,
        name: &str,
        reporter: &dyn BuildReporter,
    ) -> Result<InstallOutcome> {
        let info = locator.locate(name)?;
        let package_dir = info.package_dir().ok_or_else(|| {
            Error::InvalidOperation(format!(
                "{name} is a single-file module ({}); only packages can be compiled",
                info.origin.display()
            ))
        })?;

        let staging = self.dirs.staging_dir(name);
        purge_dir(&staging, package_dir)?;

        let copy = staging.join(name);
        reporter.on_step(&format!("Copying {name} from {}", package_dir.display()));
        copy_tree(package_dir, &copy, |path| !has_extension(path, &["pyc"]))?;

        let shadow = ShadowResolver::new().resolve(&copy)?;
        for (old, new) in &shadow.renames {
            reporter.on_shadow_renamed(old, new);
        }
        for failure in &shadow.failures {
            tracing::warn!(
                file = %failure.path.display(),
                error = %failure.message,
                "Could not rewrite shadowed imports"
            );
        }

        let output = staging.join(DEFAULT_OUTPUT_DIR);
        let build = self.build_tree(&copy, &output, reporter)?;

        // Carry data files and prebuilt extensions next to the compiled modules.
        let units_root = unit_root(&copy, &output)?;
        copy_tree(&copy, &units_root, |path| !has_extension(path, &["py", "pyc"]))?;
        ship_uncompiled(&build, &units_root)?;

        let version = info
            .version
            .clone()
            .unwrap_or_else(|| self.options.package_version.clone());
        let wheel = self.package_and_install(&output, name, &version, reporter)?;

        fs::remove_dir_all(&staging)?;
        tracing::info!(library = name, version = %version, "Library compiled and reinstalled");

        Ok(InstallOutcome {
            build,
            wheel,
            version,
        })
    }

    fn build_tree(&self, target: &Path, output: &Path, reporter: &dyn BuildReporter) -> Result<BuildResult> {
        let root = SourceScanner::validate_root(target)?;
        purge_dir(output, &root)?;
        self.dirs.ensure_cache()?;

        let units = SourceScanner::new().scan(&root)?;
        reporter.on_scan_complete(&root, units.len());

        let mirror_root = unit_root(&root, output)?;

        let resolver: Arc<dyn ModuleResolver> =
            Arc::new(SourceTreeResolver::new(&root, Arc::clone(&self.resolver)));
        let transformer = FileTransformer::new(&mirror_root, self.options.transform, resolver);
        let report =
            ParallelTransformer::with_workers(transformer, self.options.workers).run(&units, reporter)?;

        let options = BuildOptions {
            build_root: output.to_path_buf(),
            cache_dir: self.dirs.cache_dir.clone(),
            scratch_dir: self.dirs.scratch_dir(),
            workers: self.options.workers,
        };
        let result = self
            .orchestrator
            .build(&report.units, report.failures, &options, reporter);

        if !result.missing_modules.is_empty() {
            reporter.on_missing_modules(&result.missing_modules);
        }
        result.into_result()
    }

    fn package_and_install(
        &self,
        tree: &Path,
        name: &str,
        version: &str,
        reporter: &dyn BuildReporter,
    ) -> Result<PathBuf> {
        reporter.on_step(&format!("Packaging {name} {version}"));
        let manifest = prepare_package(tree, name, version)?;
        let wheel = self.packager.package(&manifest, tree)?;

        reporter.on_step(&format!("Installing {}", wheel.display()));
        self.packager.install(&wheel)?;
        Ok(wheel)
    }
}

/// Where units of `root` are mirrored inside `output`.
///
/// A root that is itself a package keeps its name in the output, so module
/// names stay fully qualified.
fn unit_root(root: &Path, output: &Path) -> Result<PathBuf> {
    if is_package_dir(root) {
        Ok(output.join(tree_name(root)?))
    } else {
        Ok(output.to_path_buf())
    }
}

/// Place the sources of units that failed to transform, unchanged, where
/// their compiled modules would have gone, so the package stays complete.
fn ship_uncompiled(build: &BuildResult, units_root: &Path) -> Result<()> {
    for failure in &build.transform_failures {
        let dest = units_root.join(&failure.source.relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(&failure.source.path, &dest)?;
        tracing::warn!(
            file = %failure.source.relative.display(),
            "Shipping uncompiled source"
        );
    }
    Ok(())
}

/// Copy the files of `from` accepted by `keep` into `to`, skipping cache
/// directories. Existing files in `to` are left alone.
fn copy_tree(from: &Path, to: &Path, keep: impl Fn(&Path) -> bool) -> Result<()> {
    let walker = WalkDir::new(from).follow_links(false).into_iter().filter_entry(|e| {
        !(e.file_type().is_dir()
            && e.file_name()
                .to_str()
                .is_some_and(|n| SKIPPED_DIRS.contains(&n)))
    });

    for entry in walker {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        let Ok(relative) = entry.path().strip_prefix(from) else {
            continue;
        };
        let dest = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else if entry.file_type().is_file() && keep(entry.path()) && !dest.exists() {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| extensions.contains(&e))
}

fn tree_name(path: &Path) -> Result<String> {
    let resolved = path.canonicalize()?;
    resolved
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
        .ok_or_else(|| {
            Error::InvalidOperation(format!("cannot derive a package name from {}", path.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_copy_tree_skips_bytecode() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("lib");
        fs::create_dir_all(src.join("__pycache__")).unwrap();
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("__init__.py"), "").unwrap();
        fs::write(src.join("sub/mod.py"), "x = 1\n").unwrap();
        fs::write(src.join("sub/mod.pyc"), "").unwrap();
        fs::write(src.join("__pycache__/x.pyc"), "").unwrap();

        let dest = temp.path().join("copy");
        copy_tree(&src, &dest, |p| !has_extension(p, &["pyc"])).unwrap();

        assert!(dest.join("__init__.py").is_file());
        assert_eq!(fs::read_to_string(dest.join("sub/mod.py")).unwrap(), "x = 1\n");
        assert!(!dest.join("sub/mod.pyc").exists());
        assert!(!dest.join("__pycache__").exists());
    }

    #[test]
    fn test_copy_tree_keeps_existing_files() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("lib");
        let dest = temp.path().join("out");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(src.join("data.json"), "{}").unwrap();
        fs::write(src.join("mod.py"), "x = 1\n").unwrap();
        fs::write(src.join("fast.so"), "new").unwrap();
        fs::write(dest.join("fast.so"), "built").unwrap();

        copy_tree(&src, &dest, |p| !has_extension(p, &["py", "pyc"])).unwrap();

        assert!(dest.join("data.json").is_file());
        assert!(!dest.join("mod.py").exists());
        assert_eq!(fs::read_to_string(dest.join("fast.so")).unwrap(), "built");
    }

    #[test]
    fn test_unit_root_for_package_target() {
        let temp = TempDir::new().unwrap();
        let pkg = temp.path().join("mypkg");
        fs::create_dir_all(&pkg).unwrap();
        let out = temp.path().join("out");
        assert_eq!(unit_root(&pkg, &out).unwrap(), out);

        fs::write(pkg.join("__init__.py"), "").unwrap();
        assert_eq!(unit_root(&pkg, &out).unwrap(), out.join("mypkg"));
    }

    #[test]
    fn test_tree_name() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("mylib");
        fs::create_dir_all(&dir).unwrap();
        assert_eq!(tree_name(&dir).unwrap(), "mylib");
        assert_eq!(tree_name(&dir.join(".")).unwrap(), "mylib");
    }
}
