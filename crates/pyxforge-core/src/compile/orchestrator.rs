//! Build orchestration.
//!
//! Groups transformed units into extension descriptors, applies the fixed
//! directive profile and optimization flags, and runs the compiler backend
//! with a stable cache directory.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use super::backend::{CompileRequest, CompilerBackend, ExtensionDescriptor};
use super::directives::{DirectiveProfile, OptimizationFlags};
use crate::error::{Error, Result};
use crate::paths::BuildDirs;
use crate::report::BuildReporter;
use crate::transform::{TransformFailure, TransformedUnit, available_workers};

/// Where and how wide a build runs.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Output root holding the intermediate files; artifacts land here.
    pub build_root: PathBuf,

    /// Stable cache directory.
    pub cache_dir: PathBuf,

    /// Scratch directory for object files.
    pub scratch_dir: PathBuf,

    /// Compile parallelism requested from the backend.
    pub workers: usize,
}

impl BuildOptions {
    /// Options derived from a directory layout, using every logical processor.
    pub fn from_dirs(dirs: &BuildDirs) -> Self {
        Self {
            build_root: dirs.output_dir.clone(),
            cache_dir: dirs.cache_dir.clone(),
            scratch_dir: dirs.scratch_dir(),
            workers: available_workers(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }
}

/// Outcome of the backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    /// Build succeeded, producing these artifacts.
    Succeeded { artifacts: Vec<PathBuf> },

    /// Backend reported failure.
    Failed { message: String },
}

/// Aggregate result of a build invocation.
///
/// Diagnostics (missing modules, per-file failures) are kept whether or not
/// the build succeeded.
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub status: BuildStatus,

    /// Number of extension descriptors handed to the backend.
    pub descriptors: usize,

    /// Union of unresolved imports across all units.
    pub missing_modules: BTreeSet<String>,

    /// Units that could not be transformed.
    pub transform_failures: Vec<TransformFailure>,
}

impl BuildResult {
    pub fn is_success(&self) -> bool {
        matches!(self.status, BuildStatus::Succeeded { .. })
    }

    /// Produced artifacts; empty on failure.
    pub fn artifacts(&self) -> &[PathBuf] {
        match &self.status {
            BuildStatus::Succeeded { artifacts } => artifacts,
            BuildStatus::Failed { .. } => &[],
        }
    }

    /// Turn a failed build into [`Error::Build`].
    pub fn into_result(self) -> Result<Self> {
        match &self.status {
            BuildStatus::Succeeded { .. } => Ok(self),
            BuildStatus::Failed { message } => Err(Error::Build(message.clone())),
        }
    }
}

/// Turns transformed units into a compiler job.
pub struct BuildOrchestrator<B> {
    backend: B,
    directives: DirectiveProfile,
    flags: OptimizationFlags,
}

impl<B: CompilerBackend> BuildOrchestrator<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            directives: DirectiveProfile::aggressive(),
            flags: OptimizationFlags::native(),
        }
    }

    /// One descriptor per unit, named after its path relative to `build_root`.
    pub fn descriptors(&self, units: &[TransformedUnit], build_root: &Path) -> Vec<ExtensionDescriptor> {
        units
            .iter()
            .map(|unit| {
                let relative = unit
                    .destination
                    .strip_prefix(build_root)
                    .unwrap_or(&unit.destination)
                    .to_path_buf();
                ExtensionDescriptor {
                    name: module_name(&relative),
                    sources: vec![relative],
                    extra_compile_args: self.flags.compile_args.clone(),
                    extra_link_args: self.flags.link_args.clone(),
                }
            })
            .collect()
    }

    /// Compile `units`. Backend failure is captured in the result, alongside
    /// the units that never made it through transformation.
    pub fn build(
        &self,
        units: &[TransformedUnit],
        transform_failures: Vec<TransformFailure>,
        options: &BuildOptions,
        reporter: &dyn BuildReporter,
    ) -> BuildResult {
        let missing_modules: BTreeSet<String> = units
            .iter()
            .flat_map(|u| u.missing_modules.iter().cloned())
            .collect();

        let descriptors = self.descriptors(units, &options.build_root);
        let count = descriptors.len();

        let status = if descriptors.is_empty() {
            tracing::info!("No units to compile");
            BuildStatus::Succeeded {
                artifacts: Vec::new(),
            }
        } else {
            reporter.on_compile_started(count, options.workers);
            let request = CompileRequest {
                descriptors,
                directives: self.directives.clone(),
                cache_dir: options.cache_dir.clone(),
                scratch_dir: options.scratch_dir.clone(),
                workers: options.workers,
                build_root: options.build_root.clone(),
            };

            match self.backend.compile(&request) {
                Ok(artifacts) => {
                    tracing::info!(artifacts = artifacts.len(), "Compilation complete");
                    BuildStatus::Succeeded { artifacts }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Compilation failed");
                    BuildStatus::Failed {
                        message: match e {
                            Error::Build(message) => message,
                            other => other.to_string(),
                        },
                    }
                }
            }
        };

        let result = BuildResult {
            status,
            descriptors: count,
            missing_modules,
            transform_failures,
        };
        reporter.on_compile_finished(&result);
        result
    }
}

/// Dotted module name of an intermediate file path (`pkg/a.pyx` → `pkg.a`).
pub fn module_name(relative: &Path) -> String {
    relative
        .with_extension("")
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::NullReporter;
    use crate::scan::SourceUnit;
    use std::cell::RefCell;

    struct FakeBackend {
        fail: bool,
        seen: RefCell<Option<CompileRequest>>,
    }

    impl FakeBackend {
        fn new(fail: bool) -> Self {
            Self {
                fail,
                seen: RefCell::new(None),
            }
        }
    }

    impl CompilerBackend for FakeBackend {
        fn compile(&self, request: &CompileRequest) -> Result<Vec<PathBuf>> {
            *self.seen.borrow_mut() = Some(request.clone());
            if self.fail {
                Err(Error::Build("gcc: error: boom".to_string()))
            } else {
                Ok(request
                    .descriptors
                    .iter()
                    .map(|d| request.build_root.join(d.sources[0].with_extension("so")))
                    .collect())
            }
        }
    }

    fn unit(root: &Path, rel: &str, missing: &[&str]) -> TransformedUnit {
        TransformedUnit {
            source: SourceUnit {
                path: PathBuf::from("/src").join(rel),
                relative: PathBuf::from(rel),
            },
            destination: root.join(rel).with_extension("pyx"),
            missing_modules: missing.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn options(root: &Path) -> BuildOptions {
        BuildOptions {
            build_root: root.to_path_buf(),
            cache_dir: PathBuf::from("/work/cython_cache"),
            scratch_dir: PathBuf::from("/work/build"),
            workers: 3,
        }
    }

    #[test]
    fn test_every_unit_has_one_descriptor() {
        let root = PathBuf::from("/work/out");
        let units = vec![
            unit(&root, "a.py", &[]),
            unit(&root, "pkg/b.py", &[]),
            unit(&root, "pkg/sub/c.py", &[]),
        ];
        let orchestrator = BuildOrchestrator::new(FakeBackend::new(false));

        let descriptors = orchestrator.descriptors(&units, &root);

        let names: Vec<_> = descriptors.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["a", "pkg.b", "pkg.sub.c"]);
        for (d, u) in descriptors.iter().zip(&units) {
            assert_eq!(d.sources.len(), 1);
            assert_eq!(root.join(&d.sources[0]), u.destination);
        }
    }

    #[test]
    fn test_request_uses_profile_cache_and_workers() {
        let root = PathBuf::from("/work/out");
        let orchestrator = BuildOrchestrator::new(FakeBackend::new(false));

        let result = orchestrator.build(&[unit(&root, "a.py", &[])], Vec::new(), &options(&root), &NullReporter);

        assert!(result.is_success());
        assert_eq!(result.artifacts(), &[PathBuf::from("/work/out/a.so")]);
        let seen = orchestrator.backend.seen.borrow();
        let request = seen.as_ref().unwrap();
        assert_eq!(request.cache_dir, PathBuf::from("/work/cython_cache"));
        assert_eq!(request.workers, 3);
        assert_eq!(request.directives, DirectiveProfile::aggressive());
        assert_eq!(request.descriptors[0].extra_compile_args, OptimizationFlags::native().compile_args);
    }

    #[test]
    fn test_failure_keeps_diagnostics() {
        let root = PathBuf::from("/work/out");
        let units = vec![unit(&root, "a.py", &["numpy"]), unit(&root, "b.py", &["scipy", "numpy"])];
        let orchestrator = BuildOrchestrator::new(FakeBackend::new(true));

        let result = orchestrator.build(&units, Vec::new(), &options(&root), &NullReporter);

        assert!(!result.is_success());
        assert!(result.artifacts().is_empty());
        assert_eq!(
            result.missing_modules,
            BTreeSet::from(["numpy".to_string(), "scipy".to_string()])
        );
        assert_eq!(
            result.status,
            BuildStatus::Failed {
                message: "gcc: error: boom".to_string()
            }
        );
        assert!(matches!(result.into_result(), Err(Error::Build(_))));
    }

    #[test]
    fn test_empty_build_skips_backend() {
        let root = PathBuf::from("/work/out");
        let orchestrator = BuildOrchestrator::new(FakeBackend::new(true));

        let result = orchestrator.build(&[], Vec::new(), &options(&root), &NullReporter);

        assert!(result.is_success());
        assert!(orchestrator.backend.seen.borrow().is_none());
    }

    #[derive(Default)]
    struct FinishedReporter {
        failures: std::sync::Mutex<Option<usize>>,
    }

    impl BuildReporter for FinishedReporter {
        fn on_compile_finished(&self, result: &BuildResult) {
            *self.failures.lock().unwrap() = Some(result.transform_failures.len());
        }
    }

    #[test]
    fn test_reporter_sees_transform_failures() {
        let root = PathBuf::from("/work/out");
        let failure = TransformFailure {
            source: SourceUnit {
                path: PathBuf::from("/src/bad.py"),
                relative: PathBuf::from("bad.py"),
            },
            message: "cannot read /src/bad.py: invalid UTF-8".to_string(),
        };
        let orchestrator = BuildOrchestrator::new(FakeBackend::new(false));
        let reporter = FinishedReporter::default();

        let result = orchestrator.build(&[unit(&root, "a.py", &[])], vec![failure], &options(&root), &reporter);

        assert_eq!(*reporter.failures.lock().unwrap(), Some(1));
        assert_eq!(result.transform_failures.len(), 1);
    }

    #[test]
    fn test_module_name() {
        assert_eq!(module_name(Path::new("pkg/sub/mod.pyx")), "pkg.sub.mod");
        assert_eq!(module_name(Path::new("top.pyx")), "top");
    }
}
