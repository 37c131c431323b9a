//! Core engine for pyxforge, the Python-to-native-extension compiler driver.
//!
//! This crate provides:
//! - Source discovery under ignore-file rules
//! - Parallel source transformation with advisory import analysis
//! - Standard-library shadow resolution for copied libraries
//! - Build orchestration over a Cython/setuptools backend
//! - Manifest derivation, wheel packaging and installation

pub mod compile;
pub mod error;
pub mod package;
pub mod paths;
pub mod pipeline;
pub mod report;
pub mod scan;
pub mod shadow;
pub mod transform;

pub use compile::{
    BuildOptions, BuildOrchestrator, BuildResult, BuildStatus, CompileRequest, CompilerBackend,
    CythonBackend, DirectiveProfile, ExtensionDescriptor, LibraryInfo, LibraryLocator,
    PythonToolchain,
};
pub use error::{Error, Result};
pub use package::{PackageManifest, PackagingBackend, WheelBackend, prepare_package};
pub use paths::BuildDirs;
pub use pipeline::{InstallOutcome, Pipeline, PipelineOptions};
pub use report::{BuildReporter, NullReporter};
pub use scan::{ExcludeMatcher, SourceScanner, SourceUnit};
pub use shadow::{ShadowOutcome, ShadowResolver};
pub use transform::{
    FileTransformer, ModuleResolver, ParallelTransformer, PythonResolver, Resolution,
    SourceTreeResolver, StaticResolver, TransformFailure, TransformOptions, TransformedUnit,
};
