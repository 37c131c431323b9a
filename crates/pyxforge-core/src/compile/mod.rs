//! Compilation of transformed units into native extension modules.
//!
//! This module provides:
//! - The fixed directive profile and native optimization flags
//! - Python toolchain discovery and probes
//! - The compiler backend interface and its Cython/setuptools implementation
//! - The build orchestrator that turns transformed units into one compiler job
//!
//! # Architecture
//!
//! ```text
//! [TransformedUnit]
//!     │
//!     └── BuildOrchestrator ──► [ExtensionDescriptor] + DirectiveProfile
//!                                   │
//!                                   └── CompilerBackend (cython + setuptools, in place)
//!                                             │
//!                                             └── out/**/<mod>.so, cache in cython_cache/
//! ```

mod backend;
mod directives;
mod orchestrator;
mod toolchain;

pub use backend::{
    CompileRequest, CompilerBackend, CythonBackend, ExtensionDescriptor, REQUEST_FILE, SETUP_FILE,
    collect_artifacts,
};
pub use directives::{DirectiveProfile, OptimizationFlags};
pub use orchestrator::{BuildOptions, BuildOrchestrator, BuildResult, BuildStatus, module_name};
pub use toolchain::{LibraryInfo, LibraryLocator, PYTHON_ENV, PythonToolchain};
