//! Source transformation for the compiler.
//!
//! This module provides:
//! - The line transformer (marker header, optional annotations)
//! - Static import analysis against an injected [`ModuleResolver`]
//! - Per-file transformation into the intermediate format
//! - A bounded worker pool that transforms many units at once
//!
//! # Architecture
//!
//! ```text
//! SourceUnit ──► FileTransformer ──► out/<rel>.pyx
//!                    │
//!                    └── imported_modules ──► ModuleResolver ──► missing set
//!
//! [SourceUnit] ──► ParallelTransformer (rayon pool) ──► TransformReport
//! ```

mod annotate;
mod file;
mod imports;
mod parallel;

pub use annotate::{MARKER_HEADER, SourceTransform};
pub use file::{
    FileTransformer, INTERMEDIATE_EXTENSION, TransformFailure, TransformOptions, TransformedUnit,
};
pub use imports::{
    ModuleResolver, PythonResolver, Resolution, SourceTreeResolver, StaticResolver,
    imported_modules, missing_modules,
};
pub use parallel::{ParallelTransformer, TransformReport, available_workers};
