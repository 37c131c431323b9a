//! Progress reporting for a build invocation.
//!
//! A reporter is created by the caller and passed into each component, so
//! its lifetime is one invocation. Presentation (colors, progress bars)
//! lives in implementations outside this crate.

use std::collections::BTreeSet;
use std::path::Path;

use crate::compile::BuildResult;
use crate::scan::SourceUnit;
use crate::transform::TransformFailure;

/// Callback interface for pipeline progress.
///
/// Methods may be called from transformation worker threads.
pub trait BuildReporter: Send + Sync {
    /// Called once scanning finished with the number of eligible files.
    fn on_scan_complete(&self, _root: &Path, _units: usize) {}

    /// Called after a unit was transformed.
    fn on_unit_transformed(&self, _unit: &SourceUnit) {}

    /// Called when a unit could not be transformed.
    fn on_unit_failed(&self, _failure: &TransformFailure) {}

    /// Called once with every module that could not be resolved.
    fn on_missing_modules(&self, _modules: &BTreeSet<String>) {}

    /// Called when a shadowing package was renamed.
    fn on_shadow_renamed(&self, _old: &str, _new: &str) {}

    /// Called before the compiler backend is invoked.
    fn on_compile_started(&self, _descriptors: usize, _workers: usize) {}

    /// Called after the compiler backend returned.
    fn on_compile_finished(&self, _result: &BuildResult) {}

    /// Called for coarse pipeline steps (copying, packaging, installing).
    fn on_step(&self, _message: &str) {}
}

/// Reporter that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl BuildReporter for NullReporter {}
