//! Terminal rendering of pipeline progress.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use pyxforge_core::{BuildReporter, BuildResult, SourceUnit, TransformFailure};

use crate::colors;

/// Prints pipeline events as they happen.
#[derive(Default)]
pub struct TerminalReporter {
    transformed: AtomicUsize,
    failed: AtomicUsize,
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Units transformed so far.
    pub fn transformed(&self) -> usize {
        self.transformed.load(Ordering::Relaxed)
    }

    /// Units that failed to transform so far.
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }
}

impl BuildReporter for TerminalReporter {
    fn on_scan_complete(&self, root: &Path, units: usize) {
        println!(
            "{}  ◆ Scanned{} {} ({} files)",
            colors::BLUE,
            colors::RESET,
            root.display(),
            units
        );
    }

    fn on_unit_transformed(&self, _unit: &SourceUnit) {
        self.transformed.fetch_add(1, Ordering::Relaxed);
    }

    fn on_unit_failed(&self, failure: &TransformFailure) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        eprintln!(
            "{}  ✗ {}{}: {}",
            colors::RED,
            failure.source.relative.display(),
            colors::RESET,
            failure.message
        );
    }

    fn on_missing_modules(&self, modules: &BTreeSet<String>) {
        println!(
            "{}  ⚠ Missing modules:{} {}",
            colors::YELLOW,
            colors::RESET,
            modules.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }

    fn on_shadow_renamed(&self, old: &str, new: &str) {
        println!(
            "{}  ↻ Renamed shadowing package{} {} → {}",
            colors::CYAN,
            colors::RESET,
            old,
            new
        );
    }

    fn on_compile_started(&self, descriptors: usize, workers: usize) {
        colors::step(&format!(
            "Compiling {descriptors} extensions on {workers} workers"
        ));
    }

    fn on_compile_finished(&self, result: &BuildResult) {
        if result.is_success() {
            colors::done(&format!("{} artifacts", result.artifacts().len()));
        } else if result.descriptors > 0 {
            println!("{}✗{}", colors::RED, colors::RESET);
        }
    }

    fn on_step(&self, message: &str) {
        println!("{}  ◆ {}{}", colors::BLUE, message, colors::RESET);
    }
}
