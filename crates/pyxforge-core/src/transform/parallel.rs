//! Parallel transformation of many units.
//!
//! Runs [`FileTransformer::transform`] on a fixed-size rayon pool. Workers
//! share nothing mutable: each returns its own outcome, and the missing
//! module sets are merged on the calling thread after the pool has joined.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use super::file::{FileTransformer, TransformFailure, TransformedUnit};
use crate::error::{Error, Result};
use crate::report::BuildReporter;
use crate::scan::SourceUnit;

/// Number of logical processors, at least 1.
pub fn available_workers() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Aggregate outcome of transforming a batch of units.
#[derive(Debug, Default)]
pub struct TransformReport {
    /// Successfully transformed units, in submission order.
    pub units: Vec<TransformedUnit>,

    /// Units that could not be read or written.
    pub failures: Vec<TransformFailure>,

    /// Union of every unit's missing modules.
    pub missing_modules: BTreeSet<String>,
}

impl TransformReport {
    /// True when every unit was transformed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn merge(outcomes: Vec<std::result::Result<TransformedUnit, TransformFailure>>) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            match outcome {
                Ok(unit) => {
                    report
                        .missing_modules
                        .extend(unit.missing_modules.iter().cloned());
                    report.units.push(unit);
                }
                Err(failure) => report.failures.push(failure),
            }
        }
        report
    }
}

/// Transforms units concurrently on a pool of fixed size.
pub struct ParallelTransformer {
    transformer: FileTransformer,
    workers: usize,
}

impl ParallelTransformer {
    /// Pool sized to the number of logical processors.
    pub fn new(transformer: FileTransformer) -> Self {
        Self::with_workers(transformer, available_workers())
    }

    /// Pool with an explicit size (minimum 1).
    pub fn with_workers(transformer: FileTransformer, workers: usize) -> Self {
        Self {
            transformer,
            workers: workers.max(1),
        }
    }

    /// Pool size.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Transform every unit. Per-unit failures are collected, not raised.
    ///
    /// # Errors
    ///
    /// Only fails if the worker pool itself cannot be started.
    pub fn run(&self, units: &[SourceUnit], reporter: &dyn BuildReporter) -> Result<TransformReport> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|i| format!("pyxforge-transform-{i}"))
            .build()
            .map_err(|e| Error::InvalidOperation(format!("failed to start worker pool: {e}")))?;

        tracing::info!(units = units.len(), workers = self.workers, "Transforming sources");

        let outcomes: Vec<_> = pool.install(|| {
            units
                .par_iter()
                .map(|unit| {
                    let outcome = self.transformer.transform(unit);
                    match &outcome {
                        Ok(_) => reporter.on_unit_transformed(unit),
                        Err(failure) => {
                            tracing::warn!(
                                file = %unit.relative.display(),
                                error = %failure.message,
                                "Transform failed"
                            );
                            reporter.on_unit_failed(failure);
                        }
                    }
                    outcome
                })
                .collect()
        });

        let report = TransformReport::merge(outcomes);
        if !report.missing_modules.is_empty() {
            tracing::warn!(modules = ?report.missing_modules, "Missing modules detected");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::NullReporter;
    use crate::transform::{StaticResolver, TransformOptions};
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn write_units(root: &std::path::Path, count: usize) -> Vec<SourceUnit> {
        (0..count)
            .map(|i| {
                let rel = PathBuf::from(format!("pkg{}/mod_{i}.py", i % 7));
                let path = root.join(&rel);
                fs::create_dir_all(path.parent().unwrap()).unwrap();
                fs::write(&path, format!("import os\nimport missing_{}\n", i % 13)).unwrap();
                SourceUnit { path, relative: rel }
            })
            .collect()
    }

    fn transformer(out: &std::path::Path) -> FileTransformer {
        FileTransformer::new(
            out,
            TransformOptions::default(),
            Arc::new(StaticResolver::new(["os"])),
        )
    }

    #[test]
    fn test_union_of_missing_modules() {
        let temp = TempDir::new().unwrap();
        let units = write_units(&temp.path().join("src"), 200);

        let report = ParallelTransformer::with_workers(transformer(&temp.path().join("out")), 8)
            .run(&units, &NullReporter)
            .unwrap();

        let expected: BTreeSet<String> = (0..13).map(|i| format!("missing_{i}")).collect();
        assert_eq!(report.units.len(), 200);
        assert!(report.is_complete());
        assert_eq!(report.missing_modules, expected);
    }

    #[test]
    fn test_results_keep_submission_order() {
        let temp = TempDir::new().unwrap();
        let units = write_units(&temp.path().join("src"), 50);

        let report = ParallelTransformer::with_workers(transformer(&temp.path().join("out")), 4)
            .run(&units, &NullReporter)
            .unwrap();

        let order: Vec<_> = report.units.iter().map(|u| u.source.clone()).collect();
        assert_eq!(order, units);
    }

    #[test]
    fn test_failure_does_not_abort_batch() {
        let temp = TempDir::new().unwrap();
        let mut units = write_units(&temp.path().join("src"), 10);
        units.insert(
            3,
            SourceUnit {
                path: temp.path().join("src/vanished.py"),
                relative: PathBuf::from("vanished.py"),
            },
        );

        struct Counting(AtomicUsize, AtomicUsize);
        impl BuildReporter for Counting {
            fn on_unit_transformed(&self, _: &SourceUnit) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
            fn on_unit_failed(&self, _: &TransformFailure) {
                self.1.fetch_add(1, Ordering::SeqCst);
            }
        }
        let reporter = Counting(AtomicUsize::new(0), AtomicUsize::new(0));

        let report = ParallelTransformer::new(transformer(&temp.path().join("out")))
            .run(&units, &reporter)
            .unwrap();

        assert_eq!(report.units.len(), 10);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source.relative, PathBuf::from("vanished.py"));
        assert_eq!(reporter.0.load(Ordering::SeqCst), 10);
        assert_eq!(reporter.1.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_workers_minimum() {
        let temp = TempDir::new().unwrap();
        let p = ParallelTransformer::with_workers(transformer(temp.path()), 0);
        assert_eq!(p.workers(), 1);
        assert!(available_workers() >= 1);
    }
}
