//! Build command implementation for pyxforge CLI.
//!
//! Transforms and compiles a source tree, optionally packaging and
//! installing the result.

use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use pyxforge_core::transform::available_workers;
use pyxforge_core::{
    BuildDirs, BuildResult, DirectiveProfile, Pipeline, PipelineOptions, PythonToolchain,
    SourceScanner, TransformOptions,
};

use crate::colors;
use crate::reporter::TerminalReporter;

/// Result type for CLI operations.
pub type CliResult = anyhow::Result<()>;

/// Arguments of `pyxforge build`.
pub struct BuildArgs<'a> {
    pub target: &'a str,
    pub output: &'a str,
    pub install: bool,
    pub pkg_version: &'a str,
    pub annotate: bool,
    pub check_imports: bool,
    pub jobs: Option<usize>,
}

/// Build a source tree.
pub fn execute(args: &BuildArgs<'_>) -> CliResult {
    let start = Instant::now();
    let target = Path::new(args.target);
    let root = SourceScanner::validate_root(target)?;

    println!(
        "\n{}pyxforge{} - Building {}{}{}\n",
        colors::BOLD,
        colors::RESET,
        colors::CYAN,
        root.display(),
        colors::RESET
    );

    let toolchain = PythonToolchain::new()?;
    toolchain.ensure_build_modules()?;
    println!(
        "{}  ◆ Python{} {} ({})",
        colors::BLUE,
        colors::RESET,
        toolchain.version(),
        toolchain.python().display()
    );
    let directives: Vec<_> = DirectiveProfile::aggressive()
        .entries()
        .into_iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    println!(
        "{}  ◆ Directives{} {}",
        colors::BLUE,
        colors::RESET,
        directives.join(", ")
    );

    let dirs = BuildDirs::in_current_dir(args.output)
        .context("cannot resolve the output directory")?;
    let output_dir = dirs.output_dir.clone();
    let options = PipelineOptions {
        transform: TransformOptions {
            annotate: args.annotate,
            check_imports: args.check_imports,
        },
        workers: args.jobs.unwrap_or_else(available_workers).max(1),
        package_version: args.pkg_version.to_string(),
    };
    let pipeline = Pipeline::with_toolchain(dirs, options, toolchain);
    let reporter = TerminalReporter::new();

    if args.install {
        let outcome = pipeline.build_and_install(&root, None, &reporter)?;
        print_summary(&outcome.build, &output_dir, &reporter);
        println!(
            "{}Installed:{} {} (version {})",
            colors::GREEN,
            colors::RESET,
            outcome.wheel.display(),
            outcome.version
        );
    } else {
        let result = pipeline.build(&root, &reporter)?;
        print_summary(&result, &output_dir, &reporter);
    }

    println!(
        "{}Time:{} {:.2}s",
        colors::DIM,
        colors::RESET,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Print the outcome of a successful build.
pub fn print_summary(result: &BuildResult, output_dir: &Path, reporter: &TerminalReporter) {
    println!();
    println!(
        "{}Built:{} {} extensions in {}",
        colors::GREEN,
        colors::RESET,
        result.artifacts().len(),
        output_dir.display()
    );
    println!(
        "{}Transformed:{} {} files",
        colors::DIM,
        colors::RESET,
        reporter.transformed()
    );

    if !result.transform_failures.is_empty() {
        println!(
            "{}Skipped:{} {} files could not be transformed",
            colors::YELLOW,
            colors::RESET,
            reporter.failed()
        );
    }
    if !result.missing_modules.is_empty() {
        println!(
            "{}Missing:{} {} (install them before importing the build)",
            colors::YELLOW,
            colors::RESET,
            result.missing_modules.len()
        );
    }
}
