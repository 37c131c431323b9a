//! Lib command implementation for pyxforge CLI.
//!
//! Compiles an installed library from a staging copy and reinstalls it.

use std::time::Instant;

use anyhow::Context;
use pyxforge_core::paths::DEFAULT_OUTPUT_DIR;
use pyxforge_core::{BuildDirs, Pipeline, PipelineOptions, PythonToolchain};

use crate::build::{CliResult, print_summary};
use crate::colors;
use crate::reporter::TerminalReporter;

/// Compile and reinstall the library importable as `name`.
pub fn execute(name: &str) -> CliResult {
    let start = Instant::now();

    println!(
        "\n{}pyxforge{} - Compiling library {}{}{}\n",
        colors::BOLD,
        colors::RESET,
        colors::CYAN,
        name,
        colors::RESET
    );

    let toolchain = PythonToolchain::new()?;
    toolchain.ensure_build_modules()?;

    let dirs = BuildDirs::in_current_dir(DEFAULT_OUTPUT_DIR)
        .context("cannot resolve the working directory")?;
    let staging = dirs.staging_dir(name);
    let pipeline = Pipeline::with_toolchain(dirs, PipelineOptions::default(), toolchain.clone());
    let reporter = TerminalReporter::new();

    let outcome = pipeline.build_library(&toolchain, name, &reporter)?;

    print_summary(&outcome.build, &staging, &reporter);
    println!(
        "{}Reinstalled:{} {} {}",
        colors::GREEN,
        colors::RESET,
        name,
        outcome.version
    );
    println!(
        "{}Time:{} {:.2}s",
        colors::DIM,
        colors::RESET,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}
