//! Clean command implementation for pyxforge CLI.

use anyhow::Context;
use pyxforge_core::BuildDirs;

use crate::build::CliResult;
use crate::colors;

/// Remove build products from the current directory.
pub fn execute(output: &str) -> CliResult {
    let dirs = BuildDirs::in_current_dir(output).context("cannot resolve the output directory")?;
    let removed = dirs.clean()?;

    if removed.is_empty() {
        println!("{}Nothing to clean{}", colors::DIM, colors::RESET);
        return Ok(());
    }

    for path in &removed {
        println!("{}  - {}{}", colors::DIM, path.display(), colors::RESET);
    }
    println!(
        "{}Cleaned{} {} entries",
        colors::GREEN,
        colors::RESET,
        removed.len()
    );
    Ok(())
}
