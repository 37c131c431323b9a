//! Terminal color constants and utilities for CLI output.

use std::io::{self, Write};

pub const RESET: &str = "\x1b[0m";
pub const BOLD: &str = "\x1b[1m";
pub const DIM: &str = "\x1b[2m";
pub const GREEN: &str = "\x1b[32m";
pub const YELLOW: &str = "\x1b[33m";
pub const BLUE: &str = "\x1b[34m";
pub const CYAN: &str = "\x1b[36m";
pub const RED: &str = "\x1b[31m";

/// Flush stdout so a progress line without newline shows up immediately.
#[inline]
pub fn flush_stdout() {
    io::stdout().flush().ok();
}

/// Print a step header like `  ◆ Compiling ... ` without a newline.
pub fn step(label: &str) {
    print!("{BLUE}  ◆ {label}{RESET} ... ");
    flush_stdout();
}

/// Finish a step line with a check mark and optional detail.
pub fn done(detail: &str) {
    if detail.is_empty() {
        println!("{GREEN}✓{RESET}");
    } else {
        println!("{GREEN}✓{RESET} ({detail})");
    }
}
