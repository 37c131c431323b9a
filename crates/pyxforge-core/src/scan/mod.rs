//! Source discovery.
//!
//! - Exclusion patterns merged from `exclude.txt` and `.gitignore`
//! - Recursive discovery of `.py` files under a root, filtered once

mod exclude;
mod scanner;

pub use exclude::{EXCLUDE_FILES, ExcludeMatcher, ExcludePattern};
pub use scanner::{SOURCE_EXTENSION, SourceScanner, SourceUnit};
