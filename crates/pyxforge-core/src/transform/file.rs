//! Per-file transformation.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::annotate::SourceTransform;
use super::imports::{ModuleResolver, missing_modules};
use crate::error::Error;
use crate::scan::SourceUnit;

/// Extension of the compiler's intermediate format.
pub const INTERMEDIATE_EXTENSION: &str = "pyx";

/// The compiler-ready form of one [`SourceUnit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedUnit {
    /// The unit this was produced from.
    pub source: SourceUnit,

    /// Where the intermediate file was written.
    pub destination: PathBuf,

    /// Imported modules that could not be resolved.
    pub missing_modules: BTreeSet<String>,
}

/// A unit whose file could not be read or written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformFailure {
    /// The unit that failed.
    pub source: SourceUnit,

    /// What went wrong.
    pub message: String,
}

impl TransformFailure {
    fn new(source: &SourceUnit, what: &str, path: &Path, err: std::io::Error) -> Self {
        Self {
            source: source.clone(),
            message: format!("{what} {}: {err}", path.display()),
        }
    }

    /// Convert into the crate error type.
    pub fn to_error(&self) -> Error {
        Error::Transform {
            path: self.source.path.clone(),
            message: self.message.clone(),
        }
    }
}

/// Options for [`FileTransformer`].
#[derive(Debug, Clone, Copy)]
pub struct TransformOptions {
    /// Emit loop/function comment annotations.
    pub annotate: bool,

    /// Run import analysis.
    pub check_imports: bool,
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self {
            annotate: true,
            check_imports: true,
        }
    }
}

/// Transforms single units into intermediate files under an output root.
#[derive(Clone)]
pub struct FileTransformer {
    output_root: PathBuf,
    text: SourceTransform,
    check_imports: bool,
    resolver: Arc<dyn ModuleResolver>,
}

impl FileTransformer {
    pub fn new(
        output_root: impl Into<PathBuf>,
        options: TransformOptions,
        resolver: Arc<dyn ModuleResolver>,
    ) -> Self {
        Self {
            output_root: output_root.into(),
            text: SourceTransform::new(options.annotate),
            check_imports: options.check_imports,
            resolver,
        }
    }

    /// The output root units are mirrored into.
    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Destination of `unit`: its relative path under the output root, with
    /// the intermediate extension.
    pub fn destination(&self, unit: &SourceUnit) -> PathBuf {
        self.output_root
            .join(&unit.relative)
            .with_extension(INTERMEDIATE_EXTENSION)
    }

    /// Transform one unit.
    ///
    /// Read and write failures are returned as a [`TransformFailure`] for
    /// this unit alone.
    pub fn transform(&self, unit: &SourceUnit) -> Result<TransformedUnit, TransformFailure> {
        let source = fs::read_to_string(&unit.path)
            .map_err(|e| TransformFailure::new(unit, "cannot read", &unit.path, e))?;

        let destination = self.destination(unit);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| TransformFailure::new(unit, "cannot create", parent, e))?;
        }

        fs::write(&destination, self.text.apply(&source))
            .map_err(|e| TransformFailure::new(unit, "cannot write", &destination, e))?;

        let missing = if self.check_imports {
            missing_modules(&source, self.resolver.as_ref())
        } else {
            BTreeSet::new()
        };

        tracing::debug!(
            file = %unit.relative.display(),
            missing = missing.len(),
            "Transformed"
        );

        Ok(TransformedUnit {
            source: unit.clone(),
            destination,
            missing_modules: missing,
        })
    }
}
