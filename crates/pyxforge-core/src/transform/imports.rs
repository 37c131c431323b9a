//! Static import analysis.
//!
//! Extracts the top-level module names a file imports and checks each one
//! against an injected [`ModuleResolver`]. The result is advisory only: it is
//! reported, never used to block a transformation or a build.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rustc_hash::{FxHashMap, FxHashSet};

use super::annotate::is_identifier;
use crate::compile::PythonToolchain;
use crate::package::is_package_dir;

/// Outcome of resolving one module name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Found,
    NotFound,
}

/// Answers whether a module name is importable.
pub trait ModuleResolver: Send + Sync {
    /// Resolve a top-level module name such as `numpy`.
    fn resolve(&self, module: &str) -> Resolution;
}

impl<R: ModuleResolver + ?Sized> ModuleResolver for Arc<R> {
    fn resolve(&self, module: &str) -> Resolution {
        (**self).resolve(module)
    }
}

/// Resolver with a fixed set of known modules.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    known: FxHashSet<String>,
}

impl StaticResolver {
    pub fn new<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            known: known.into_iter().map(Into::into).collect(),
        }
    }
}

impl ModuleResolver for StaticResolver {
    fn resolve(&self, module: &str) -> Resolution {
        if self.known.contains(module) {
            Resolution::Found
        } else {
            Resolution::NotFound
        }
    }
}

/// Resolves names that exist inside a source tree, then defers to `fallback`.
///
/// A name is local when `<dir>/<name>.py` or `<dir>/<name>/` exists in the
/// root. A root that is itself a package is imported from its parent, so
/// the parent directory is searched too: the package's own name and its
/// siblings resolve locally.
#[derive(Debug, Clone)]
pub struct SourceTreeResolver<R> {
    search: Vec<PathBuf>,
    fallback: R,
}

impl<R: ModuleResolver> SourceTreeResolver<R> {
    pub fn new(root: impl Into<PathBuf>, fallback: R) -> Self {
        let root = root.into();
        let parent = is_package_dir(&root)
            .then(|| root.parent().map(Path::to_path_buf))
            .flatten();
        Self {
            search: std::iter::once(root).chain(parent).collect(),
            fallback,
        }
    }

    fn is_local(&self, module: &str) -> bool {
        self.search.iter().any(|dir| {
            dir.join(format!("{module}.py")).is_file() || dir.join(module).is_dir()
        })
    }
}

impl<R: ModuleResolver> ModuleResolver for SourceTreeResolver<R> {
    fn resolve(&self, module: &str) -> Resolution {
        if self.is_local(module) {
            return Resolution::Found;
        }
        self.fallback.resolve(module)
    }
}

/// Resolver backed by the Python interpreter's import system.
///
/// Each distinct name is probed once with `importlib.util.find_spec`;
/// answers are memoized for the lifetime of the resolver. A probe that
/// cannot run counts as [`Resolution::Found`] so toolchain trouble never
/// turns into a flood of false "missing module" reports.
pub struct PythonResolver {
    toolchain: PythonToolchain,
    cache: Mutex<FxHashMap<String, Resolution>>,
}

impl PythonResolver {
    pub fn new(toolchain: PythonToolchain) -> Self {
        Self {
            toolchain,
            cache: Mutex::new(FxHashMap::default()),
        }
    }

    fn probe(&self, module: &str) -> Resolution {
        match self.toolchain.find_spec(module) {
            Ok(true) => Resolution::Found,
            Ok(false) => Resolution::NotFound,
            Err(e) => {
                tracing::warn!(module, error = %e, "Module probe failed, assuming importable");
                Resolution::Found
            }
        }
    }
}

impl ModuleResolver for PythonResolver {
    fn resolve(&self, module: &str) -> Resolution {
        if let Ok(cache) = self.cache.lock()
            && let Some(hit) = cache.get(module)
        {
            return *hit;
        }

        let resolution = self.probe(module);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(module.to_string(), resolution);
        }
        resolution
    }
}

/// Top-level module names imported by `source`.
///
/// Looks at lines that, once trimmed, start with `import ` or `from `.
/// Relative imports are skipped: they always resolve inside the package.
pub fn imported_modules(source: &str) -> BTreeSet<String> {
    let mut modules = BTreeSet::new();

    for line in source.lines() {
        let line = line.trim();

        if let Some(rest) = line.strip_prefix("import ") {
            for clause in rest.split(',') {
                if let Some(name) = clause.split_whitespace().next().and_then(first_segment) {
                    modules.insert(name.to_string());
                }
            }
        } else if let Some(rest) = line.strip_prefix("from ") {
            let mut tokens = rest.split_whitespace();
            let (Some(target), Some("import")) = (tokens.next(), tokens.next()) else {
                continue;
            };
            if target.starts_with('.') {
                continue;
            }
            if let Some(name) = first_segment(target) {
                modules.insert(name.to_string());
            }
        }
    }

    modules
}

/// Imported modules of `source` that `resolver` cannot find.
pub fn missing_modules(source: &str, resolver: &dyn ModuleResolver) -> BTreeSet<String> {
    imported_modules(source)
        .into_iter()
        .filter(|m| resolver.resolve(m) == Resolution::NotFound)
        .collect()
}

fn first_segment(dotted: &str) -> Option<&str> {
    let head = dotted
        .trim_end_matches(|c: char| c == ';' || c == '\\' || c == '(')
        .split('.')
        .next()?;
    is_identifier(head).then_some(head)
}
