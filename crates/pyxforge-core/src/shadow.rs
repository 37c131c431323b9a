//! Resolution of packages that shadow standard-library modules.
//!
//! A library may ship a subpackage called `json` or `logging`. Compiled in
//! place, such a package would shadow the standard-library module of the
//! same name, so before building a *copy* of the library every colliding
//! directory is renamed and every `import <name>` / `from <name>` reference
//! in the tree is rewritten.
//!
//! Resolution runs in two phases. All renames happen first; if any of them
//! fails, the completed ones are rolled back and no file is touched. Only
//! after every directory has its new name are references rewritten, using
//! the complete rename map.
//!
//! Never run this on a user's own source tree: it mutates in place.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Suffix appended to a colliding directory name.
pub const SHADOW_SUFFIX: &str = "_pyx";

/// File extensions whose contents are rewritten.
const REWRITE_EXTENSIONS: [&str; 4] = ["py", "pyi", "pyx", "pxd"];

/// Public top-level standard-library module names (sorted).
pub const STDLIB_MODULES: &[&str] = &[
    "abc", "aifc", "antigravity", "argparse", "array", "ast", "asynchat", "asyncio", "asyncore",
    "atexit", "audioop", "base64", "bdb", "binascii", "bisect", "builtins", "bz2", "cProfile",
    "calendar", "cgi", "cgitb", "chunk", "cmath", "cmd", "code", "codecs", "codeop",
    "collections", "colorsys", "compileall", "concurrent", "configparser", "contextlib",
    "contextvars", "copy", "copyreg", "crypt", "csv", "ctypes", "curses", "dataclasses",
    "datetime", "dbm", "decimal", "difflib", "dis", "distutils", "doctest", "email",
    "encodings", "ensurepip", "enum", "errno", "faulthandler", "fcntl", "filecmp", "fileinput",
    "fnmatch", "fractions", "ftplib", "functools", "gc", "genericpath", "getopt", "getpass",
    "gettext", "glob", "graphlib", "grp", "gzip", "hashlib", "heapq", "hmac", "html", "http",
    "idlelib", "imaplib", "imghdr", "imp", "importlib", "inspect", "io", "ipaddress",
    "itertools", "json", "keyword", "lib2to3", "linecache", "locale", "logging", "lzma",
    "mailbox", "mailcap", "marshal", "math", "mimetypes", "mmap", "modulefinder", "msilib",
    "msvcrt", "multiprocessing", "netrc", "nis", "nntplib", "nt", "ntpath", "nturl2path",
    "numbers", "opcode", "operator", "optparse", "os", "ossaudiodev", "pathlib", "pdb",
    "pickle", "pickletools", "pipes", "pkgutil", "platform", "plistlib", "poplib", "posix",
    "posixpath", "pprint", "profile", "pstats", "pty", "pwd", "py_compile", "pyclbr", "pydoc",
    "pydoc_data", "pyexpat", "queue", "quopri", "random", "re", "readline", "reprlib",
    "resource", "rlcompleter", "runpy", "sched", "secrets", "select", "selectors", "shelve",
    "shlex", "shutil", "signal", "site", "smtpd", "smtplib", "sndhdr", "socket",
    "socketserver", "spwd", "sqlite3", "sre_compile", "sre_constants", "sre_parse", "ssl",
    "stat", "statistics", "string", "stringprep", "struct", "subprocess", "sunau", "symtable",
    "sys", "sysconfig", "syslog", "tabnanny", "tarfile", "telnetlib", "tempfile", "termios",
    "textwrap", "this", "threading", "time", "timeit", "tkinter", "token", "tokenize",
    "tomllib", "trace", "traceback", "tracemalloc", "tty", "turtle", "turtledemo", "types",
    "typing", "unicodedata", "unittest", "urllib", "uu", "uuid", "venv", "warnings", "wave",
    "weakref", "webbrowser", "winreg", "winsound", "wsgiref", "xdrlib", "xml", "xmlrpc",
    "zipapp", "zipfile", "zipimport", "zlib", "zoneinfo",
];

/// Whether `name` is a standard-library module name.
pub fn is_stdlib_module(name: &str) -> bool {
    STDLIB_MODULES.binary_search(&name).is_ok()
}

/// A file whose references could not be rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteFailure {
    pub path: PathBuf,
    pub message: String,
}

/// What a resolution pass did.
#[derive(Debug, Clone, Default)]
pub struct ShadowOutcome {
    /// Old name → new name, for every colliding name found.
    pub renames: BTreeMap<String, String>,

    /// Directories moved, as (old path, new path).
    pub moved: Vec<(PathBuf, PathBuf)>,

    /// Files whose contents changed.
    pub rewritten: Vec<PathBuf>,

    /// Files that could not be read or written during rewriting.
    pub failures: Vec<RewriteFailure>,
}

impl ShadowOutcome {
    /// True when no collision was found.
    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }
}

/// Renames shadowing directories in a copied tree and rewrites references.
#[derive(Debug, Clone)]
pub struct ShadowResolver {
    suffix: String,
}

impl Default for ShadowResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowResolver {
    pub fn new() -> Self {
        Self {
            suffix: SHADOW_SUFFIX.to_string(),
        }
    }

    /// Name a colliding directory is renamed to.
    pub fn disambiguate(&self, name: &str) -> String {
        format!("{name}{}", self.suffix)
    }

    /// Resolve every collision under `root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShadowResolution`] if a rename cannot be performed.
    /// In that case completed renames are undone and no file is rewritten.
    pub fn resolve(&self, root: &Path) -> Result<ShadowOutcome> {
        let plan = self.plan(root)?;
        if plan.is_empty() {
            tracing::debug!(root = %root.display(), "No shadowing packages");
            return Ok(ShadowOutcome::default());
        }

        let mut outcome = ShadowOutcome::default();
        for (from, to) in &plan {
            if let (Some(old), Some(new)) = (file_name(from), file_name(to)) {
                outcome.renames.insert(old, new);
            }
        }

        Self::apply_renames(&plan)?;
        outcome.moved = plan;

        self.rewrite_tree(root, &mut outcome);
        tracing::info!(
            renames = outcome.renames.len(),
            rewritten = outcome.rewritten.len(),
            failures = outcome.failures.len(),
            "Shadowing packages resolved"
        );
        Ok(outcome)
    }

    /// Colliding directories, deepest first, with their target paths.
    fn plan(&self, root: &Path) -> Result<Vec<(PathBuf, PathBuf)>> {
        let mut plan = Vec::new();

        for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
            let entry = entry.map_err(|e| Error::ShadowResolution {
                path: e.path().map(Path::to_path_buf),
                message: e.to_string(),
            })?;
            if !entry.file_type().is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            if !is_stdlib_module(name) {
                continue;
            }

            let from = entry.path().to_path_buf();
            let to = from.with_file_name(self.disambiguate(name));
            if to.exists() {
                return Err(Error::ShadowResolution {
                    path: Some(from),
                    message: format!("rename target {} already exists", to.display()),
                });
            }
            plan.push((from, to));
        }

        Ok(plan)
    }

    fn apply_renames(plan: &[(PathBuf, PathBuf)]) -> Result<()> {
        for (done, (from, to)) in plan.iter().enumerate() {
            if let Err(e) = fs::rename(from, to) {
                for (undo_from, undo_to) in plan[..done].iter().rev() {
                    if let Err(undo) = fs::rename(undo_to, undo_from) {
                        tracing::error!(
                            path = %undo_to.display(),
                            error = %undo,
                            "Failed to roll back rename"
                        );
                    }
                }
                return Err(Error::ShadowResolution {
                    path: Some(from.clone()),
                    message: format!("cannot rename to {}: {e}", to.display()),
                });
            }
            tracing::debug!(from = %from.display(), to = %to.display(), "Renamed shadowing package");
        }
        Ok(())
    }

    fn rewrite_tree(&self, root: &Path, outcome: &mut ShadowOutcome) {
        let files = WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.file_type().is_file()
                    && e.path()
                        .extension()
                        .and_then(|x| x.to_str())
                        .is_some_and(|x| REWRITE_EXTENSIONS.contains(&x))
            });

        for entry in files {
            let path = entry.path();
            let source = match fs::read_to_string(path) {
                Ok(s) => s,
                Err(e) => {
                    outcome.failures.push(RewriteFailure {
                        path: path.to_path_buf(),
                        message: format!("cannot read: {e}"),
                    });
                    continue;
                }
            };

            let Some(rewritten) = rewrite_imports(&source, &outcome.renames) else {
                continue;
            };

            match fs::write(path, rewritten) {
                Ok(()) => outcome.rewritten.push(path.to_path_buf()),
                Err(e) => outcome.failures.push(RewriteFailure {
                    path: path.to_path_buf(),
                    message: format!("cannot write: {e}"),
                }),
            }
        }
    }
}

/// Rewrite module references in `import` and `from` statements using
/// `renames`.
///
/// Every segment of a dotted module path is checked, so `from .json import
/// x`, `from pkg.json import x` and `import pkg.json` are rewritten as well
/// as the bare forms. Each clause of `import a, b` and of the name list after
/// `from ... import` is checked the same way. Matches whole identifiers only,
/// so `import json_ext` is left alone. Returns `None` when nothing changed.
pub fn rewrite_imports(source: &str, renames: &BTreeMap<String, String>) -> Option<String> {
    if renames.is_empty() {
        return None;
    }

    let mut rewriter = ImportRewriter {
        source,
        bytes: source.as_bytes(),
        renames,
        out: String::with_capacity(source.len()),
        copied: 0,
    };

    let mut i = 0;
    while i < rewriter.bytes.len() {
        let Some(keyword) = keyword_at(rewriter.bytes, i) else {
            i += 1;
            continue;
        };

        let after = i + keyword.len();
        let j = rewriter.skip_blanks(after, false);
        if j == after {
            i = j;
            continue;
        }

        i = match keyword {
            Keyword::From => rewriter.module_path(j),
            Keyword::Import => rewriter.clauses(j),
        };
    }

    rewriter.finish()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Keyword {
    From,
    Import,
}

impl Keyword {
    fn len(self) -> usize {
        match self {
            Self::From => 4,
            Self::Import => 6,
        }
    }
}

/// The `import`/`from` keyword starting at `i`, if any.
fn keyword_at(bytes: &[u8], i: usize) -> Option<Keyword> {
    if i > 0 && is_ident_byte(bytes[i - 1]) {
        return None;
    }
    if bytes[i..].starts_with(b"import") {
        Some(Keyword::Import)
    } else if bytes[i..].starts_with(b"from") {
        Some(Keyword::From)
    } else {
        None
    }
}

struct ImportRewriter<'a> {
    source: &'a str,
    bytes: &'a [u8],
    renames: &'a BTreeMap<String, String>,
    out: String,
    copied: usize,
}

impl ImportRewriter<'_> {
    /// Skip spaces, tabs and backslash continuations; newlines too when
    /// inside parentheses.
    fn skip_blanks(&self, mut i: usize, in_parens: bool) -> usize {
        while i < self.bytes.len() {
            match self.bytes[i] {
                b' ' | b'\t' => i += 1,
                b'\n' | b'\r' if in_parens => i += 1,
                b'\\' if matches!(self.bytes.get(i + 1), Some(b'\n' | b'\r')) => i += 2,
                _ => break,
            }
        }
        i
    }

    fn identifier_end(&self, mut i: usize) -> usize {
        while i < self.bytes.len() && is_ident_byte(self.bytes[i]) {
            i += 1;
        }
        i
    }

    /// Rewrite the segments of a dotted path starting at `i`, including any
    /// leading relative dots. Returns the index after the path.
    fn module_path(&mut self, mut i: usize) -> usize {
        while self.bytes.get(i) == Some(&b'.') {
            i += 1;
        }
        loop {
            let start = i;
            i = self.identifier_end(i);
            if i == start {
                return i;
            }
            if let Some(new) = self.renames.get(&self.source[start..i]) {
                self.out.push_str(&self.source[self.copied..start]);
                self.out.push_str(new);
                self.copied = i;
            }
            match self.bytes.get(i + 1) {
                Some(&next) if self.bytes[i] == b'.' && is_ident_byte(next) => i += 1,
                _ => return i,
            }
        }
    }

    /// Rewrite a comma-separated clause list, optionally parenthesized, with
    /// `as` aliases. Returns the index after the last clause.
    fn clauses(&mut self, mut i: usize) -> usize {
        let in_parens = self.bytes.get(i) == Some(&b'(');
        if in_parens {
            i += 1;
        }
        loop {
            i = self.skip_blanks(i, in_parens);
            i = self.module_path(i);
            i = self.skip_blanks(i, in_parens);

            if self.bytes[i..].starts_with(b"as") {
                let after = self.skip_blanks(i + 2, in_parens);
                if after > i + 2 {
                    i = self.skip_blanks(self.identifier_end(after), in_parens);
                }
            }

            if self.bytes.get(i) == Some(&b',') {
                i += 1;
                continue;
            }
            return i;
        }
    }

    fn finish(mut self) -> Option<String> {
        if self.copied == 0 {
            return None;
        }
        self.out.push_str(&self.source[self.copied..]);
        Some(self.out)
    }
}

/// Identifier byte; non-ASCII bytes count so multi-byte names stay whole.
fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_owned)
}
