//! Line-level source transformer.
//!
//! Produces the compiler-ready text of a unit from its Python source:
//! - Injects [`MARKER_HEADER`] exactly once near the top of the file
//! - Optionally tags `for ... in range(...)` loops and `def` lines with
//!   comment annotations
//!
//! Every line the transformer emits is a comment, so the output has the same
//! semantics as the input. Annotations are only placed before lines that
//! start a statement: never inside a multi-line string, a bracketed
//! expression or a backslash continuation. Running the transformer on its
//! own output is a no-op.

/// Directive-import marker placed at the top of every transformed unit.
pub const MARKER_HEADER: &str = "# cimport cython";

/// Substring that counts as "header already present".
const MARKER_NEEDLE: &str = "cimport cython";

/// Comment annotations emitted above each function definition.
const FUNCTION_ANNOTATIONS: [&str; 4] = [
    "# @boundscheck(False)",
    "# @wraparound(False)",
    "# @nonecheck(False)",
    "# @cdivision(True)",
];

/// How a single source line is treated.
#[derive(Debug, PartialEq, Eq)]
enum LineKind<'a> {
    /// Blank line or comment; emitted untouched.
    Passive,
    /// `for <var> in range(...)`.
    RangeLoop { indent: &'a str, var: &'a str },
    /// `def name(...)`.
    FunctionDef { indent: &'a str },
    /// Anything else.
    Code,
}

impl<'a> LineKind<'a> {
    fn classify(line: &'a str) -> Self {
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            return Self::Passive;
        }

        let indent = &line[..line.len() - line.trim_start().len()];

        if stripped.starts_with("for ") && stripped.contains("in range") {
            if let Some(var) = stripped.split_whitespace().nth(1)
                && is_identifier(var)
            {
                return Self::RangeLoop { indent, var };
            }
            return Self::Code;
        }

        if stripped.starts_with("def ") {
            return Self::FunctionDef { indent };
        }

        Self::Code
    }
}

/// Lexical state carried from one line to the next.
#[derive(Debug, Default)]
struct Continuation {
    /// Delimiter of an open triple-quoted string.
    open_string: Option<&'static [u8]>,
    /// Open bracket depth.
    depth: usize,
    /// Previous line ended with a backslash.
    backslash: bool,
}

impl Continuation {
    /// Whether the next line starts a new logical statement.
    fn at_statement_start(&self) -> bool {
        self.open_string.is_none() && self.depth == 0 && !self.backslash
    }

    /// Consume one physical line.
    fn advance(&mut self, line: &str) {
        let bytes = line.as_bytes();
        let mut i = 0;
        self.backslash = false;

        while i < bytes.len() {
            if let Some(delim) = self.open_string {
                match close_of(bytes, i, delim) {
                    Some(end) => {
                        self.open_string = None;
                        i = end;
                    }
                    None => return,
                }
                continue;
            }

            match bytes[i] {
                b'#' => return,
                quote @ (b'"' | b'\'') => {
                    let triple: &'static [u8] = if quote == b'"' { b"\"\"\"" } else { b"'''" };
                    if bytes[i..].starts_with(triple) {
                        self.open_string = Some(triple);
                        i += 3;
                    } else {
                        i = close_of(bytes, i + 1, &bytes[i..=i]).unwrap_or(bytes.len());
                    }
                }
                b'(' | b'[' | b'{' => {
                    self.depth += 1;
                    i += 1;
                }
                b')' | b']' | b'}' => {
                    self.depth = self.depth.saturating_sub(1);
                    i += 1;
                }
                b'\\' => {
                    self.backslash = i + 1 == bytes.len();
                    i += 2;
                }
                _ => i += 1,
            }
        }
    }
}

/// Index just past the first unescaped `delim` at or after `i`.
fn close_of(bytes: &[u8], mut i: usize, delim: &[u8]) -> Option<usize> {
    while i < bytes.len() {
        if bytes[i] == b'\\' {
            i += 2;
        } else if bytes[i..].starts_with(delim) {
            return Some(i + delim.len());
        } else {
            i += 1;
        }
    }
    None
}

/// Text transformer for a single source file.
#[derive(Debug, Clone, Copy)]
pub struct SourceTransform {
    annotate: bool,
}

impl Default for SourceTransform {
    fn default() -> Self {
        Self { annotate: true }
    }
}

impl SourceTransform {
    /// Transformer with cosmetic annotations switched on or off.
    pub fn new(annotate: bool) -> Self {
        Self { annotate }
    }

    /// Transform `source` into compiler-ready text.
    pub fn apply(&self, source: &str) -> String {
        let lines: Vec<&str> = source.lines().collect();
        let mut out: Vec<String> = Vec::with_capacity(lines.len() + 1);

        let needs_header = !has_marker(source);
        let header_at = preamble_len(&lines);
        let mut state = Continuation::default();

        for (idx, line) in lines.iter().enumerate() {
            if needs_header && idx == header_at {
                out.push(MARKER_HEADER.to_string());
            }

            if self.annotate && state.at_statement_start() {
                match LineKind::classify(line) {
                    LineKind::RangeLoop { indent, var } => {
                        let note = format!("{indent}# cdef int {var} (annotated)");
                        if out.last() != Some(&note) {
                            out.push(note);
                        }
                    }
                    LineKind::FunctionDef { indent } => {
                        let block: Vec<String> = FUNCTION_ANNOTATIONS
                            .iter()
                            .map(|a| format!("{indent}{a}"))
                            .collect();
                        if !out.ends_with(&block) {
                            out.extend(block);
                        }
                    }
                    LineKind::Passive | LineKind::Code => {}
                }
            }

            state.advance(line);
            out.push((*line).to_string());
        }

        if needs_header && header_at >= lines.len() {
            out.push(MARKER_HEADER.to_string());
        }

        let mut text = out.join("\n");
        text.push('\n');
        text
    }
}

/// Whether `source` already carries the marker header.
fn has_marker(source: &str) -> bool {
    source.contains(MARKER_NEEDLE)
}

/// Number of leading lines that must stay first: a shebang and/or an
/// encoding declaration, which Python only honours on lines 1-2.
fn preamble_len(lines: &[&str]) -> usize {
    let mut n = 0;
    if lines.first().is_some_and(|l| l.starts_with("#!")) {
        n = 1;
    }
    if lines.get(n).is_some_and(|l| is_coding_line(l)) && n < 2 {
        n += 1;
    }
    n
}

fn is_coding_line(line: &str) -> bool {
    let t = line.trim_start();
    t.starts_with('#') && (t.contains("coding:") || t.contains("coding="))
}

/// Python identifier check (ASCII and Unicode letters, digits, underscore).
pub(crate) fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injects_header() {
        let out = SourceTransform::new(false).apply("x = 1\n");
        assert_eq!(out, "# cimport cython\nx = 1\n");
    }

    #[test]
    fn test_header_not_duplicated() {
        let src = "cimport cython\nx = 1\n";
        let out = SourceTransform::default().apply(src);
        assert_eq!(out.matches("cimport cython").count(), 1);
    }

    #[test]
    fn test_idempotent() {
        let src = "\
import math

def heavy(n):
    total = 0
    for i in range(n):
        total += math.sqrt(i)
    return total
";
        let t = SourceTransform::default();
        let once = t.apply(src);
        let twice = t.apply(&once);

        assert_eq!(once, twice);
        assert_eq!(once.matches(MARKER_HEADER).count(), 1);
    }

    #[test]
    fn test_annotations() {
        let src = "def f(n):\n    for i in range(n):\n        pass\n";
        let out = SourceTransform::default().apply(src);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines[0], MARKER_HEADER);
        assert_eq!(lines[1], "# @boundscheck(False)");
        assert_eq!(lines[4], "# @cdivision(True)");
        assert_eq!(lines[5], "def f(n):");
        assert_eq!(lines[6], "    # cdef int i (annotated)");
        assert_eq!(lines[7], "    for i in range(n):");
    }

    #[test]
    fn test_tuple_loop_not_annotated() {
        let out = SourceTransform::default().apply("for i, j in range(3):\n    pass\n");
        assert!(!out.contains("cdef int"));
    }

    #[test]
    fn test_annotations_skippable() {
        let src = "def f():\n    return 1\n";
        let out = SourceTransform::new(false).apply(src);
        assert_eq!(out, "# cimport cython\ndef f():\n    return 1\n");
    }

    #[test]
    fn test_header_after_preamble() {
        let src = "#!/usr/bin/env python\n# -*- coding: utf-8 -*-\nx = 1\n";
        let out = SourceTransform::new(false).apply(src);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "#!/usr/bin/env python");
        assert_eq!(lines[1], "# -*- coding: utf-8 -*-");
        assert_eq!(lines[2], MARKER_HEADER);
        assert_eq!(lines[3], "x = 1");
    }

    #[test]
    fn test_string_contents_not_annotated() {
        let src = "\
USAGE = \"\"\"
Example:
    def f():
    for i in range(3):
\"\"\"
print(USAGE)
";
        let out = SourceTransform::default().apply(src);
        assert_eq!(out, format!("{MARKER_HEADER}\n{src}"));
    }

    #[test]
    fn test_docstring_then_code_is_annotated() {
        let src = "\
def f(n):
    '''Loop like:

    for i in range(n):
    '''
    for j in range(n):
        pass
";
        let out = SourceTransform::default().apply(src);
        assert!(!out.contains("cdef int i"));
        assert!(out.contains("    # cdef int j (annotated)\n    for j in range(n):"));
        assert_eq!(out.matches("# @boundscheck(False)").count(), 1);
    }

    #[test]
    fn test_continuation_lines_not_annotated() {
        let src = "\
total = sum(
    i
    for i in range(10)
)
names = [\"def\", \"(\"]
x = 1 + \\
    2
for k in range(2):
    pass
";
        let out = SourceTransform::default().apply(src);
        assert!(!out.contains("cdef int i"));
        assert!(out.contains("# cdef int k (annotated)\nfor k in range(2):"));
    }

    #[test]
    fn test_empty_source() {
        assert_eq!(SourceTransform::default().apply(""), "# cimport cython\n");
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("i"));
        assert!(is_identifier("_idx2"));
        assert!(!is_identifier("2x"));
        assert!(!is_identifier("i,"));
        assert!(!is_identifier(""));
    }
}
