//! The fixed directive profile and native optimization flags.

use serde::Serialize;

/// Compiler directives applied uniformly to every unit.
///
/// Serializes to the exact mapping Cython expects for
/// `compiler_directives`. The profile is fixed; there is no way to build
/// a different one from outside this module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectiveProfile {
    boundscheck: bool,
    wraparound: bool,
    nonecheck: bool,
    overflowcheck: bool,
    initializedcheck: bool,
    cdivision: bool,
    infer_types: bool,
    language_level: u8,
}

impl DirectiveProfile {
    /// Checks off, C division, type inference on, language level 3.
    pub const fn aggressive() -> Self {
        Self {
            boundscheck: false,
            wraparound: false,
            nonecheck: false,
            overflowcheck: false,
            initializedcheck: false,
            cdivision: true,
            infer_types: true,
            language_level: 3,
        }
    }

    /// Directives as `(name, value)` pairs, for display.
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("boundscheck", py_bool(self.boundscheck)),
            ("wraparound", py_bool(self.wraparound)),
            ("nonecheck", py_bool(self.nonecheck)),
            ("overflowcheck", py_bool(self.overflowcheck)),
            ("initializedcheck", py_bool(self.initializedcheck)),
            ("cdivision", py_bool(self.cdivision)),
            ("infer_types", py_bool(self.infer_types)),
            ("language_level", self.language_level.to_string()),
        ]
    }
}

impl Default for DirectiveProfile {
    fn default() -> Self {
        Self::aggressive()
    }
}

fn py_bool(b: bool) -> String {
    if b { "True" } else { "False" }.to_string()
}

/// Native compiler and linker flags for every extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizationFlags {
    pub compile_args: Vec<String>,
    pub link_args: Vec<String>,
}

impl OptimizationFlags {
    /// Maximum optimization with link-time optimization for the host
    /// C toolchain.
    pub fn native() -> Self {
        if cfg!(target_env = "msvc") {
            Self::msvc()
        } else {
            Self::gcc_like()
        }
    }

    fn gcc_like() -> Self {
        Self {
            compile_args: vec!["-O3".into(), "-march=native".into(), "-flto".into()],
            link_args: vec!["-flto".into()],
        }
    }

    fn msvc() -> Self {
        Self {
            compile_args: vec!["/O2".into(), "/GL".into()],
            link_args: vec!["/LTCG".into()],
        }
    }
}

impl Default for OptimizationFlags {
    fn default() -> Self {
        Self::native()
    }
}
