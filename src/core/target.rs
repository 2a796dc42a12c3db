//! Target definitions - what gets built.
//!
//! A Target is a named build unit: a static library, shared library or
//! executable, together with the source patterns it is built from, the
//! preprocessor defines its sources are compiled with, and the libraries it
//! links against.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The kind of target being built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// Static library (.a / .lib)
    #[serde(rename = "staticlib", alias = "static", alias = "lib")]
    StaticLibrary,

    /// Shared/dynamic library (.so / .dylib / .dll)
    #[serde(rename = "sharedlib", alias = "shared", alias = "dylib")]
    SharedLibrary,

    /// Executable binary
    #[serde(rename = "exe", alias = "bin", alias = "executable")]
    Executable,
}

impl TargetKind {
    /// Short name used in descriptors and plan output.
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::StaticLibrary => "staticlib",
            TargetKind::SharedLibrary => "sharedlib",
            TargetKind::Executable => "exe",
        }
    }

    /// Get the typical file extension for this target kind.
    pub fn extension(&self, os: &str) -> &'static str {
        match self {
            TargetKind::Executable => {
                if os == "windows" {
                    "exe"
                } else {
                    ""
                }
            }
            TargetKind::StaticLibrary => {
                if os == "windows" {
                    "lib"
                } else {
                    "a"
                }
            }
            TargetKind::SharedLibrary => match os {
                "windows" => "dll",
                "macos" => "dylib",
                _ => "so",
            },
        }
    }

    /// Get the typical file prefix for this target kind.
    pub fn prefix(&self, os: &str) -> &'static str {
        match self {
            TargetKind::Executable => "",
            TargetKind::StaticLibrary | TargetKind::SharedLibrary => {
                if os == "windows" {
                    ""
                } else {
                    "lib"
                }
            }
        }
    }

    /// Get the output filename for a target of this kind.
    pub fn output_filename(&self, name: &str, os: &str) -> String {
        let prefix = self.prefix(os);
        let ext = self.extension(os);
        if ext.is_empty() {
            format!("{}{}", prefix, name)
        } else {
            format!("{}{}.{}", prefix, name, ext)
        }
    }

    /// Whether producing this kind ends in a link step (as opposed to archiving).
    pub fn performs_link(&self) -> bool {
        matches!(self, TargetKind::SharedLibrary | TargetKind::Executable)
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source language of a compilable file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// C language
    C,
    /// C++ language
    #[serde(rename = "c++")]
    Cxx,
}

impl Language {
    /// Language of a source file, by extension.
    ///
    /// Returns `None` for anything that is not compiled on its own (headers,
    /// scripts, data files). Upper-case `.C` is C++.
    pub fn of(path: &Path) -> Option<Language> {
        let ext = path.extension()?.to_str()?;
        match ext {
            "c" => Some(Language::C),
            "cpp" | "cc" | "cxx" | "c++" | "C" | "CPP" | "CC" | "CXX" => Some(Language::Cxx),
            _ => None,
        }
    }

    /// Get the language name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cxx => "c++",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Handle to a target declared in a [`TargetRegistry`].
///
/// Handles are indices in declaration order and are only meaningful for the
/// registry that issued them.
///
/// [`TargetRegistry`]: crate::core::registry::TargetRegistry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetId(pub(crate) usize);

impl TargetId {
    /// Position of the target in declaration order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A reference to something a target must be linked against.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkDependency {
    /// Library name, e.g. `mongoc`
    pub library_name: String,

    /// `true` if the toolchain resolves this name from its search path,
    /// `false` if it names another target in the registry
    pub is_external: bool,
}

impl LinkDependency {
    /// A library found by the platform linker (`-l<name>`).
    pub fn external(name: impl Into<String>) -> Self {
        LinkDependency {
            library_name: name.into(),
            is_external: true,
        }
    }

    /// A library built by another target of the same graph.
    pub fn internal(name: impl Into<String>) -> Self {
        LinkDependency {
            library_name: name.into(),
            is_external: false,
        }
    }
}

/// A declared build target.
#[derive(Debug, Clone, Serialize)]
pub struct Target {
    /// Unique name within the registry
    pub name: String,

    /// What kind of artifact to produce
    pub kind: TargetKind,

    /// Directory the source patterns are relative to
    pub root: PathBuf,

    /// Source file patterns (globs), in declaration order
    pub source_patterns: Vec<String>,

    /// Preprocessor defines (`NAME` or `NAME=VALUE`) for this target's sources
    pub defines: Vec<String>,

    /// Libraries to link against, in declaration order
    pub link_dependencies: Vec<LinkDependency>,

    /// Concrete source files, set once by the source resolver
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) resolved_sources: Option<Vec<PathBuf>>,
}

impl Target {
    /// Create a new target rooted at `root`.
    pub fn new(name: impl Into<String>, kind: TargetKind, root: impl Into<PathBuf>) -> Self {
        Target {
            name: name.into(),
            kind,
            root: root.into(),
            source_patterns: Vec::new(),
            defines: Vec::new(),
            link_dependencies: Vec::new(),
            resolved_sources: None,
        }
    }

    /// Set source patterns.
    pub fn with_sources(mut self, patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.source_patterns = patterns.into_iter().map(|p| p.into()).collect();
        self
    }

    /// Set preprocessor defines. Repeated symbols are kept once.
    pub fn with_defines(mut self, defines: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.defines.clear();
        for define in defines {
            let define = define.into();
            if !self.defines.contains(&define) {
                self.defines.push(define);
            }
        }
        self
    }

    /// Resolved source files, if the source resolver has run for this target.
    pub fn resolved_sources(&self) -> Option<&[PathBuf]> {
        self.resolved_sources.as_deref()
    }

    /// Whether sources have been resolved.
    pub fn is_resolved(&self) -> bool {
        self.resolved_sources.is_some()
    }

    /// Internal (non-external) link dependency names, in declaration order.
    pub fn internal_dependencies(&self) -> impl Iterator<Item = &str> {
        self.link_dependencies
            .iter()
            .filter(|d| !d.is_external)
            .map(|d| d.library_name.as_str())
    }

    /// Get the output filename for this target on `os`.
    pub fn output_filename(&self, os: &str) -> String {
        self.kind.output_filename(&self.name, os)
    }

    /// Root directory, for relative display of sources.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Split a `NAME=VALUE` define into its name and optional value.
pub fn split_define(define: &str) -> (&str, Option<&str>) {
    match define.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (define, None),
    }
}
