//! Error types.
//!
//! [`ConfigError`] is raised before any toolchain invocation: while targets
//! are declared, while their sources are resolved, or when the graph is
//! finalized into a plan. [`BuildError`] is raised while a plan executes.

use miette::Diagnostic as MietteDiagnostic;
use thiserror::Error;

use crate::util::diagnostic::Diagnostic;

/// Error while declaring, resolving or finalizing the target graph.
#[derive(Debug, Clone, PartialEq, Eq, Error, MietteDiagnostic)]
pub enum ConfigError {
    #[error("target `{name}` is already declared")]
    #[diagnostic(
        code(quay::config::duplicate_target),
        help("Target names must be unique; rename one of the declarations")
    )]
    DuplicateTarget { name: String },

    #[error("no target named `{name}`")]
    #[diagnostic(
        code(quay::config::unknown_target),
        help("Run `quay check` to list the declared targets")
    )]
    UnknownTarget { name: String },

    #[error("source patterns of target `{target}` matched no source files")]
    #[diagnostic(
        code(quay::config::empty_sources),
        help("Check the patterns against the target's root directory")
    )]
    EmptySourceSet {
        target: String,
        patterns: Vec<String>,
    },

    #[error("invalid source pattern `{pattern}` in target `{target}`: {message}")]
    #[diagnostic(code(quay::config::invalid_pattern))]
    InvalidPattern {
        target: String,
        pattern: String,
        message: String,
    },

    #[error("sources of target `{target}` have not been resolved")]
    #[diagnostic(code(quay::config::unresolved_sources))]
    UnresolvedSources { target: String },

    #[error("cycle detected in target graph: {}", cycle.join(" -> "))]
    #[diagnostic(
        code(quay::graph::cycle),
        help("Break the cycle by removing one of the internal link dependencies")
    )]
    CyclicDependency { cycle: Vec<String> },

    #[error("target `{target}` links against `{missing}`, which is not a declared target")]
    #[diagnostic(
        code(quay::graph::unresolved_dependency),
        help("Declare `{missing}` or mark the library as external")
    )]
    UnresolvedDependency { target: String, missing: String },
}

impl ConfigError {
    /// Convert to a user-friendly diagnostic.
    pub fn to_diagnostic(&self) -> Diagnostic {
        let mut diag = Diagnostic::from_miette(self);

        match self {
            ConfigError::EmptySourceSet { patterns, .. } => {
                diag = diag.with_context(format!("patterns: {}", patterns.join(", ")));
            }
            ConfigError::CyclicDependency { cycle } => {
                diag = diag.with_context(format!("cycle: {}", cycle.join(" -> ")));
            }
            ConfigError::UnresolvedDependency { target, missing } => {
                diag = diag.with_context(format!(
                    "`{}` is listed in the links of `{}` with external = false",
                    missing, target
                ));
            }
            _ => {}
        }

        diag
    }
}

/// Error while executing a build plan.
///
/// Toolchain variants carry the toolchain's output unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Error, MietteDiagnostic)]
pub enum BuildError {
    #[error("could not compile `{target}`")]
    #[diagnostic(code(quay::build::compile))]
    ToolchainCompile { target: String, diagnostic: String },

    #[error("could not archive `{target}`")]
    #[diagnostic(code(quay::build::archive))]
    ToolchainArchive { target: String, diagnostic: String },

    #[error("could not link `{target}`")]
    #[diagnostic(code(quay::build::link))]
    ToolchainLink { target: String, diagnostic: String },

    #[error("failed to start the worker pool: {message}")]
    #[diagnostic(
        code(quay::build::worker_pool),
        help("Try a smaller `-j` value")
    )]
    WorkerPool { message: String },
}

impl BuildError {
    /// Target whose build failed, if any.
    pub fn target(&self) -> Option<&str> {
        match self {
            BuildError::ToolchainCompile { target, .. }
            | BuildError::ToolchainArchive { target, .. }
            | BuildError::ToolchainLink { target, .. } => Some(target),
            BuildError::WorkerPool { .. } => None,
        }
    }

    /// Toolchain output, verbatim.
    pub fn toolchain_output(&self) -> Option<&str> {
        match self {
            BuildError::ToolchainCompile { diagnostic, .. }
            | BuildError::ToolchainArchive { diagnostic, .. }
            | BuildError::ToolchainLink { diagnostic, .. } => Some(diagnostic),
            BuildError::WorkerPool { .. } => None,
        }
    }

    /// Name of the failed step.
    pub fn step(&self) -> &'static str {
        match self {
            BuildError::ToolchainCompile { .. } => "compile",
            BuildError::ToolchainArchive { .. } => "archive",
            BuildError::ToolchainLink { .. } => "link",
            BuildError::WorkerPool { .. } => "schedule",
        }
    }
}
