//! Quay - a declarative build graph for native C/C++ targets
//!
//! This crate provides the core library functionality for Quay: declaring
//! targets, resolving their sources and link dependencies, ordering them
//! into a build plan, and executing the plan through a toolchain.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

/// Test utilities and mocks for Quay unit tests.
///
/// This module is only available when compiling with `--cfg test` or
/// running tests. It provides an in-memory source tree and a recording
/// toolchain.
#[cfg(test)]
pub mod test_support;

pub use builder::{BuildDriver, BuildPlan, DependencyGraph, FinalizeOptions};
pub use core::{BuildError, ConfigError, Target, TargetId, TargetKind, TargetRegistry};
pub use util::context::GlobalContext;
