//! High-level operations.
//!
//! This module contains the implementation of Quay commands.

pub mod project;
pub mod quay_build;

pub use project::Project;
pub use quay_build::{build, BuildOptions, BuildResult};
