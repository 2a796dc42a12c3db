//! Core data structures for Quay.
//!
//! This module contains the entity model of the build graph:
//! - Targets and their link dependencies
//! - The target registry
//! - Descriptor parsing
//! - Configuration and build errors

pub mod descriptor;
pub mod error;
pub mod registry;
pub mod target;

pub use descriptor::{Descriptor, DESCRIPTOR_NAME};
pub use error::{BuildError, ConfigError};
pub use registry::TargetRegistry;
pub use target::{Language, LinkDependency, Target, TargetId, TargetKind};
