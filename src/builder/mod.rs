//! Build graph and execution.
//!
//! Source resolution, link resolution, graph finalization into a plan, and
//! the parallel driver that executes the plan through a toolchain.

pub mod driver;
pub mod events;
pub mod graph;
pub mod link;
pub mod plan;
pub mod sources;
pub mod toolchain;

pub use driver::{Artifact, BuildDriver, BuildOutcome, BuildReport};
pub use events::BuildEvent;
pub use graph::{DependencyGraph, FinalizeOptions};
pub use link::{LinkRef, LinkResolver};
pub use plan::{BuildPlan, PlannedTarget};
pub use sources::{GlobFs, SourceFs, SourceResolver};
pub use toolchain::{CommandToolchain, Toolchain, ToolchainError};
