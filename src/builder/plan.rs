//! Build plan - the frozen output of graph finalization.
//!
//! A BuildPlan lists every target in an order where each one appears after
//! all targets it depends on. Each entry is a snapshot taken at finalize
//! time; later changes to the registry do not affect an existing plan.

use std::path::PathBuf;

use serde::Serialize;

use crate::builder::link::LinkRef;
use crate::core::target::{Language, LinkDependency, TargetId, TargetKind};
use crate::util::hash::Fingerprint;

/// A complete, ordered build plan.
#[derive(Debug, Clone, Serialize)]
pub struct BuildPlan {
    /// Targets in build order
    pub(crate) targets: Vec<PlannedTarget>,

    /// Whether defines were propagated from dependencies
    pub transitive_defines: bool,
}

/// One target of a build plan.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedTarget {
    /// Handle in the registry the plan was finalized from
    pub id: TargetId,

    pub name: String,

    pub kind: TargetKind,

    /// Source root
    pub root: PathBuf,

    /// Resolved, sorted source files
    pub sources: Vec<PathBuf>,

    /// Effective defines for compiling this target's sources
    pub defines: Vec<String>,

    /// Declared link dependencies, in declaration order
    pub link_dependencies: Vec<LinkDependency>,

    /// Names of internal dependencies, in declaration order
    pub dependencies: Vec<String>,

    /// Ordered link inputs; empty for static libraries
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub link_line: Vec<LinkRef>,

    /// Plan position of each link dependency (`None` for external ones)
    #[serde(skip)]
    pub(crate) link_positions: Vec<Option<usize>>,

    /// Plan positions of internal dependencies
    #[serde(skip)]
    pub(crate) dependency_positions: Vec<usize>,

    /// Plan positions of targets that depend on this one
    #[serde(skip)]
    pub(crate) dependent_positions: Vec<usize>,
}

impl BuildPlan {
    /// Targets in build order.
    pub fn targets(&self) -> &[PlannedTarget] {
        &self.targets
    }

    /// Names in build order.
    pub fn build_order(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }

    /// Position of a target in the build order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.targets.iter().position(|t| t.name == name)
    }

    /// Get a planned target by name.
    pub fn get(&self, name: &str) -> Option<&PlannedTarget> {
        self.position(name).map(|idx| &self.targets[idx])
    }

    /// Number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Driver language for linking `target`.
    ///
    /// C++ when any of its own sources, or of a static archive on its link
    /// line, is C++; the C driver does not pull in the C++ runtime.
    pub fn link_language(&self, target: &PlannedTarget) -> Language {
        let archives = target
            .link_line
            .iter()
            .filter_map(|item| match item {
                LinkRef::Target { position, .. } => self.targets.get(*position),
                LinkRef::External { .. } => None,
            })
            .filter(|t| t.kind == TargetKind::StaticLibrary);

        let any_cxx = std::iter::once(target)
            .chain(archives)
            .flat_map(|t| &t.sources)
            .any(|source| Language::of(source) == Some(Language::Cxx));

        if any_cxx {
            Language::Cxx
        } else {
            Language::C
        }
    }

    /// Total number of source files across all targets.
    pub fn source_count(&self) -> usize {
        self.targets.iter().map(|t| t.sources.len()).sum()
    }

    /// Content fingerprint of the plan.
    ///
    /// Identical registries finalize to identical fingerprints, since build
    /// order and source lists are deterministic.
    pub fn fingerprint(&self) -> String {
        let mut fp = Fingerprint::new();
        fp.update_bool(self.transitive_defines);

        for target in &self.targets {
            fp.update_str(&target.name)
                .update_str(target.kind.as_str())
                .update_path(&target.root);

            fp.update_strs(target.defines.iter().map(String::as_str));
            fp.update_strs(
                target
                    .link_dependencies
                    .iter()
                    .map(|d| d.library_name.as_str()),
            );
            for dep in &target.link_dependencies {
                fp.update_bool(dep.is_external);
            }
            for source in &target.sources {
                fp.update_path(source);
            }
        }

        fp.finish()
    }
}

impl PlannedTarget {
    /// Whether this target has no internal dependencies.
    pub fn is_leaf(&self) -> bool {
        self.dependency_positions.is_empty()
    }
}
