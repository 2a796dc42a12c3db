//! Target registry - the single source of truth for target identity.
//!
//! A registry lives for one configuration-and-build cycle. It is created
//! empty, filled while a descriptor is evaluated, and then handed by
//! reference to the source resolver, link resolver and graph finalizer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::error::ConfigError;
use crate::core::target::{Target, TargetId, TargetKind};

/// All targets declared for one configuration run.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    /// Root that plain `declare` calls resolve source patterns against
    default_root: PathBuf,

    /// Targets in declaration order; `TargetId` indexes this
    targets: Vec<Target>,

    /// Name to handle lookup
    by_name: HashMap<String, TargetId>,
}

impl TargetRegistry {
    /// Create an empty registry whose targets default to `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        TargetRegistry {
            default_root: root.into(),
            targets: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Default root directory for declared targets.
    pub fn default_root(&self) -> &Path {
        &self.default_root
    }

    /// Declare a target rooted at the registry's default root.
    pub fn declare<P, D>(
        &mut self,
        name: &str,
        kind: TargetKind,
        source_patterns: P,
        defines: D,
    ) -> Result<TargetId, ConfigError>
    where
        P: IntoIterator,
        P::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        let root = self.default_root.clone();
        self.declare_in(root, name, kind, source_patterns, defines)
    }

    /// Declare a target whose source patterns are relative to `root`.
    ///
    /// Fails with [`ConfigError::DuplicateTarget`] if `name` is taken; the
    /// registry is left untouched in that case.
    pub fn declare_in<P, D>(
        &mut self,
        root: impl Into<PathBuf>,
        name: &str,
        kind: TargetKind,
        source_patterns: P,
        defines: D,
    ) -> Result<TargetId, ConfigError>
    where
        P: IntoIterator,
        P::Item: Into<String>,
        D: IntoIterator,
        D::Item: Into<String>,
    {
        if self.by_name.contains_key(name) {
            return Err(ConfigError::DuplicateTarget {
                name: name.to_string(),
            });
        }

        let target = Target::new(name, kind, root)
            .with_sources(source_patterns)
            .with_defines(defines);

        let id = TargetId(self.targets.len());
        tracing::debug!(target = name, kind = %kind, "declared target");

        self.by_name.insert(name.to_string(), id);
        self.targets.push(target);
        Ok(id)
    }

    /// Look up a target by name.
    pub fn lookup(&self, name: &str) -> Result<&Target, ConfigError> {
        self.id_of(name)
            .map(|id| self.get(id))
            .ok_or_else(|| ConfigError::UnknownTarget {
                name: name.to_string(),
            })
    }

    /// Get the handle of a target by name.
    pub fn id_of(&self, name: &str) -> Option<TargetId> {
        self.by_name.get(name).copied()
    }

    /// Get a target by handle.
    ///
    /// # Panics
    ///
    /// Panics if `id` was issued by a different registry.
    pub fn get(&self, id: TargetId) -> &Target {
        &self.targets[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: TargetId) -> &mut Target {
        &mut self.targets[id.0]
    }

    /// Check if a target with the given name is declared.
    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Iterate over targets in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (TargetId, &Target)> {
        self.targets
            .iter()
            .enumerate()
            .map(|(idx, target)| (TargetId(idx), target))
    }

    /// Handles of all targets, in declaration order.
    pub fn ids(&self) -> impl Iterator<Item = TargetId> {
        (0..self.targets.len()).map(TargetId)
    }

    /// Names of all targets, in declaration order.
    pub fn names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name.as_str()).collect()
    }

    /// Get the number of targets.
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}
