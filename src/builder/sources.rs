//! Source resolution - expands a target's glob patterns into files.
//!
//! Filesystem access goes through the [`SourceFs`] trait so resolution can be
//! exercised against an in-memory tree. [`GlobFs`] is the real
//! implementation.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::error::ConfigError;
use crate::core::registry::TargetRegistry;
use crate::core::target::{Language, TargetId};
use crate::util::fs::glob_files;

/// A glob pattern that could not be compiled.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct PatternError {
    pub message: String,
}

/// Glob expansion collaborator.
pub trait SourceFs: Send + Sync {
    /// Expand `pattern` relative to `root`, returning the matching files.
    ///
    /// Directories never match. Order is unspecified.
    fn expand(&self, root: &Path, pattern: &str) -> Result<Vec<PathBuf>, PatternError>;
}

/// Glob expansion against the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobFs;

impl SourceFs for GlobFs {
    fn expand(&self, root: &Path, pattern: &str) -> Result<Vec<PathBuf>, PatternError> {
        glob_files(root, pattern).map_err(|e| PatternError {
            message: e.msg.to_string(),
        })
    }
}

/// Resolves source patterns of registry targets.
pub struct SourceResolver<'a> {
    fs: &'a dyn SourceFs,
}

impl<'a> SourceResolver<'a> {
    /// Create a resolver backed by `fs`.
    pub fn new(fs: &'a dyn SourceFs) -> Self {
        SourceResolver { fs }
    }

    /// Resolve the sources of one target.
    ///
    /// Patterns are expanded independently and unioned; only compilable
    /// sources (see [`Language::of`]) are kept, deduplicated and sorted. An already-resolved target returns its
    /// stored set without consulting the filesystem again.
    pub fn resolve<'r>(
        &self,
        registry: &'r mut TargetRegistry,
        id: TargetId,
    ) -> Result<&'r [PathBuf], ConfigError> {
        if registry.get(id).is_resolved() {
            let target = registry.get(id);
            tracing::debug!(target = %target.name, "sources already resolved");
            return Ok(target.resolved_sources().unwrap_or_default());
        }

        let target = registry.get(id);
        let mut files = BTreeSet::new();

        for pattern in &target.source_patterns {
            let matches =
                self.fs
                    .expand(&target.root, pattern)
                    .map_err(|e| ConfigError::InvalidPattern {
                        target: target.name.clone(),
                        pattern: pattern.clone(),
                        message: e.message,
                    })?;

            let total = matches.len();
            let before = files.len();
            files.extend(matches.into_iter().filter(|f| Language::of(f).is_some()));

            tracing::debug!(
                target = %target.name,
                pattern = %pattern,
                matched = total,
                added = files.len() - before,
                "expanded source pattern"
            );
        }

        if files.is_empty() {
            return Err(ConfigError::EmptySourceSet {
                target: target.name.clone(),
                patterns: target.source_patterns.clone(),
            });
        }

        let target = registry.get_mut(id);
        Ok(target
            .resolved_sources
            .insert(files.into_iter().collect())
            .as_slice())
    }

    /// Resolve every target in declaration order, stopping at the first error.
    pub fn resolve_all(&self, registry: &mut TargetRegistry) -> Result<(), ConfigError> {
        let ids: Vec<_> = registry.ids().collect();
        for id in ids {
            self.resolve(registry, id)?;
        }
        Ok(())
    }
}
