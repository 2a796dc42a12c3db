//! Quay.toml descriptor parsing and schema.
//!
//! A descriptor declares targets and attaches link dependencies to them:
//!
//! ```toml
//! [[target]]
//! name = "mongocpp"
//! kind = "staticlib"
//! sources = ["*"]
//! defines = ["MONGO_BUILD_LIBRARY"]
//!
//! [[link]]
//! target = "mongocpp"
//! libraries = [
//!     { name = "mongoc", external = true },
//!     { name = "bson", external = true },
//! ]
//! ```
//!
//! Evaluating a descriptor only performs the mutation phase (declare, then
//! attach). Validation of internal references and cycles happens later, when
//! the registry is finalized.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::builder::link::LinkResolver;
use crate::core::error::ConfigError;
use crate::core::registry::TargetRegistry;
use crate::core::target::TargetKind;

/// Canonical descriptor file name.
pub const DESCRIPTOR_NAME: &str = "Quay.toml";

/// A parsed descriptor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Descriptor {
    /// Target declarations, in file order
    #[serde(default, rename = "target")]
    pub targets: Vec<TargetDecl>,

    /// Link declarations, applied after every target is declared
    #[serde(default, rename = "link")]
    pub links: Vec<LinkDecl>,
}

/// `[[target]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetDecl {
    pub name: String,

    pub kind: TargetKind,

    /// Source glob patterns, relative to `root`
    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default)]
    pub defines: Vec<String>,

    /// Source root, relative to the descriptor's directory
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// `[[link]]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LinkDecl {
    /// Name of the target the libraries are attached to
    pub target: String,

    pub libraries: Vec<LibraryDecl>,
}

/// One entry of `libraries`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LibraryDecl {
    pub name: String,

    /// Resolved by the platform linker instead of this graph
    #[serde(default)]
    pub external: bool,
}

impl Descriptor {
    /// Load and parse a descriptor file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read descriptor: {}", path.display()))?;

        Self::parse(&contents)
            .with_context(|| format!("failed to parse descriptor: {}", path.display()))
    }

    /// Parse descriptor text.
    pub fn parse(contents: &str) -> Result<Self> {
        let descriptor: Descriptor = toml::from_str(contents)?;
        Ok(descriptor)
    }

    /// Evaluate the descriptor into a fresh registry rooted at `root`.
    ///
    /// Targets are declared in file order first, then every `[[link]]`
    /// table is applied in file order.
    pub fn configure(&self, root: &Path) -> Result<TargetRegistry, ConfigError> {
        let mut registry = TargetRegistry::new(root);

        for decl in &self.targets {
            let target_root = match &decl.root {
                Some(dir) => root.join(dir),
                None => root.to_path_buf(),
            };
            registry.declare_in(
                target_root,
                &decl.name,
                decl.kind,
                decl.sources.iter().cloned(),
                decl.defines.iter().cloned(),
            )?;
        }

        for link in &self.links {
            let id = registry
                .id_of(&link.target)
                .ok_or_else(|| ConfigError::UnknownTarget {
                    name: link.target.clone(),
                })?;

            for library in &link.libraries {
                LinkResolver::add_link_dependency(
                    &mut registry,
                    id,
                    &library.name,
                    library.external,
                );
            }
        }

        tracing::debug!(targets = registry.len(), "evaluated descriptor");
        Ok(registry)
    }
}
