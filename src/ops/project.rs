//! Loading a project and turning its descriptor into a build plan.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::builder::graph::{DependencyGraph, FinalizeOptions};
use crate::builder::plan::BuildPlan;
use crate::builder::sources::{SourceFs, SourceResolver};
use crate::core::descriptor::Descriptor;
use crate::core::error::ConfigError;
use crate::core::registry::TargetRegistry;
use crate::util::config::Config;
use crate::util::context::GlobalContext;

/// A loaded descriptor together with its merged configuration.
#[derive(Debug, Clone)]
pub struct Project {
    /// Path of `Quay.toml`
    pub descriptor_path: PathBuf,

    /// Directory containing the descriptor
    pub root: PathBuf,

    pub descriptor: Descriptor,

    pub config: Config,
}

impl Project {
    /// Load the descriptor at `manifest_path`, or the nearest one above cwd.
    pub fn load(ctx: &GlobalContext, manifest_path: Option<&Path>) -> Result<Self> {
        let descriptor_path = ctx.descriptor_path(manifest_path)?;
        let root = descriptor_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| ctx.cwd().to_path_buf());

        let descriptor = Descriptor::load(&descriptor_path)?;
        let config = ctx.load_config(&root);

        tracing::debug!(
            descriptor = %descriptor_path.display(),
            targets = descriptor.targets.len(),
            "loaded project"
        );

        Ok(Project {
            descriptor_path,
            root,
            descriptor,
            config,
        })
    }

    /// Declare every target and resolve its sources.
    pub fn configure(&self, fs: &dyn SourceFs) -> Result<TargetRegistry, ConfigError> {
        let mut registry = self.descriptor.configure(&self.root)?;
        SourceResolver::new(fs).resolve_all(&mut registry)?;
        Ok(registry)
    }

    /// Finalize options from config, with `transitive_defines` forced on when
    /// requested on the command line.
    pub fn finalize_options(&self, transitive_defines: bool) -> FinalizeOptions {
        FinalizeOptions {
            transitive_defines: transitive_defines
                || self.config.build.transitive_defines.unwrap_or(false),
        }
    }

    /// Configure, resolve and finalize into a plan.
    pub fn plan(&self, fs: &dyn SourceFs, options: FinalizeOptions) -> Result<BuildPlan> {
        let registry = self.configure(fs).with_context(|| {
            format!("failed to configure `{}`", self.descriptor_path.display())
        })?;

        let plan = DependencyGraph::finalize(&registry, options)?;
        tracing::info!(
            targets = plan.len(),
            sources = plan.source_count(),
            "finalized build plan"
        );
        Ok(plan)
    }
}
