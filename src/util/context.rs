//! Global context for Quay operations.
//!
//! Provides centralized access to the working directory, output settings and
//! configuration paths.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

use crate::core::descriptor::DESCRIPTOR_NAME;
use crate::util::config::{self, Config};

/// Global context for Quay operations.
#[derive(Debug, Clone)]
pub struct GlobalContext {
    /// Current working directory
    cwd: PathBuf,

    /// Whether to use verbose output
    verbose: bool,

    /// Whether to use colors in output
    color: bool,
}

impl GlobalContext {
    /// Create a new GlobalContext rooted at the process working directory.
    pub fn new() -> Result<Self> {
        let cwd = std::env::current_dir().context("failed to get current directory")?;
        Ok(Self::with_cwd(cwd))
    }

    /// Create a GlobalContext with a specific working directory.
    pub fn with_cwd(cwd: PathBuf) -> Self {
        GlobalContext {
            cwd,
            verbose: false,
            color: true,
        }
    }

    /// Set verbose mode.
    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Set color output.
    pub fn set_color(&mut self, color: bool) {
        self.color = color;
    }

    /// Get the current working directory.
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    /// Check if verbose mode is enabled.
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }

    /// Check if color output is enabled.
    pub fn color(&self) -> bool {
        self.color
    }

    /// Find `Quay.toml`, starting from cwd and searching upward.
    pub fn find_descriptor(&self) -> Result<PathBuf> {
        let mut dir = self.cwd.as_path();

        loop {
            let candidate = dir.join(DESCRIPTOR_NAME);
            if candidate.is_file() {
                return Ok(candidate);
            }

            match dir.parent() {
                Some(parent) => dir = parent,
                None => bail!(
                    "could not find `{}` in `{}` or any parent directory",
                    DESCRIPTOR_NAME,
                    self.cwd.display()
                ),
            }
        }
    }

    /// Resolve an explicit descriptor path against cwd, or search for one.
    pub fn descriptor_path(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        match explicit {
            Some(path) => {
                let path = self.cwd.join(path);
                if !path.is_file() {
                    bail!("descriptor `{}` does not exist", path.display());
                }
                Ok(path)
            }
            None => self.find_descriptor(),
        }
    }

    /// Get the global configuration file path (~/.quay/config.toml).
    pub fn global_config_path(&self) -> Option<PathBuf> {
        config::global_config_path()
    }

    /// Get the project-local Quay directory.
    pub fn project_quay_dir(project_root: &Path) -> PathBuf {
        project_root.join(".quay")
    }

    /// Default output directory for a project.
    pub fn default_out_dir(project_root: &Path) -> PathBuf {
        Self::project_quay_dir(project_root).join("build")
    }

    /// Load the merged global and project configuration.
    pub fn load_config(&self, project_root: &Path) -> Config {
        let global = self.global_config_path();
        config::load_config(
            global.as_deref(),
            &config::project_config_path(project_root),
        )
    }
}
