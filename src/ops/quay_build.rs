//! Implementation of `quay build`.

use std::path::PathBuf;

use anyhow::Result;

use crate::builder::driver::{BuildDriver, BuildReport, EventSink};
use crate::builder::plan::BuildPlan;
use crate::builder::sources::SourceFs;
use crate::builder::toolchain::Toolchain;
use crate::ops::project::Project;
use crate::util::context::GlobalContext;

/// Options for the build command.
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Number of parallel jobs (None = config, then available parallelism)
    pub jobs: Option<usize>,

    /// Output directory (None = config, then `.quay/build`)
    pub out_dir: Option<PathBuf>,

    /// Propagate defines from internal dependencies
    pub transitive_defines: bool,
}

impl BuildOptions {
    /// Effective worker count after applying config.
    pub fn effective_jobs(&self, project: &Project) -> Option<usize> {
        self.jobs.or(project.config.build.jobs)
    }

    /// Effective output directory after applying config.
    ///
    /// Relative paths are taken relative to the project root.
    pub fn effective_out_dir(&self, project: &Project) -> PathBuf {
        match self.out_dir.as_ref().or(project.config.build.out_dir.as_ref()) {
            Some(dir) => project.root.join(dir),
            None => GlobalContext::default_out_dir(&project.root),
        }
    }
}

/// Result of a build.
#[derive(Debug)]
pub struct BuildResult {
    /// The plan that was executed
    pub plan: BuildPlan,

    pub report: BuildReport,

    /// Where outputs were written
    pub out_dir: PathBuf,
}

/// Plan and build a project.
///
/// Configuration errors surface as [`ConfigError`](crate::core::ConfigError)
/// and build failures as [`BuildError`](crate::core::BuildError) inside the
/// returned error.
pub fn build(
    project: &Project,
    fs: &dyn SourceFs,
    toolchain: &dyn Toolchain,
    opts: &BuildOptions,
    events: Option<EventSink<'_>>,
) -> Result<BuildResult> {
    let plan = project.plan(fs, project.finalize_options(opts.transitive_defines))?;
    let out_dir = opts.effective_out_dir(project);

    let mut driver = BuildDriver::new(toolchain, &out_dir);
    if let Some(jobs) = opts.effective_jobs(project) {
        driver = driver.with_jobs(jobs);
    }
    if let Some(events) = events {
        driver = driver.with_events(events);
    }

    tracing::debug!(out_dir = %out_dir.display(), jobs = driver.jobs(), "starting build");
    let report = driver.execute(&plan)?;

    Ok(BuildResult {
        plan,
        report,
        out_dir,
    })
}
