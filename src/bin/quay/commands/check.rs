//! `quay check` command

use std::path::Path;

use anyhow::Result;

use crate::cli::CheckArgs;
use quay::builder::GlobFs;
use quay::ops::Project;
use quay::util::diagnostic::{emit, Diagnostic};
use quay::util::GlobalContext;

pub fn execute(ctx: &GlobalContext, manifest_path: Option<&Path>, args: CheckArgs) -> Result<()> {
    let project = Project::load(ctx, manifest_path)?;
    let plan = project.plan(&GlobFs, project.finalize_options(args.transitive_defines))?;

    if plan.is_empty() {
        let diag = Diagnostic::warning(format!(
            "`{}` declares no targets",
            project.descriptor_path.display()
        ));
        emit(&diag, ctx.color());
    }

    for (position, target) in plan.targets().iter().enumerate() {
        println!(
            "{}. {} ({}, {} source{})",
            position + 1,
            target.name,
            target.kind,
            target.sources.len(),
            if target.sources.len() == 1 { "" } else { "s" }
        );
    }

    eprintln!("    Finished checking {} target(s)", plan.len());
    Ok(())
}
