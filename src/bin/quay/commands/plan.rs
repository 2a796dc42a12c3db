//! `quay plan` command

use std::path::Path;

use anyhow::Result;
use serde::Serialize;

use crate::cli::PlanArgs;
use quay::builder::{BuildPlan, GlobFs, LinkRef, PlannedTarget};
use quay::ops::Project;
use quay::util::GlobalContext;

/// JSON shape of `quay plan --json`.
#[derive(Serialize)]
struct PlanOutput<'a> {
    fingerprint: String,
    #[serde(flatten)]
    plan: &'a BuildPlan,
}

pub fn execute(ctx: &GlobalContext, manifest_path: Option<&Path>, args: PlanArgs) -> Result<()> {
    let project = Project::load(ctx, manifest_path)?;
    let plan = project.plan(&GlobFs, project.finalize_options(args.transitive_defines))?;

    if args.json {
        let output = PlanOutput {
            fingerprint: plan.fingerprint(),
            plan: &plan,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("fingerprint: {}", plan.fingerprint());
    for target in plan.targets() {
        print_target(target, &project.root);
    }

    Ok(())
}

fn print_target(target: &PlannedTarget, root: &Path) {
    println!();
    println!("{} ({})", target.name, target.kind);

    for source in &target.sources {
        let shown = source.strip_prefix(root).unwrap_or(source);
        println!("  source  {}", shown.display());
    }

    if !target.defines.is_empty() {
        println!("  defines {}", target.defines.join(" "));
    }

    if !target.dependencies.is_empty() {
        println!("  after   {}", target.dependencies.join(", "));
    }

    let links: Vec<String> = if target.link_line.is_empty() {
        target
            .link_dependencies
            .iter()
            .map(|dep| {
                if dep.is_external {
                    format!("-l{}", dep.library_name)
                } else {
                    dep.library_name.clone()
                }
            })
            .collect()
    } else {
        target
            .link_line
            .iter()
            .map(|item| match item {
                LinkRef::Target { name, .. } => name.clone(),
                LinkRef::External { name } => format!("-l{}", name),
            })
            .collect()
    };

    if !links.is_empty() {
        println!("  links   {}", links.join(" "));
    }
}
