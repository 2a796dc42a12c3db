//! `quay build` command

use std::path::Path;

use anyhow::Result;
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::{BuildArgs, MessageFormat};
use quay::builder::{BuildEvent, CommandToolchain, GlobFs};
use quay::ops::{build, BuildOptions, Project};
use quay::util::GlobalContext;

pub fn execute(ctx: &GlobalContext, manifest_path: Option<&Path>, args: BuildArgs) -> Result<()> {
    let project = Project::load(ctx, manifest_path)?;

    // Message format: CLI > config > human
    let format = match args.message_format {
        Some(format) => format,
        None => match project.config.build.message_format.as_deref() {
            Some(name) => MessageFormat::from_str(name, true).map_err(|e| {
                anyhow::anyhow!("invalid `build.message_format` in config: {}", e)
            })?,
            None => MessageFormat::Human,
        },
    };

    let toolchain = CommandToolchain::detect(&project.config.toolchain)?;

    let opts = BuildOptions {
        jobs: args.jobs,
        out_dir: args.out_dir,
        transitive_defines: args.transitive_defines,
    };

    let result = match format {
        MessageFormat::Json => {
            let sink = |event: &BuildEvent| println!("{}", event.to_json());
            build(&project, &GlobFs, &toolchain, &opts, Some(&sink))?
        }
        MessageFormat::Human => {
            let pb = if ctx.is_verbose() {
                ProgressBar::hidden()
            } else {
                ProgressBar::new(0)
            };
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                    .progress_chars("#>-"),
            );

            let sink = |event: &BuildEvent| human_event(&pb, event);
            let result = build(&project, &GlobFs, &toolchain, &opts, Some(&sink));
            pb.finish_and_clear();
            result?
        }
    };

    if format == MessageFormat::Human {
        for artifact in &result.report.artifacts {
            eprintln!(
                "    Finished `{}` -> {}",
                artifact.target,
                artifact.path.display()
            );
        }
        eprintln!(
            "    Finished {} target(s) in {:.2}s",
            result.report.artifacts.len(),
            result.report.duration.as_secs_f64()
        );
    }

    Ok(())
}

fn human_event(pb: &ProgressBar, event: &BuildEvent) {
    match event {
        BuildEvent::BuildStarted { target_count, .. } => {
            pb.set_length(*target_count as u64);
        }
        BuildEvent::TargetStarted { target, kind, .. } => {
            pb.suspend(|| eprintln!("   Compiling {} ({})", target, kind));
            pb.set_message(target.clone());
        }
        BuildEvent::TargetArtifact { .. } => pb.inc(1),
        BuildEvent::TargetFailed { .. } | BuildEvent::BuildFinished { .. } => {}
    }
}
