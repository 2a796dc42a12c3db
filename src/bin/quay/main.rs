//! Quay CLI - a declarative build graph for native C/C++ targets

use std::io::IsTerminal;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};
use quay::util::diagnostic::{emit, Diagnostic};
use quay::util::GlobalContext;
use quay::{BuildError, ConfigError};

fn main() {
    // Parse CLI
    let cli = Cli::parse();

    // Set up logging
    let filter = if cli.verbose {
        EnvFilter::new("quay=debug")
    } else {
        EnvFilter::new("quay=info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let color = !cli.no_color && std::io::stderr().is_terminal();

    if let Err(e) = run(cli, color) {
        report(&e, color);
        std::process::exit(1);
    }
}

fn run(cli: Cli, color: bool) -> Result<()> {
    let mut ctx = GlobalContext::new()?;
    ctx.set_verbose(cli.verbose);
    ctx.set_color(color);

    let manifest_path = cli.manifest_path.as_deref();

    // Execute command
    match cli.command {
        Commands::Check(args) => commands::check::execute(&ctx, manifest_path, args),
        Commands::Plan(args) => commands::plan::execute(&ctx, manifest_path, args),
        Commands::Build(args) => commands::build::execute(&ctx, manifest_path, args),
    }
}

/// Render an error, using the typed diagnostics where available.
fn report(err: &anyhow::Error, color: bool) {
    if let Some(config) = err.downcast_ref::<ConfigError>() {
        let mut diag = config.to_diagnostic();
        let outer = err.to_string();
        if outer != config.to_string() {
            diag = diag.with_context(outer);
        }
        emit(&diag, color);
    } else if let Some(build) = err.downcast_ref::<BuildError>() {
        // Toolchain output goes out unmodified, ahead of the summary line.
        if let Some(output) = build.toolchain_output() {
            eprint!("{}", output);
            if !output.is_empty() && !output.ends_with('\n') {
                eprintln!();
            }
        }
        emit(&Diagnostic::from_miette(build), color);
    } else {
        emit(&Diagnostic::error(format!("{:#}", err)), color);
    }
}
