//! Toolchain abstraction - the compiler/archiver collaborator.
//!
//! The build driver never spawns processes itself. It hands a
//! [`CompileUnit`], [`ArchiveUnit`] or [`LinkUnit`] to a [`Toolchain`] and
//! gets artifacts or a [`ToolchainError`] back. Diagnostics in errors are the
//! toolchain's own output, unmodified.
//!
//! [`CommandToolchain`] drives GCC/Clang-style C and C++ compiler drivers and
//! `ar`.
//! Detection priority:
//! 1. `[toolchain]` settings in config
//! 2. Environment variables (`CC`, `CXX`, `AR`)
//! 3. Searching PATH for common tools

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use rayon::prelude::*;
use thiserror::Error;

use crate::core::target::{split_define, Language, TargetKind};
use crate::util::config::ToolchainSettings;
use crate::util::fs::{ensure_dir, object_path};
use crate::util::process::{find_executable, find_tool, ProcessBuilder};

/// Failure reported by a toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolchainError {
    #[error("{diagnostic}")]
    Compile { diagnostic: String },

    #[error("{diagnostic}")]
    Archive { diagnostic: String },

    #[error("{diagnostic}")]
    Link { diagnostic: String },
}

/// Input for compiling the sources of one target.
#[derive(Debug, Clone)]
pub struct CompileUnit<'a> {
    /// Target name, for diagnostics
    pub target: &'a str,
    /// Target root; object paths mirror the sources' layout under it
    pub root: &'a Path,
    /// Source files, sorted
    pub sources: &'a [PathBuf],
    /// Preprocessor defines (`NAME` or `NAME=VALUE`)
    pub defines: &'a [String],
    /// Directory for object files
    pub obj_dir: PathBuf,
}

/// Input for an archive step (creating a static library).
#[derive(Debug, Clone)]
pub struct ArchiveUnit<'a> {
    pub target: &'a str,
    /// Object files to archive
    pub objects: &'a [PathBuf],
    /// Output archive file
    pub output: PathBuf,
}

/// One input of a link step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkInput {
    /// Artifact of another target, passed by path
    Artifact(PathBuf),
    /// External library, passed as `-l<name>`
    Library(String),
}

/// Input for a link step (shared library or executable).
#[derive(Debug, Clone)]
pub struct LinkUnit<'a> {
    pub target: &'a str,
    pub kind: TargetKind,
    /// Driver to link with; C++ if any object, own or archived, is C++
    pub language: Language,
    /// Object files of the target itself
    pub objects: &'a [PathBuf],
    /// Libraries, in link order
    pub inputs: Vec<LinkInput>,
    /// Output file
    pub output: PathBuf,
}

/// Compiler/archiver/linker collaborator.
pub trait Toolchain: Send + Sync {
    /// Human-readable toolchain name.
    fn name(&self) -> String;

    /// Compile every source of a unit, returning the object files.
    fn compile(&self, unit: &CompileUnit<'_>) -> Result<Vec<PathBuf>, ToolchainError>;

    /// Archive object files into a static library.
    fn archive(&self, unit: &ArchiveUnit<'_>) -> Result<PathBuf, ToolchainError>;

    /// Link object files and libraries into a shared library or executable.
    fn link(&self, unit: &LinkUnit<'_>) -> Result<PathBuf, ToolchainError>;

    /// Object file extension.
    fn object_extension(&self) -> &str {
        if cfg!(windows) {
            "obj"
        } else {
            "o"
        }
    }

    /// Output file name for a target.
    fn output_filename(&self, name: &str, kind: TargetKind) -> String {
        kind.output_filename(name, std::env::consts::OS)
    }
}

/// GCC/Clang-style toolchain driven through subprocesses.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    /// C compiler driver
    pub cc: PathBuf,
    /// C++ compiler driver
    pub cxx: PathBuf,
    /// Archiver
    pub ar: PathBuf,
    /// Extra compiler flags
    pub cflags: Vec<String>,
}

impl CommandToolchain {
    /// Create a toolchain from explicit tool paths, with the C++ driver
    /// inferred from `cc`.
    pub fn new(cc: impl Into<PathBuf>, ar: impl Into<PathBuf>) -> Self {
        let cc = cc.into();
        CommandToolchain {
            cxx: Self::infer_cxx(&cc),
            cc,
            ar: ar.into(),
            cflags: Vec::new(),
        }
    }

    /// Use an explicit C++ driver.
    pub fn with_cxx(mut self, cxx: impl Into<PathBuf>) -> Self {
        self.cxx = cxx.into();
        self
    }

    /// Infer the C++ driver from the C driver.
    ///
    /// - gcc, x86_64-linux-gnu-gcc -> g++, x86_64-linux-gnu-g++
    /// - clang -> clang++
    /// - cc, /usr/bin/cc -> c++, /usr/bin/c++
    pub fn infer_cxx(cc: &Path) -> PathBuf {
        let cc_str = cc.to_string_lossy();

        if let Some(prefix) = cc_str.strip_suffix("gcc") {
            return PathBuf::from(format!("{}g++", prefix));
        }

        if cc_str.ends_with("clang") {
            return PathBuf::from(format!("{}++", cc_str));
        }

        // Only a whole "cc" basename, not "mycc"
        let is_standalone_cc = cc_str == "cc"
            || cc_str.ends_with("/cc")
            || cc_str.ends_with("\\cc")
            || cc_str.ends_with("-cc");

        if is_standalone_cc {
            return PathBuf::from(format!("{}++", &cc_str[..cc_str.len() - 1]));
        }

        PathBuf::from(format!("{}++", cc_str))
    }

    /// Driver for a language.
    pub fn driver(&self, language: Language) -> &Path {
        match language {
            Language::C => &self.cc,
            Language::Cxx => &self.cxx,
        }
    }

    /// Add extra compiler flags.
    pub fn with_cflags(mut self, cflags: Vec<String>) -> Self {
        self.cflags = cflags;
        self
    }

    /// Detect the toolchain from settings, environment and PATH.
    pub fn detect(settings: &ToolchainSettings) -> Result<Self> {
        let Some(cc) = find_tool(settings.cc.as_deref(), "CC", &["cc", "gcc", "clang"]) else {
            bail!(
                "no C compiler found\n\
                 \n\
                 Set the CC environment variable, configure `[toolchain] cc` in\n\
                 .quay/config.toml, or install a compiler."
            );
        };

        let Some(ar) = find_tool(settings.ar.as_deref(), "AR", &["ar", "llvm-ar"]) else {
            bail!(
                "no archiver found\n\
                 \n\
                 Set the AR environment variable or configure `[toolchain] ar`."
            );
        };

        let cxx = match find_tool(settings.cxx.as_deref(), "CXX", &[]) {
            Some(cxx) => cxx,
            None => {
                let inferred = Self::infer_cxx(&cc);
                find_executable(&inferred.to_string_lossy()).unwrap_or_else(|| {
                    tracing::debug!(
                        "no C++ driver `{}` found, compiling C++ with `{}`",
                        inferred.display(),
                        cc.display()
                    );
                    cc.clone()
                })
            }
        };

        tracing::debug!(
            cc = %cc.display(),
            cxx = %cxx.display(),
            ar = %ar.display(),
            "detected toolchain"
        );
        Ok(CommandToolchain::new(cc, ar)
            .with_cxx(cxx)
            .with_cflags(settings.cflags.clone()))
    }

    /// Command compiling one source file to one object file, with the
    /// driver of the source's language.
    pub fn compile_command(&self, source: &Path, object: &Path, defines: &[String]) -> ProcessBuilder {
        let language = Language::of(source).unwrap_or(Language::C);
        let mut cmd = ProcessBuilder::new(self.driver(language)).arg("-c");

        for define in defines {
            cmd = match split_define(define) {
                (name, Some(value)) => cmd.arg(format!("-D{}={}", name, value)),
                (name, None) => cmd.arg(format!("-D{}", name)),
            };
        }

        cmd.args(&self.cflags).arg(source).arg("-o").arg(object)
    }

    /// Command creating a static archive.
    pub fn archive_command(&self, objects: &[PathBuf], output: &Path) -> ProcessBuilder {
        ProcessBuilder::new(&self.ar)
            .arg("rcs")
            .arg(output)
            .args(objects)
    }

    /// Command linking a shared library or executable.
    pub fn link_command(&self, unit: &LinkUnit<'_>) -> ProcessBuilder {
        let mut cmd = ProcessBuilder::new(self.driver(unit.language));
        if unit.kind == TargetKind::SharedLibrary {
            cmd = cmd.arg("-shared");
        }

        cmd = cmd.arg("-o").arg(&unit.output).args(unit.objects);

        for input in &unit.inputs {
            cmd = match input {
                LinkInput::Artifact(path) => cmd.arg(path),
                LinkInput::Library(name) => cmd.arg(format!("-l{}", name)),
            };
        }

        cmd
    }
}

/// Run a command, mapping spawn failures and non-zero exits through `err`.
fn run(cmd: &ProcessBuilder, err: fn(String) -> ToolchainError) -> Result<(), ToolchainError> {
    let output = cmd.exec().map_err(|e| err(format!("{:#}", e)))?;

    if !output.status.success() {
        let mut diagnostic = String::from_utf8_lossy(&output.stderr).into_owned();
        if diagnostic.trim().is_empty() {
            diagnostic = format!(
                "`{}` exited with {}",
                cmd.display_command(),
                output.status
            );
        }
        return Err(err(diagnostic));
    }

    Ok(())
}

fn prepare_parent(path: &Path, err: fn(String) -> ToolchainError) -> Result<(), ToolchainError> {
    match path.parent() {
        Some(parent) => ensure_dir(parent).map_err(|e| err(format!("{:#}", e))),
        None => Ok(()),
    }
}

fn compile_error(diagnostic: String) -> ToolchainError {
    ToolchainError::Compile { diagnostic }
}

fn archive_error(diagnostic: String) -> ToolchainError {
    ToolchainError::Archive { diagnostic }
}

fn link_error(diagnostic: String) -> ToolchainError {
    ToolchainError::Link { diagnostic }
}

impl Toolchain for CommandToolchain {
    fn name(&self) -> String {
        self.cc.display().to_string()
    }

    fn compile(&self, unit: &CompileUnit<'_>) -> Result<Vec<PathBuf>, ToolchainError> {
        let ext = self.object_extension();

        unit.sources
            .par_iter()
            .map(|source| {
                let object = object_path(&unit.obj_dir, unit.root, source, ext);
                prepare_parent(&object, compile_error)?;

                tracing::debug!(
                    target = unit.target,
                    "Compiling {} -> {}",
                    source.display(),
                    object.display()
                );
                run(&self.compile_command(source, &object, unit.defines), compile_error)?;
                Ok(object)
            })
            .collect()
    }

    fn archive(&self, unit: &ArchiveUnit<'_>) -> Result<PathBuf, ToolchainError> {
        prepare_parent(&unit.output, archive_error)?;

        // `ar rcs` appends to an existing archive
        if unit.output.exists() {
            std::fs::remove_file(&unit.output).map_err(|e| {
                archive_error(format!(
                    "failed to remove stale archive {}: {}",
                    unit.output.display(),
                    e
                ))
            })?;
        }

        tracing::debug!(target = unit.target, "Creating static library {}", unit.output.display());
        run(&self.archive_command(unit.objects, &unit.output), archive_error)?;
        Ok(unit.output.clone())
    }

    fn link(&self, unit: &LinkUnit<'_>) -> Result<PathBuf, ToolchainError> {
        prepare_parent(&unit.output, link_error)?;

        tracing::debug!(target = unit.target, "Linking {} {}", unit.kind, unit.output.display());
        run(&self.link_command(unit), link_error)?;
        Ok(unit.output.clone())
    }
}
