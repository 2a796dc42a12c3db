//! Test utilities and mocks for Quay unit tests.
//!
//! Provides in-memory stand-ins for the two collaborators the build graph
//! talks to, plus ready-made registries.
//!
//! # Example
//!
//! ```rust,ignore
//! use quay::test_support::{MockSourceFs, RecordingToolchain};
//!
//! let mut fs = MockSourceFs::new();
//! fs.add_file("/mongo/Mongo.cpp");
//!
//! let toolchain = RecordingToolchain::new().fail_compile("app", "app.c:1: error");
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use glob::Pattern;

use crate::builder::link::LinkResolver;
use crate::builder::sources::{PatternError, SourceFs, SourceResolver};
use crate::builder::toolchain::{
    ArchiveUnit, CompileUnit, LinkInput, LinkUnit, Toolchain, ToolchainError,
};
use crate::core::registry::TargetRegistry;
use crate::core::target::{Language, TargetKind};
use crate::util::fs::{rooted_pattern, source_match_options};

/// In-memory source tree.
///
/// Only files are stored; a pattern matches a file when the glob, joined to
/// the escaped root, matches its full path.
#[derive(Debug, Default)]
pub struct MockSourceFs {
    files: BTreeSet<PathBuf>,
    expand_calls: AtomicUsize,
}

impl MockSourceFs {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file.
    pub fn add_file(&mut self, path: impl AsRef<Path>) {
        self.files.insert(path.as_ref().to_path_buf());
    }

    /// Number of `expand` calls made so far.
    pub fn expand_calls(&self) -> usize {
        self.expand_calls.load(Ordering::SeqCst)
    }
}

impl SourceFs for MockSourceFs {
    fn expand(&self, root: &Path, pattern: &str) -> Result<Vec<PathBuf>, PatternError> {
        self.expand_calls.fetch_add(1, Ordering::SeqCst);

        let compiled = Pattern::new(&rooted_pattern(root, pattern)).map_err(|e| PatternError {
            message: e.msg.to_string(),
        })?;

        let options = source_match_options();
        Ok(self
            .files
            .iter()
            .filter(|f| compiled.matches_path_with(f, options))
            .cloned()
            .collect())
    }
}

/// A call made to a [`RecordingToolchain`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolchainCall {
    Compile {
        target: String,
        sources: Vec<PathBuf>,
        defines: Vec<String>,
    },
    Archive {
        target: String,
        objects: Vec<PathBuf>,
        output: PathBuf,
    },
    Link {
        target: String,
        language: Language,
        inputs: Vec<LinkInput>,
        output: PathBuf,
    },
}

impl ToolchainCall {
    /// Target the call was made for.
    pub fn target(&self) -> &str {
        match self {
            ToolchainCall::Compile { target, .. }
            | ToolchainCall::Archive { target, .. }
            | ToolchainCall::Link { target, .. } => target,
        }
    }
}

/// Lifecycle step of a target, in the order steps happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Compilation began
    Started(String),
    /// Archive or link returned successfully
    Finished(String),
}

/// Toolchain that records every call and produces fake artifacts.
///
/// Compilation of a target can be made to fail, and compiles can be slowed
/// down to widen scheduling windows.
#[derive(Debug, Default)]
pub struct RecordingToolchain {
    calls: Mutex<Vec<ToolchainCall>>,
    steps: Mutex<Vec<Step>>,
    failures: HashMap<String, String>,
    delay: Duration,
    target_delays: HashMap<String, Duration>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingToolchain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail compilation of `target` with `diagnostic`.
    pub fn fail_compile(mut self, target: &str, diagnostic: &str) -> Self {
        self.failures
            .insert(target.to_string(), diagnostic.to_string());
        self
    }

    /// Sleep this long in every compile.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sleep this long when compiling `target`, overriding the default delay.
    pub fn with_target_delay(mut self, target: &str, delay: Duration) -> Self {
        self.target_delays.insert(target.to_string(), delay);
        self
    }

    /// All calls, in the order they were made.
    pub fn calls(&self) -> Vec<ToolchainCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls of the compile kind.
    pub fn compile_calls(&self) -> Vec<ToolchainCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, ToolchainCall::Compile { .. }))
            .collect()
    }

    /// Target lifecycle steps, in the order they happened.
    pub fn steps(&self) -> Vec<Step> {
        self.steps.lock().unwrap().clone()
    }

    /// Names of targets whose compilation started.
    pub fn started(&self) -> Vec<String> {
        self.steps()
            .into_iter()
            .filter_map(|s| match s {
                Step::Started(name) => Some(name),
                Step::Finished(_) => None,
            })
            .collect()
    }

    /// Highest number of compiles that ran at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn record(&self, call: ToolchainCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn step(&self, step: Step) {
        self.steps.lock().unwrap().push(step);
    }
}

impl Toolchain for RecordingToolchain {
    fn name(&self) -> String {
        "recording".to_string()
    }

    fn compile(&self, unit: &CompileUnit<'_>) -> Result<Vec<PathBuf>, ToolchainError> {
        self.step(Step::Started(unit.target.to_string()));
        self.record(ToolchainCall::Compile {
            target: unit.target.to_string(),
            sources: unit.sources.to_vec(),
            defines: unit.defines.to_vec(),
        });

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);

        let delay = self
            .target_delays
            .get(unit.target)
            .copied()
            .unwrap_or(self.delay);
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        if let Some(diagnostic) = self.failures.get(unit.target) {
            return Err(ToolchainError::Compile {
                diagnostic: diagnostic.clone(),
            });
        }

        Ok(unit
            .sources
            .iter()
            .map(|source| {
                let name = source
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                unit.obj_dir.join(format!("{}.o", name))
            })
            .collect())
    }

    fn archive(&self, unit: &ArchiveUnit<'_>) -> Result<PathBuf, ToolchainError> {
        self.record(ToolchainCall::Archive {
            target: unit.target.to_string(),
            objects: unit.objects.to_vec(),
            output: unit.output.clone(),
        });
        self.step(Step::Finished(unit.target.to_string()));
        Ok(unit.output.clone())
    }

    fn link(&self, unit: &LinkUnit<'_>) -> Result<PathBuf, ToolchainError> {
        self.record(ToolchainCall::Link {
            target: unit.target.to_string(),
            language: unit.language,
            inputs: unit.inputs.clone(),
            output: unit.output.clone(),
        });
        self.step(Step::Finished(unit.target.to_string()));
        Ok(unit.output.clone())
    }
}

/// Build a resolved registry from `(name, kind, links)` rows.
///
/// Each target is rooted at `/project/<name>` with a single `<name>.c`.
/// Links are `(library, is_external)` pairs, attached after every target is
/// declared so rows may refer forward.
pub fn registry_with(rows: &[(&str, TargetKind, &[(&str, bool)])]) -> TargetRegistry {
    let mut fs = MockSourceFs::new();
    let mut registry = TargetRegistry::new("/project");

    for (name, kind, _) in rows {
        let root = PathBuf::from("/project").join(name);
        fs.add_file(root.join(format!("{}.c", name)));
        registry
            .declare_in(root, name, *kind, ["*.c"], Vec::<String>::new())
            .unwrap();
    }

    for (name, _, links) in rows {
        let id = registry.id_of(name).unwrap();
        for (library, external) in links.iter() {
            LinkResolver::add_link_dependency(&mut registry, id, library, *external);
        }
    }

    SourceResolver::new(&fs).resolve_all(&mut registry).unwrap();
    registry
}

/// The `mongocpp` static library: three sources, one define, two external
/// libraries. Resolved.
pub fn mongocpp_registry() -> TargetRegistry {
    let mut fs = MockSourceFs::new();
    fs.add_file("/mongo/Collection.cpp");
    fs.add_file("/mongo/Mongo.cpp");
    fs.add_file("/mongo/MongoBson.cpp");

    let mut registry = TargetRegistry::new("/mongo");
    let id = registry
        .declare(
            "mongocpp",
            TargetKind::StaticLibrary,
            ["*"],
            ["MONGO_BUILD_LIBRARY"],
        )
        .unwrap();
    LinkResolver::add_link_dependency(&mut registry, id, "mongoc", true);
    LinkResolver::add_link_dependency(&mut registry, id, "bson", true);

    SourceResolver::new(&fs).resolve_all(&mut registry).unwrap();
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_fs_star_matches_direct_children_only() {
        let mut fs = MockSourceFs::new();
        fs.add_file("/mongo/Mongo.cpp");
        fs.add_file("/mongo/nested/Other.cpp");

        let files = fs.expand(Path::new("/mongo"), "*").unwrap();
        assert_eq!(files, vec![PathBuf::from("/mongo/Mongo.cpp")]);
        assert_eq!(fs.expand_calls(), 1);
    }

    #[test]
    fn test_mock_fs_root_taken_literally() {
        let mut fs = MockSourceFs::new();
        fs.add_file("/mongo[1]/Mongo.cpp");
        fs.add_file("/mongo1/Other.cpp");

        let files = fs.expand(Path::new("/mongo[1]"), "*.cpp").unwrap();
        assert_eq!(files, vec![PathBuf::from("/mongo[1]/Mongo.cpp")]);
    }

    #[test]
    fn test_mock_fs_rejects_bad_pattern() {
        let fs = MockSourceFs::new();
        assert!(fs.expand(Path::new("/mongo"), "[*.cpp").is_err());
    }

    #[test]
    fn test_registry_with_resolves_every_target() {
        let registry = registry_with(&[
            ("core", TargetKind::StaticLibrary, &[]),
            ("app", TargetKind::Executable, &[("core", false), ("m", true)]),
        ]);

        assert_eq!(registry.len(), 2);
        let app = registry.lookup("app").unwrap();
        assert_eq!(
            app.resolved_sources().unwrap(),
            &[PathBuf::from("/project/app/app.c")]
        );
        assert_eq!(app.internal_dependencies().collect::<Vec<_>>(), vec!["core"]);
    }
}
