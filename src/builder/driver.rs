//! Build driver - executes a plan on a bounded worker pool.
//!
//! Each target is one job: compile its sources, then archive (static
//! libraries) or link (shared libraries, executables). A target is
//! dispatched once every internal dependency has recorded its artifact, so
//! independent targets build concurrently. When a job fails, nothing new is
//! dispatched; jobs already running finish, and the first failure is
//! reported.

use std::path::PathBuf;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use rayon::{Scope, ThreadPoolBuilder};
use serde::Serialize;

use crate::builder::events::BuildEvent;
use crate::builder::link::LinkRef;
use crate::builder::plan::{BuildPlan, PlannedTarget};
use crate::builder::toolchain::{
    ArchiveUnit, CompileUnit, LinkInput, LinkUnit, Toolchain, ToolchainError,
};
use crate::core::error::BuildError;
use crate::core::target::TargetKind;

/// Output of one built target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifact {
    pub target: String,
    pub kind: TargetKind,
    /// Archive, shared library or executable
    pub path: PathBuf,
    /// Object files the output was made from
    pub objects: Vec<PathBuf>,
}

/// Result of a successful build.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Artifacts in plan order
    pub artifacts: Vec<Artifact>,
    pub duration: Duration,
}

impl BuildReport {
    /// Artifact of a target, by name.
    pub fn artifact(&self, target: &str) -> Option<&Artifact> {
        self.artifacts.iter().find(|a| a.target == target)
    }
}

/// Outcome of executing a plan.
pub type BuildOutcome = Result<BuildReport, BuildError>;

/// Callback receiving build events, possibly from several worker threads.
pub type EventSink<'a> = &'a (dyn Fn(&BuildEvent) + Sync);

/// Executes build plans through a [`Toolchain`].
pub struct BuildDriver<'a> {
    toolchain: &'a dyn Toolchain,
    out_dir: PathBuf,
    jobs: usize,
    events: Option<EventSink<'a>>,
}

/// Scheduling state shared by the workers of one run.
struct Schedule {
    /// Unfinished internal dependencies per plan position
    remaining: Vec<usize>,
    /// Set by the first failure; stops further dispatch
    halted: bool,
    failure: Option<BuildError>,
}

struct Run<'p> {
    plan: &'p BuildPlan,
    schedule: Mutex<Schedule>,
    artifacts: Vec<OnceLock<Artifact>>,
}

impl Run<'_> {
    fn halted(&self) -> bool {
        self.schedule
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .halted
    }
}

impl<'a> BuildDriver<'a> {
    /// Create a driver writing outputs under `out_dir`.
    ///
    /// The pool size defaults to the available parallelism.
    pub fn new(toolchain: &'a dyn Toolchain, out_dir: impl Into<PathBuf>) -> Self {
        BuildDriver {
            toolchain,
            out_dir: out_dir.into(),
            jobs: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            events: None,
        }
    }

    /// Set the worker pool size.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Receive build events.
    pub fn with_events(mut self, events: EventSink<'a>) -> Self {
        self.events = Some(events);
        self
    }

    /// Worker pool size.
    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Output directory of a target.
    pub fn target_dir(&self, target: &PlannedTarget) -> PathBuf {
        self.out_dir.join(&target.name)
    }

    /// Path of a target's final output.
    pub fn output_path(&self, target: &PlannedTarget) -> PathBuf {
        self.target_dir(target)
            .join(self.toolchain.output_filename(&target.name, target.kind))
    }

    /// Execute every target of `plan`.
    pub fn execute(&self, plan: &BuildPlan) -> BuildOutcome {
        let start = Instant::now();
        self.emit(BuildEvent::started(plan.len(), self.jobs, plan.fingerprint()));
        tracing::info!(
            targets = plan.len(),
            jobs = self.jobs,
            "building with {}",
            self.toolchain.name()
        );

        let result = self.run(plan);
        let duration = start.elapsed();

        let built = match &result {
            Ok(artifacts) => artifacts.len(),
            Err(_) => 0,
        };
        self.emit(BuildEvent::finished(
            result.is_ok(),
            duration.as_millis() as u64,
            built,
        ));

        result.map(|artifacts| BuildReport {
            artifacts,
            duration,
        })
    }

    fn run(&self, plan: &BuildPlan) -> Result<Vec<Artifact>, BuildError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|i| format!("quay-worker-{}", i))
            .build()
            .map_err(|e| BuildError::WorkerPool {
                message: e.to_string(),
            })?;

        let run = Run {
            plan,
            schedule: Mutex::new(Schedule {
                remaining: plan
                    .targets()
                    .iter()
                    .map(|t| t.dependency_positions.len())
                    .collect(),
                halted: false,
                failure: None,
            }),
            artifacts: (0..plan.len()).map(|_| OnceLock::new()).collect(),
        };

        pool.scope(|s| {
            for (position, target) in plan.targets().iter().enumerate() {
                if target.is_leaf() {
                    self.dispatch(s, &run, position);
                }
            }
        });

        let schedule = run
            .schedule
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(failure) = schedule.failure {
            return Err(failure);
        }

        Ok(run
            .artifacts
            .into_iter()
            .filter_map(OnceLock::into_inner)
            .collect())
    }

    fn dispatch<'s>(&'s self, scope: &Scope<'s>, run: &'s Run<'s>, position: usize) {
        scope.spawn(move |s| {
            if run.halted() {
                return;
            }
            let result = self.build_target(run, position);

            let ready = {
                let mut schedule = run
                    .schedule
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);

                match result {
                    Ok(artifact) => {
                        let _ = run.artifacts[position].set(artifact);

                        let mut ready = Vec::new();
                        for &dependent in &run.plan.targets()[position].dependent_positions {
                            schedule.remaining[dependent] -= 1;
                            if schedule.remaining[dependent] == 0 && !schedule.halted {
                                ready.push(dependent);
                            }
                        }
                        ready
                    }
                    Err(err) => {
                        schedule.halted = true;
                        if schedule.failure.is_none() {
                            schedule.failure = Some(err);
                        }
                        Vec::new()
                    }
                }
            };

            for next in ready {
                self.dispatch(s, run, next);
            }
        });
    }

    fn build_target(&self, run: &Run<'_>, position: usize) -> Result<Artifact, BuildError> {
        let target = &run.plan.targets()[position];
        self.emit(BuildEvent::TargetStarted {
            target: target.name.clone(),
            kind: target.kind,
            sources: target.sources.len(),
        });
        tracing::debug!(target = %target.name, kind = %target.kind, "dispatched");

        let result = self.compile_and_produce(run, target);
        match &result {
            Ok(artifact) => self.emit(BuildEvent::TargetArtifact {
                target: artifact.target.clone(),
                kind: artifact.kind,
                filename: artifact.path.clone(),
                objects: artifact.objects.clone(),
            }),
            Err(err) => {
                tracing::debug!(target = %target.name, step = err.step(), "failed");
                self.emit(BuildEvent::TargetFailed {
                    target: target.name.clone(),
                    step: err.step().to_string(),
                    message: err.toolchain_output().unwrap_or_default().to_string(),
                });
            }
        }
        result
    }

    fn compile_and_produce(
        &self,
        run: &Run<'_>,
        target: &PlannedTarget,
    ) -> Result<Artifact, BuildError> {
        let objects = self
            .toolchain
            .compile(&CompileUnit {
                target: &target.name,
                root: &target.root,
                sources: &target.sources,
                defines: &target.defines,
                obj_dir: self.target_dir(target).join("obj"),
            })
            .map_err(|e| failed(target, e))?;

        let output = self.output_path(target);
        let path = match target.kind {
            TargetKind::StaticLibrary => self.toolchain.archive(&ArchiveUnit {
                target: &target.name,
                objects: &objects,
                output,
            }),
            TargetKind::SharedLibrary | TargetKind::Executable => {
                self.toolchain.link(&LinkUnit {
                    target: &target.name,
                    kind: target.kind,
                    language: run.plan.link_language(target),
                    objects: &objects,
                    inputs: self.link_inputs(run, target),
                    output,
                })
            }
        }
        .map_err(|e| failed(target, e))?;

        Ok(Artifact {
            target: target.name.clone(),
            kind: target.kind,
            path,
            objects,
        })
    }

    fn link_inputs(&self, run: &Run<'_>, target: &PlannedTarget) -> Vec<LinkInput> {
        target
            .link_line
            .iter()
            .map(|item| match item {
                LinkRef::Target { position, .. } => LinkInput::Artifact(
                    run.artifacts[*position]
                        .get()
                        .map(|a| a.path.clone())
                        .unwrap_or_else(|| self.output_path(&run.plan.targets()[*position])),
                ),
                LinkRef::External { name } => LinkInput::Library(name.clone()),
            })
            .collect()
    }

    fn emit(&self, event: BuildEvent) {
        if let Some(events) = self.events {
            events(&event);
        }
    }
}

fn failed(target: &PlannedTarget, err: ToolchainError) -> BuildError {
    let target = target.name.clone();
    match err {
        ToolchainError::Compile { diagnostic } => {
            BuildError::ToolchainCompile { target, diagnostic }
        }
        ToolchainError::Archive { diagnostic } => {
            BuildError::ToolchainArchive { target, diagnostic }
        }
        ToolchainError::Link { diagnostic } => BuildError::ToolchainLink { target, diagnostic },
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::Path;

    use super::*;
    use crate::builder::graph::{DependencyGraph, FinalizeOptions};
    use crate::builder::link::LinkResolver;
    use crate::builder::sources::SourceResolver;
    use crate::core::target::Language;
    use crate::test_support::{
        mongocpp_registry, registry_with, MockSourceFs, RecordingToolchain, Step, ToolchainCall,
    };

    fn plan_of(rows: &[(&str, TargetKind, &[(&str, bool)])]) -> BuildPlan {
        DependencyGraph::finalize(&registry_with(rows), FinalizeOptions::default()).unwrap()
    }

    fn finished_before(steps: &[Step], dependency: &str, dependent: &str) -> bool {
        let finished = steps
            .iter()
            .position(|s| *s == Step::Finished(dependency.to_string()));
        let started = steps
            .iter()
            .position(|s| *s == Step::Started(dependent.to_string()));
        matches!((finished, started), (Some(f), Some(s)) if f < s)
    }

    #[test]
    fn test_mongocpp_build() {
        let plan = DependencyGraph::finalize(&mongocpp_registry(), FinalizeOptions::default())
            .unwrap();
        let toolchain = RecordingToolchain::new();

        let report = BuildDriver::new(&toolchain, "/out")
            .with_jobs(4)
            .execute(&plan)
            .unwrap();

        let calls = toolchain.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0],
            ToolchainCall::Compile {
                target: "mongocpp".into(),
                sources: vec![
                    PathBuf::from("/mongo/Collection.cpp"),
                    PathBuf::from("/mongo/Mongo.cpp"),
                    PathBuf::from("/mongo/MongoBson.cpp"),
                ],
                defines: vec!["MONGO_BUILD_LIBRARY".into()],
            }
        );
        assert!(matches!(&calls[1], ToolchainCall::Archive { target, objects, .. }
            if target == "mongocpp" && objects.len() == 3));

        assert_eq!(report.artifacts.len(), 1);
        let artifact = report.artifact("mongocpp").unwrap();
        assert_eq!(artifact.kind, TargetKind::StaticLibrary);
        let filename = toolchain.output_filename("mongocpp", TargetKind::StaticLibrary);
        assert_eq!(artifact.path, Path::new("/out/mongocpp").join(filename));
    }

    #[test]
    fn test_dependencies_finish_before_dependents_start() {
        let plan = plan_of(&[
            ("bson_lib", TargetKind::StaticLibrary, &[]),
            ("mongocpp", TargetKind::StaticLibrary, &[("bson_lib", false)]),
            ("util", TargetKind::StaticLibrary, &[]),
            ("app", TargetKind::Executable, &[("mongocpp", false), ("util", false)]),
        ]);
        let toolchain = RecordingToolchain::new().with_delay(Duration::from_millis(20));

        BuildDriver::new(&toolchain, "/out").with_jobs(4).execute(&plan).unwrap();

        let steps = toolchain.steps();
        assert!(finished_before(&steps, "bson_lib", "mongocpp"));
        assert!(finished_before(&steps, "mongocpp", "app"));
        assert!(finished_before(&steps, "util", "app"));
    }

    #[test]
    fn test_independent_targets_build_concurrently() {
        let plan = plan_of(&[
            ("a", TargetKind::StaticLibrary, &[]),
            ("b", TargetKind::StaticLibrary, &[]),
            ("c", TargetKind::StaticLibrary, &[]),
        ]);
        let toolchain = RecordingToolchain::new().with_delay(Duration::from_millis(100));

        BuildDriver::new(&toolchain, "/out").with_jobs(3).execute(&plan).unwrap();
        assert!(toolchain.peak_concurrency() > 1);
    }

    #[test]
    fn test_single_job_runs_serially() {
        let plan = plan_of(&[
            ("a", TargetKind::StaticLibrary, &[]),
            ("b", TargetKind::StaticLibrary, &[]),
        ]);
        let toolchain = RecordingToolchain::new().with_delay(Duration::from_millis(10));

        BuildDriver::new(&toolchain, "/out").with_jobs(1).execute(&plan).unwrap();
        assert_eq!(toolchain.peak_concurrency(), 1);
    }

    #[test]
    fn test_each_target_built_exactly_once() {
        // Diamond: both middle targets complete before `top` is ready.
        let plan = plan_of(&[
            ("base", TargetKind::StaticLibrary, &[]),
            ("left", TargetKind::StaticLibrary, &[("base", false)]),
            ("right", TargetKind::StaticLibrary, &[("base", false)]),
            ("top", TargetKind::Executable, &[("left", false), ("right", false)]),
        ]);
        let toolchain = RecordingToolchain::new().with_delay(Duration::from_millis(5));

        let report = BuildDriver::new(&toolchain, "/out").with_jobs(4).execute(&plan).unwrap();

        let started = toolchain.started();
        let unique: HashSet<_> = started.iter().collect();
        assert_eq!(started.len(), 4);
        assert_eq!(unique.len(), 4);
        assert_eq!(report.artifacts.len(), 4);
    }

    #[test]
    fn test_link_inputs_follow_link_line() {
        let plan = plan_of(&[
            ("bson_lib", TargetKind::StaticLibrary, &[("bson", true)]),
            ("mongocpp", TargetKind::StaticLibrary, &[("bson_lib", false), ("mongoc", true)]),
            ("shell", TargetKind::Executable, &[("mongocpp", false)]),
        ]);
        let toolchain = RecordingToolchain::new();

        BuildDriver::new(&toolchain, "/out").execute(&plan).unwrap();

        let link = toolchain
            .calls()
            .into_iter()
            .find(|c| matches!(c, ToolchainCall::Link { .. }))
            .unwrap();
        let ToolchainCall::Link { target, inputs, .. } = link else {
            unreachable!()
        };

        assert_eq!(target, "shell");
        let kind = TargetKind::StaticLibrary;
        assert_eq!(
            inputs,
            vec![
                LinkInput::Artifact(
                    Path::new("/out/mongocpp").join(toolchain.output_filename("mongocpp", kind))
                ),
                LinkInput::Artifact(
                    Path::new("/out/bson_lib").join(toolchain.output_filename("bson_lib", kind))
                ),
                LinkInput::Library("bson".into()),
                LinkInput::Library("mongoc".into()),
            ]
        );
    }

    #[test]
    fn test_cxx_archive_links_with_cxx_driver() {
        let mut registry = mongocpp_registry();
        let shell = registry
            .declare_in("/shell", "shell", TargetKind::Executable, ["*.c"], Vec::<String>::new())
            .unwrap();
        LinkResolver::add_link_dependency(&mut registry, shell, "mongocpp", false);

        let mut fs = MockSourceFs::new();
        fs.add_file("/shell/main.c");
        SourceResolver::new(&fs).resolve_all(&mut registry).unwrap();

        let plan = DependencyGraph::finalize(&registry, FinalizeOptions::default()).unwrap();
        let toolchain = RecordingToolchain::new();
        BuildDriver::new(&toolchain, "/out").execute(&plan).unwrap();

        let languages: Vec<Language> = toolchain
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                ToolchainCall::Link { language, .. } => Some(language),
                _ => None,
            })
            .collect();
        assert_eq!(languages, vec![Language::Cxx]);
    }

    #[test]
    fn test_failure_stops_dispatch() {
        let plan = plan_of(&[
            ("broken", TargetKind::StaticLibrary, &[]),
            ("app", TargetKind::Executable, &[("broken", false)]),
        ]);
        let toolchain =
            RecordingToolchain::new().fail_compile("broken", "broken.c:1:1: error: boom\n");

        let err = BuildDriver::new(&toolchain, "/out").execute(&plan).unwrap_err();

        assert_eq!(
            err,
            BuildError::ToolchainCompile {
                target: "broken".into(),
                diagnostic: "broken.c:1:1: error: boom\n".into(),
            }
        );
        assert_eq!(toolchain.started(), vec!["broken"]);
    }

    #[test]
    fn test_in_flight_targets_drain_after_failure() {
        // `slow` is already compiling when `broken` fails; it completes, but
        // its dependent is never dispatched.
        let plan = plan_of(&[
            ("broken", TargetKind::StaticLibrary, &[]),
            ("slow", TargetKind::StaticLibrary, &[]),
            ("after_slow", TargetKind::Executable, &[("slow", false)]),
        ]);
        let toolchain = RecordingToolchain::new()
            .fail_compile("broken", "error")
            .with_target_delay("broken", Duration::from_millis(50))
            .with_target_delay("slow", Duration::from_millis(150));

        let err = BuildDriver::new(&toolchain, "/out")
            .with_jobs(2)
            .execute(&plan)
            .unwrap_err();

        assert_eq!(err.target(), Some("broken"));
        let steps = toolchain.steps();
        assert!(steps.contains(&Step::Finished("slow".into())));
        assert!(!toolchain.started().contains(&"after_slow".to_string()));
    }

    #[test]
    fn test_events_bracket_the_build() {
        let plan = DependencyGraph::finalize(&mongocpp_registry(), FinalizeOptions::default())
            .unwrap();
        let toolchain = RecordingToolchain::new();
        let events = Mutex::new(Vec::new());
        let sink = |event: &BuildEvent| events.lock().unwrap().push(event.clone());

        BuildDriver::new(&toolchain, "/out")
            .with_events(&sink)
            .execute(&plan)
            .unwrap();

        let events = events.into_inner().unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], BuildEvent::BuildStarted { target_count: 1, .. }));
        assert!(matches!(events[1], BuildEvent::TargetStarted { sources: 3, .. }));
        assert!(matches!(events[2], BuildEvent::TargetArtifact { .. }));
        assert!(matches!(
            events[3],
            BuildEvent::BuildFinished { success: true, targets_built: 1, .. }
        ));
    }
}
