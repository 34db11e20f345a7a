//! A minimal build graph: deferred process steps and the targets that consume them.
//!
//! Steps are registered up front and only run when something asks for their
//! output. Each step runs at most once; its result (the output path, or the
//! failure) is memoized. Targets are owned by the graph and referred to by
//! [`TargetId`], so the scanner can keep references to consumers without
//! owning them.
//!
//! Handles remember which graph issued them. Passing a handle to any other
//! graph panics instead of silently addressing an unrelated step or target.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::GenerationError;

static NEXT_GRAPH_ID: AtomicUsize = AtomicUsize::new(0);

/// Handle to the future output file of one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArtifactHandle {
    graph: usize,
    index: usize,
}

impl ArtifactHandle {
    /// Registration order within the issuing graph.
    pub fn index(self) -> usize {
        self.index
    }
}

/// Reference to a target owned by a [`BuildGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId {
    graph: usize,
    index: usize,
}

/// A fully frozen process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub output: PathBuf,
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Produces a step's arguments at the moment the step is launched.
pub trait ArgumentSource {
    fn arguments(&self, output: &Path) -> Vec<OsString>;
}

/// Arguments known when the step is registered. `None` entries are replaced
/// by the step's output path.
pub struct FixedArgs(pub Vec<Option<OsString>>);

impl ArgumentSource for FixedArgs {
    fn arguments(&self, output: &Path) -> Vec<OsString> {
        self.0
            .iter()
            .map(|arg| match arg {
                Some(arg) => arg.clone(),
                None => output.as_os_str().to_os_string(),
            })
            .collect()
    }
}

/// Launches frozen invocations.
pub trait ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), GenerationError>;
}

/// [`ProcessRunner`] that spawns real processes and waits for them.
///
/// Output streams are inherited; they are diagnostics only.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<(), GenerationError> {
        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .status()
            .map_err(|e| GenerationError::ProcessLaunchFailed {
                program: invocation.program.clone(),
                source: Arc::new(e),
            })?;

        if !status.success() {
            return Err(GenerationError::NonZeroExit {
                program: invocation.program.clone(),
                code: status.code(),
            });
        }
        Ok(())
    }
}

enum StepState {
    Pending,
    Done,
    Failed(GenerationError),
}

struct Step {
    program: PathBuf,
    args: Box<dyn ArgumentSource>,
    output: PathBuf,
    state: StepState,
}

impl Step {
    fn freeze(&self) -> Invocation {
        Invocation {
            program: self.program.clone(),
            args: self.args.arguments(&self.output),
            output: self.output.clone(),
        }
    }
}

/// What a target is and what it consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Imports generated modules by name.
    Module,
    /// Compiles generated source files.
    Compile,
}

/// A downstream consumer of generated artifacts.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub kind: TargetKind,
    pub sources: Vec<ArtifactHandle>,
    pub imports: Vec<(String, ArtifactHandle)>,
}

/// Arena of steps and targets sharing one output directory.
pub struct BuildGraph {
    id: usize,
    out_dir: PathBuf,
    steps: Vec<Step>,
    targets: Vec<Target>,
}

impl BuildGraph {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            out_dir: out_dir.into(),
            steps: Vec::new(),
            targets: Vec::new(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Register a step producing `output_name`. Nothing runs yet.
    ///
    /// The output lands in `<out_dir>/step-<n>/<output_name>`.
    pub fn add_step(
        &mut self,
        program: impl Into<PathBuf>,
        args: Box<dyn ArgumentSource>,
        output_name: &str,
    ) -> ArtifactHandle {
        let handle = ArtifactHandle {
            graph: self.id,
            index: self.steps.len(),
        };
        let output = self
            .out_dir
            .join(format!("step-{}", handle.index))
            .join(output_name);
        let program = program.into();
        tracing::debug!(
            step = handle.index,
            program = %program.display(),
            output = %output.display(),
            "scheduled"
        );
        self.steps.push(Step {
            program,
            args,
            output,
            state: StepState::Pending,
        });
        handle
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Where the step will write, whether or not it has run.
    pub fn output_path(&self, handle: ArtifactHandle) -> &Path {
        &self.step(handle).output
    }

    pub fn is_materialized(&self, handle: ArtifactHandle) -> bool {
        matches!(self.step(handle).state, StepState::Done)
    }

    pub fn add_module(&mut self, name: impl Into<String>) -> TargetId {
        self.add_target(name.into(), TargetKind::Module)
    }

    pub fn add_compile_target(&mut self, name: impl Into<String>) -> TargetId {
        self.add_target(name.into(), TargetKind::Compile)
    }

    fn add_target(&mut self, name: String, kind: TargetKind) -> TargetId {
        self.targets.push(Target {
            name,
            kind,
            sources: Vec::new(),
            imports: Vec::new(),
        });
        TargetId {
            graph: self.id,
            index: self.targets.len() - 1,
        }
    }

    pub fn target(&self, id: TargetId) -> &Target {
        self.check_owner(id.graph);
        &self.targets[id.index]
    }

    /// Compile `artifact` as part of `target`.
    pub fn add_source(&mut self, target: TargetId, artifact: ArtifactHandle) {
        self.check_owner(artifact.graph);
        self.target_mut(target).sources.push(artifact);
    }

    /// Make `artifact` importable from `target` as `name`.
    pub fn add_import(
        &mut self,
        target: TargetId,
        name: impl Into<String>,
        artifact: ArtifactHandle,
    ) {
        self.check_owner(artifact.graph);
        self.target_mut(target).imports.push((name.into(), artifact));
    }

    /// Run the step behind `handle` unless it already ran.
    ///
    /// Arguments are taken from the step's [`ArgumentSource`] right before
    /// launch. A failed step is not retried; its error is returned again.
    pub fn materialize(
        &mut self,
        handle: ArtifactHandle,
        runner: &dyn ProcessRunner,
    ) -> Result<PathBuf, GenerationError> {
        if let Some(result) = self.memoized(handle) {
            return result;
        }
        let invocation = self.step(handle).freeze();
        let result = launch(runner, &invocation);
        self.record(handle, result)
    }

    /// Materialize everything `target` consumes and return the output paths.
    pub fn materialize_target(
        &mut self,
        target: TargetId,
        runner: &dyn ProcessRunner,
    ) -> Result<Vec<PathBuf>, GenerationError> {
        let t = self.target(target);
        let handles: Vec<ArtifactHandle> = t
            .imports
            .iter()
            .map(|(_, h)| *h)
            .chain(t.sources.iter().copied())
            .collect();
        handles
            .into_iter()
            .map(|h| self.materialize(h, runner))
            .collect()
    }

    /// Materialize every pending step, up to `jobs` at a time.
    ///
    /// Steps are independent, so each batch runs on scoped threads. After a
    /// batch containing a failure no further batches start and the first
    /// failure is returned.
    pub fn make<R>(&mut self, runner: &R, jobs: usize) -> Result<Vec<PathBuf>, GenerationError>
    where
        R: ProcessRunner + Sync + ?Sized,
    {
        let graph = self.id;
        let pending: Vec<ArtifactHandle> = (0..self.steps.len())
            .map(|index| ArtifactHandle { graph, index })
            .filter(|&h| matches!(self.step(h).state, StepState::Pending))
            .collect();

        for batch in pending.chunks(jobs.max(1)) {
            let invocations: Vec<Invocation> =
                batch.iter().map(|&h| self.step(h).freeze()).collect();

            let results: Vec<Result<PathBuf, GenerationError>> = std::thread::scope(|scope| {
                let workers: Vec<_> = invocations
                    .iter()
                    .map(|invocation| scope.spawn(move || launch(runner, invocation)))
                    .collect();
                workers
                    .into_iter()
                    .map(|worker| match worker.join() {
                        Ok(result) => result,
                        Err(panic) => std::panic::resume_unwind(panic),
                    })
                    .collect()
            });

            let mut first_error = None;
            for (handle, result) in batch.iter().zip(results) {
                if let Err(e) = self.record(*handle, result) {
                    first_error.get_or_insert(e);
                }
            }
            if let Some(e) = first_error {
                return Err(e);
            }
        }

        self.steps
            .iter()
            .map(|step| match &step.state {
                StepState::Failed(e) => Err(e.clone()),
                _ => Ok(step.output.clone()),
            })
            .collect()
    }

    fn memoized(&self, handle: ArtifactHandle) -> Option<Result<PathBuf, GenerationError>> {
        let step = self.step(handle);
        match &step.state {
            StepState::Pending => None,
            StepState::Done => Some(Ok(step.output.clone())),
            StepState::Failed(e) => Some(Err(e.clone())),
        }
    }

    fn record(
        &mut self,
        handle: ArtifactHandle,
        result: Result<PathBuf, GenerationError>,
    ) -> Result<PathBuf, GenerationError> {
        let step = self.step_mut(handle);
        match result {
            Ok(path) => {
                step.state = StepState::Done;
                Ok(path)
            }
            Err(e) => {
                tracing::error!(step = handle.index, error = %e, "generation failed");
                step.state = StepState::Failed(e.clone());
                Err(e)
            }
        }
    }

    fn check_owner(&self, graph: usize) {
        assert_eq!(graph, self.id, "handle belongs to a different BuildGraph");
    }

    fn step(&self, handle: ArtifactHandle) -> &Step {
        self.check_owner(handle.graph);
        &self.steps[handle.index]
    }

    fn step_mut(&mut self, handle: ArtifactHandle) -> &mut Step {
        self.check_owner(handle.graph);
        &mut self.steps[handle.index]
    }

    fn target_mut(&mut self, id: TargetId) -> &mut Target {
        self.check_owner(id.graph);
        &mut self.targets[id.index]
    }
}

fn launch<R>(runner: &R, invocation: &Invocation) -> Result<PathBuf, GenerationError>
where
    R: ProcessRunner + ?Sized,
{
    if let Some(dir) = invocation.output.parent() {
        std::fs::create_dir_all(dir).map_err(|e| GenerationError::OutputDir {
            path: dir.to_path_buf(),
            source: Arc::new(e),
        })?;
    }
    tracing::debug!(%invocation, "launching");
    runner.run(invocation)?;
    Ok(invocation.output.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU64;

    #[derive(Default)]
    struct Recorder {
        runs: Mutex<Vec<Invocation>>,
        fail: Option<&'static str>,
    }

    impl ProcessRunner for Recorder {
        fn run(&self, invocation: &Invocation) -> Result<(), GenerationError> {
            self.runs.lock().unwrap().push(invocation.clone());
            if self.fail.is_some_and(|p| invocation.program == Path::new(p)) {
                return Err(GenerationError::NonZeroExit {
                    program: invocation.program.clone(),
                    code: Some(1),
                });
            }
            Ok(())
        }
    }

    fn fixed(args: &[&str]) -> Box<dyn ArgumentSource> {
        let mut v: Vec<Option<OsString>> = args.iter().map(|a| Some(OsString::from(a))).collect();
        v.push(None);
        Box::new(FixedArgs(v))
    }

    fn graph() -> BuildGraph {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "wayland-scan-graph-{}-{}",
            std::process::id(),
            id
        ));
        let _ = std::fs::remove_dir_all(&dir);
        BuildGraph::new(dir)
    }

    #[test]
    fn materialize_runs_once() {
        let mut graph = graph();
        let handle = graph.add_step("gen", fixed(&["a"]), "out.rs");
        let runner = Recorder::default();

        let first = graph.materialize(handle, &runner).unwrap();
        let second = graph.materialize(handle, &runner).unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with("step-0/out.rs"));
        assert_eq!(runner.runs.lock().unwrap().len(), 1);
        assert!(graph.is_materialized(handle));
    }

    #[test]
    fn failure_is_memoized_not_retried() {
        let mut graph = graph();
        let handle = graph.add_step("broken", fixed(&[]), "out.rs");
        let runner = Recorder {
            fail: Some("broken"),
            ..Recorder::default()
        };

        assert!(graph.materialize(handle, &runner).is_err());
        let again = graph.materialize(handle, &runner).unwrap_err();
        assert!(matches!(again, GenerationError::NonZeroExit { code: Some(1), .. }));
        assert_eq!(runner.runs.lock().unwrap().len(), 1);
        assert!(!graph.is_materialized(handle));
    }

    #[test]
    fn same_output_name_gets_distinct_paths() {
        let mut graph = graph();
        let a = graph.add_step("gen", fixed(&[]), "x-protocol.c");
        let b = graph.add_step("gen", fixed(&[]), "x-protocol.c");
        assert_ne!(graph.output_path(a), graph.output_path(b));
    }

    #[test]
    fn fixed_args_substitute_output() {
        let args = FixedArgs(vec![Some("private-code".into()), Some("in.xml".into()), None]);
        assert_eq!(
            args.arguments(Path::new("/o/in-protocol.c")),
            vec![
                OsString::from("private-code"),
                OsString::from("in.xml"),
                OsString::from("/o/in-protocol.c")
            ]
        );
    }

    #[test]
    fn make_runs_every_pending_step_once() {
        let mut graph = graph();
        let first = graph.add_step("gen", fixed(&["1"]), "a");
        graph.add_step("gen", fixed(&["2"]), "b");
        graph.add_step("gen", fixed(&["3"]), "c");
        let runner = Recorder::default();

        graph.materialize(first, &runner).unwrap();
        let outputs = graph.make(&runner, 2).unwrap();
        assert_eq!(outputs.len(), 3);
        assert_eq!(runner.runs.lock().unwrap().len(), 3);

        graph.make(&runner, 2).unwrap();
        assert_eq!(runner.runs.lock().unwrap().len(), 3);
    }

    #[test]
    fn make_stops_after_failing_batch() {
        let mut graph = graph();
        graph.add_step("broken", fixed(&[]), "a");
        graph.add_step("gen", fixed(&[]), "b");
        let runner = Recorder {
            fail: Some("broken"),
            ..Recorder::default()
        };

        let err = graph.make(&runner, 1).unwrap_err();
        assert!(matches!(err, GenerationError::NonZeroExit { .. }));
        assert_eq!(runner.runs.lock().unwrap().len(), 1);
    }

    #[test]
    fn materialize_target_covers_imports_and_sources() {
        let mut graph = graph();
        let binding = graph.add_step("gen", fixed(&[]), "wayland.rs");
        let side = graph.add_step("side", fixed(&[]), "x-protocol.c");
        let unrelated = graph.add_step("side", fixed(&[]), "y-protocol.c");
        let module = graph.add_module("app");
        graph.add_import(module, "wayland", binding);
        graph.add_source(module, side);
        let runner = Recorder::default();

        let paths = graph.materialize_target(module, &runner).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(!graph.is_materialized(unrelated));
        assert_eq!(graph.target(module).kind, TargetKind::Module);
    }

    #[test]
    fn test_graphs_write_to_separate_dirs() {
        assert_ne!(graph().out_dir(), graph().out_dir());
    }

    #[test]
    #[should_panic(expected = "different BuildGraph")]
    fn foreign_artifact_handle_is_rejected() {
        let mut ours = graph();
        let mut theirs = graph();
        ours.add_step("gen", fixed(&[]), "a");
        ours.add_step("gen", fixed(&[]), "b");
        let foreign = theirs.add_step("gen", fixed(&[]), "c");
        assert_eq!(foreign.index(), 0);
        ours.is_materialized(foreign);
    }

    #[test]
    #[should_panic(expected = "different BuildGraph")]
    fn foreign_target_is_rejected() {
        let mut ours = graph();
        let mut theirs = graph();
        ours.add_module("app");
        let side = ours.add_step("side", fixed(&[]), "x-protocol.c");
        let foreign = theirs.add_compile_target("objects");
        ours.add_source(foreign, side);
    }

    #[test]
    #[should_panic(expected = "different BuildGraph")]
    fn foreign_artifact_cannot_be_attached() {
        let mut ours = graph();
        let mut theirs = graph();
        let module = ours.add_module("app");
        let foreign = theirs.add_step("gen", fixed(&[]), "wayland.rs");
        ours.add_import(module, "wayland", foreign);
    }

    #[cfg(unix)]
    #[test]
    fn system_runner_reports_exit_status() {
        let ok = Invocation {
            program: "true".into(),
            args: Vec::new(),
            output: PathBuf::new(),
        };
        assert!(SystemRunner.run(&ok).is_ok());

        let failing = Invocation {
            program: "false".into(),
            ..ok.clone()
        };
        assert!(matches!(
            SystemRunner.run(&failing),
            Err(GenerationError::NonZeroExit { code: Some(1), .. })
        ));

        let missing = Invocation {
            program: "/nonexistent/wayland-scan-test/generator".into(),
            ..ok
        };
        assert!(matches!(
            SystemRunner.run(&missing),
            Err(GenerationError::ProcessLaunchFailed { .. })
        ));
    }
}
