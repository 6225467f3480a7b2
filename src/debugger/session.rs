use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::breakpoints::{Breakpoint, BreakpointListing, Location};
use super::context::DebugContext;
use super::control::{Phase, Shared};
use super::evaluator::{Evaluation, Evaluator};
use super::frames::{Frame, Variables};
use super::history::ProgramState;
use super::profiler::Profile;
use super::stepping::Command;
use super::tracker::ExecutionStep;
use crate::config::DebuggerConfig;
use crate::error::{DebugError, DebugResult, ProtocolError};
use crate::executor::{Interpreter, RunOutcome};
use crate::parser::{parse_program, Program, SourceUnit, MAIN_UNIT};

/// Script calls recurse on the host stack, so the executor gets room for
/// `max_call_depth` activations.
const EXECUTOR_STACK_SIZE: usize = 64 * 1024 * 1024;

/// Inclusive line range outside which pauses are not captured into history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusRange {
    pub first: usize,
    pub last: usize,
}

impl FocusRange {
    pub fn new(a: usize, b: usize) -> Self {
        Self {
            first: a.min(b),
            last: a.max(b),
        }
    }

    pub fn contains(&self, line: usize) -> bool {
        (self.first..=self.last).contains(&line)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub running: bool,
    pub phase: Phase,
    pub frames: Vec<Frame>,
    pub variables: Variables,
    pub breakpoints: BreakpointListing,
    pub exception: Option<String>,
    pub output: String,
    pub current_line: Option<usize>,
    pub history_size: usize,
    pub history_cursor: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visualization {
    pub flowchart: String,
    pub call_graph: String,
}

/// Controller-side handle to one session. Clones share the session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    shared: Arc<Shared>,
    unit: Arc<SourceUnit>,
    evaluator: Evaluator,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn unit(&self) -> &SourceUnit {
        &self.unit
    }

    pub fn phase(&self) -> Phase {
        self.shared.phase()
    }

    pub fn status(&self) -> Status {
        let phase = self.phase();
        let breakpoints = self.breakpoints();
        let view = self.shared.view.read();
        Status {
            running: matches!(phase, Phase::Running | Phase::Paused),
            phase,
            frames: view.frames.clone(),
            variables: view.variables.clone(),
            breakpoints,
            exception: view.exception.clone(),
            output: self.shared.output.contents(),
            current_line: view.current_line,
            history_size: view.history.size(),
            history_cursor: view.history.cursor(),
        }
    }

    /// Replace every breakpoint of the session.
    pub fn set_breakpoints(&self, breakpoints: impl IntoIterator<Item = Breakpoint>) {
        self.shared.breakpoints.write().replace(breakpoints);
    }

    /// Arm a breakpoint on a line of the session's program.
    pub fn set_breakpoint(&self, line: usize, condition: Option<String>) {
        let location = Location::new(self.unit.name(), line);
        self.shared.breakpoints.write().set(location, condition);
    }

    pub fn clear_breakpoint(&self, line: usize) -> bool {
        let location = Location::new(self.unit.name(), line);
        self.shared.breakpoints.write().clear(&location)
    }

    pub fn breakpoints(&self) -> BreakpointListing {
        self.shared.breakpoints.read().listing()
    }

    pub fn send_command(&self, command: Command) -> Result<(), ProtocolError> {
        self.shared.submit(command)
    }

    /// Parse and send a command given by name.
    pub fn send(&self, kind: &str) -> Result<(), ProtocolError> {
        self.send_command(kind.parse()?)
    }

    /// Evaluate `text` against a copy of the paused scope.
    pub fn evaluate(&self, text: &str) -> Result<Evaluation, ProtocolError> {
        let scope = self.shared.paused_scope()?;
        Ok(self.evaluator.evaluate(text, &scope))
    }

    pub fn visualization(&self) -> Visualization {
        let view = self.shared.view.read();
        Visualization {
            flowchart: view.tracker.to_flowchart(),
            call_graph: view.tracker.to_call_graph(),
        }
    }

    pub fn profile(&self) -> Profile {
        self.shared.view.read().profiler.profile()
    }

    pub fn steps(&self) -> Vec<ExecutionStep> {
        self.shared.view.read().tracker.steps().to_vec()
    }

    /// Snapshot at the history cursor.
    pub fn current_state(&self) -> Option<ProgramState> {
        self.shared.view.read().history.current().cloned()
    }

    /// Block until the session is paused with no command pending, or
    /// terminated. `None` if `timeout` passes first.
    pub fn wait_until_settled(&self, timeout: Duration) -> Option<Phase> {
        self.shared.wait_until_settled(timeout)
    }
}

struct ActiveRun {
    handle: SessionHandle,
    executor: JoinHandle<()>,
}

/// Owner of the current debug session. Starting a new run tears down the
/// previous one first, so at most one session is ever live.
pub struct Debugger {
    config: DebuggerConfig,
    active: Option<ActiveRun>,
    next_id: u64,
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new(DebuggerConfig::default())
    }
}

impl Debugger {
    pub fn new(config: DebuggerConfig) -> Self {
        Self {
            config,
            active: None,
            next_id: 1,
        }
    }

    pub fn config(&self) -> &DebuggerConfig {
        &self.config
    }

    pub fn start_run(
        &mut self,
        source: &str,
        focus: Option<FocusRange>,
    ) -> DebugResult<SessionHandle> {
        self.start_run_with_breakpoints(source, focus, Vec::new())
    }

    /// Start a run with breakpoints armed before the first trace event.
    pub fn start_run_with_breakpoints(
        &mut self,
        source: &str,
        focus: Option<FocusRange>,
        breakpoints: Vec<Breakpoint>,
    ) -> DebugResult<SessionHandle> {
        let program = parse_program(source)?;
        self.shutdown()?;

        let id = self.next_id;
        self.next_id += 1;
        let unit = Arc::new(SourceUnit::new(MAIN_UNIT, source));
        let shared = Arc::new(Shared::new(self.config.history_capacity));
        shared.breakpoints.write().replace(breakpoints);

        let handle = SessionHandle {
            id,
            shared: Arc::clone(&shared),
            unit: Arc::clone(&unit),
            evaluator: Evaluator::new(self.config.max_call_depth),
        };
        let context = DebugContext::new(Arc::clone(&shared), unit, &self.config, focus);
        let max_depth = self.config.max_call_depth;

        shared.begin();
        let spawned = thread::Builder::new()
            .name("target-executor".into())
            .stack_size(EXECUTOR_STACK_SIZE)
            .spawn({
                let shared = Arc::clone(&shared);
                move || run_target(&program, context, shared, max_depth)
            });
        let executor = match spawned {
            Ok(executor) => executor,
            Err(err) => {
                shared.mark_terminated();
                return Err(DebugError::Spawn(err));
            }
        };
        info!(session = id, lines = handle.unit.len(), focus = ?focus, "debug session started");

        self.active = Some(ActiveRun {
            handle: handle.clone(),
            executor,
        });
        Ok(handle)
    }

    pub fn session(&self) -> DebugResult<&SessionHandle> {
        self.active
            .as_ref()
            .map(|run| &run.handle)
            .ok_or(DebugError::NoSession)
    }

    /// Terminate the live session, if any, and wait for its executor.
    pub fn shutdown(&mut self) -> DebugResult<()> {
        let Some(run) = self.active.take() else {
            return Ok(());
        };
        let timeout = self.config.teardown_timeout();
        run.handle.shared.request_terminate();
        if !run.handle.shared.wait_until_terminated(timeout) {
            warn!(session = run.handle.id, ?timeout, "previous session did not terminate");
            self.active = Some(run);
            return Err(DebugError::TeardownTimeout(timeout));
        }
        if run.executor.join().is_err() {
            warn!(session = run.handle.id, "target executor panicked");
        }
        info!(session = run.handle.id, "debug session torn down");
        Ok(())
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            warn!(%err, "debugger dropped with a live session");
        }
    }
}

/// Marks the session terminated when the executor exits, including by panic.
struct TerminateOnExit(Arc<Shared>);

impl Drop for TerminateOnExit {
    fn drop(&mut self) {
        self.0.mark_terminated();
    }
}

fn run_target(program: &Program, mut context: DebugContext, shared: Arc<Shared>, max_depth: usize) {
    let _exit = TerminateOnExit(Arc::clone(&shared));
    let output = shared.output.clone();
    match Interpreter::new(&mut context, &output, max_depth).run(program) {
        RunOutcome::Completed => info!("target completed"),
        RunOutcome::Terminated => info!("target terminated"),
        RunOutcome::Failed(err) => info!(%err, line = ?err.line, "target failed"),
    }
}
