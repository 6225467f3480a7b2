//! Pause/resume handoff between the target executor and the controller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::breakpoints::BreakpointRegistry;
use super::frames::{Frame, Variables};
use super::history::{History, ProgramState};
use super::profiler::Profiler;
use super::stepping::Command;
use super::tracker::ExecutionTracker;
use crate::error::ProtocolError;
use crate::executor::{OutputBuffer, Scope};

/// Lifecycle of one debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Running,
    Paused,
    Terminated,
}

/// State published by the target executor at each pause.
#[derive(Debug)]
pub(crate) struct SessionView {
    pub frames: Vec<Frame>,
    pub variables: Variables,
    pub current_line: Option<usize>,
    pub exception: Option<String>,
    pub tracker: ExecutionTracker,
    pub history: History,
    pub profiler: Profiler,
}

impl SessionView {
    fn new(history_capacity: usize) -> Self {
        Self {
            frames: Vec::new(),
            variables: Variables::default(),
            current_line: None,
            exception: None,
            tracker: ExecutionTracker::new(),
            history: History::new(history_capacity),
            profiler: Profiler::new(),
        }
    }

    pub fn restore(&mut self, state: &ProgramState) {
        self.frames = state.frames.clone();
        self.variables = state.variables.clone();
        self.current_line = state.current_line;
    }
}

#[derive(Debug)]
struct Control {
    phase: Phase,
    pending: Option<Command>,
    /// Live bindings of the innermost frame, only while paused.
    scope: Option<Scope>,
}

impl Control {
    fn resume(&mut self) {
        self.pending = None;
        self.phase = Phase::Running;
        self.scope = None;
    }
}

/// Session state shared by the executor thread and every handle.
#[derive(Debug)]
pub(crate) struct Shared {
    pub view: RwLock<SessionView>,
    pub breakpoints: RwLock<BreakpointRegistry>,
    pub output: OutputBuffer,
    control: Mutex<Control>,
    command_ready: Condvar,
    phase_changed: Condvar,
    terminate_requested: AtomicBool,
}

impl Shared {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            view: RwLock::new(SessionView::new(history_capacity)),
            breakpoints: RwLock::new(BreakpointRegistry::new()),
            output: OutputBuffer::new(),
            control: Mutex::new(Control {
                phase: Phase::Idle,
                pending: None,
                scope: None,
            }),
            command_ready: Condvar::new(),
            phase_changed: Condvar::new(),
            terminate_requested: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> Phase {
        self.control.lock().phase
    }

    pub fn terminate_requested(&self) -> bool {
        self.terminate_requested.load(Ordering::Acquire)
    }

    fn set_phase(&self, phase: Phase) {
        let mut control = self.control.lock();
        control.phase = phase;
        control.scope = None;
        if phase == Phase::Terminated {
            control.pending = None;
        }
        self.phase_changed.notify_all();
        self.command_ready.notify_all();
    }

    pub fn begin(&self) {
        self.set_phase(Phase::Running);
    }

    /// Called by the executor once the pause state has been published.
    pub fn enter_pause(&self, scope: Scope) {
        let mut control = self.control.lock();
        control.phase = Phase::Paused;
        control.scope = Some(scope);
        self.phase_changed.notify_all();
    }

    /// Copy of the bindings at the current pause.
    pub fn paused_scope(&self) -> Result<Scope, ProtocolError> {
        let control = self.control.lock();
        match (control.phase, &control.scope) {
            (Phase::Paused, Some(scope)) => Ok(scope.clone()),
            _ => Err(ProtocolError::NotPaused),
        }
    }

    pub fn mark_terminated(&self) {
        self.set_phase(Phase::Terminated);
    }

    /// Block the executor until a command arrives. A rewind is left pending
    /// until [`Shared::finish_rewind`] so no waiter sees the session settle
    /// before the restored state is published.
    pub fn wait_for_command(&self, liveness_poll: Duration) -> Command {
        let mut control = self.control.lock();
        loop {
            if self.terminate_requested() {
                control.resume();
                self.phase_changed.notify_all();
                return Command::Terminate;
            }
            match control.pending {
                Some(Command::Rewind) => return Command::Rewind,
                Some(command) => {
                    control.resume();
                    self.phase_changed.notify_all();
                    return command;
                }
                None => {}
            }
            if self
                .command_ready
                .wait_for(&mut control, liveness_poll)
                .timed_out()
            {
                debug!("target still paused, waiting for a command");
            }
        }
    }

    pub fn finish_rewind(&self) {
        let mut control = self.control.lock();
        control.pending = None;
        self.phase_changed.notify_all();
    }

    /// Hand `command` to the executor. Terminate is also accepted while
    /// running and takes effect at the next trace event.
    pub fn submit(&self, command: Command) -> Result<(), ProtocolError> {
        let mut control = self.control.lock();
        match control.phase {
            Phase::Idle | Phase::Terminated => Err(ProtocolError::NotRunning),
            Phase::Running if command == Command::Terminate => {
                self.terminate_requested.store(true, Ordering::Release);
                self.command_ready.notify_all();
                Ok(())
            }
            Phase::Running => Err(ProtocolError::NotPaused),
            Phase::Paused if control.pending.is_some() => Err(ProtocolError::CommandPending),
            Phase::Paused => {
                if command == Command::Terminate {
                    self.terminate_requested.store(true, Ordering::Release);
                }
                control.pending = Some(command);
                self.command_ready.notify_all();
                Ok(())
            }
        }
    }

    /// Unconditional terminate used when a session is being replaced.
    pub fn request_terminate(&self) {
        let _control = self.control.lock();
        self.terminate_requested.store(true, Ordering::Release);
        self.command_ready.notify_all();
    }

    /// Wait until the session is paused with nothing pending, or terminated.
    /// `None` when `timeout` elapses first.
    pub fn wait_until_settled(&self, timeout: Duration) -> Option<Phase> {
        self.wait_until(timeout, |control| match control.phase {
            Phase::Paused => control.pending.is_none(),
            Phase::Terminated => true,
            Phase::Idle | Phase::Running => false,
        })
    }

    pub fn wait_until_terminated(&self, timeout: Duration) -> bool {
        self.wait_until(timeout, |control| control.phase == Phase::Terminated)
            .is_some()
    }

    fn wait_until(&self, timeout: Duration, done: impl Fn(&Control) -> bool) -> Option<Phase> {
        let deadline = Instant::now().checked_add(timeout);
        let mut control = self.control.lock();
        loop {
            if done(&*control) {
                return Some(control.phase);
            }
            match deadline {
                Some(deadline) => {
                    if self
                        .phase_changed
                        .wait_until(&mut control, deadline)
                        .timed_out()
                    {
                        return done(&*control).then_some(control.phase);
                    }
                }
                None => self.phase_changed.wait(&mut control),
            }
        }
    }
}
