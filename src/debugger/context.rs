use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::breakpoints::Location;
use super::control::Shared;
use super::evaluator::Evaluator;
use super::frames::{FrameBuilder, Variables};
use super::history::ProgramState;
use super::session::FocusRange;
use super::stepping::{Command, RunMode};
use super::tracker::EventKind;
use crate::config::DebuggerConfig;
use crate::executor::{Directive, LiveStack, TraceEvent, Tracer};
use crate::parser::SourceUnit;

/// Stepping controller. Runs on the target executor's thread as the
/// interpreter's tracer and decides at every line event whether to pause.
pub struct DebugContext {
    shared: Arc<Shared>,
    unit: Arc<SourceUnit>,
    evaluator: Evaluator,
    focus: Option<FocusRange>,
    context_lines: usize,
    liveness_poll: Duration,
    mode: RunMode,
}

impl DebugContext {
    pub(crate) fn new(
        shared: Arc<Shared>,
        unit: Arc<SourceUnit>,
        config: &DebuggerConfig,
        focus: Option<FocusRange>,
    ) -> Self {
        Self {
            shared,
            unit,
            evaluator: Evaluator::new(config.max_call_depth),
            focus,
            context_lines: config.context_lines,
            liveness_poll: config.liveness_poll(),
            mode: if config.stop_on_entry {
                RunMode::StepInto
            } else {
                RunMode::Continue
            },
        }
    }

    fn on_line(&mut self, stack: &LiveStack<'_>) -> Directive {
        let line = stack.line();
        let depth = stack.depth();
        let location = Location::new(self.unit.name(), line);
        let breakpoint = {
            let registry = self.shared.breakpoints.read();
            registry.is_armed(&location)
                && registry.should_pause(&location, &stack.scope(), &self.evaluator)
        };
        if breakpoint || self.mode.pauses_at(depth) {
            self.pause(stack, line, depth, breakpoint)
        } else {
            Directive::Proceed
        }
    }

    /// Publish the pause state, then block until a resuming command arrives.
    fn pause(
        &mut self,
        stack: &LiveStack<'_>,
        line: usize,
        depth: usize,
        breakpoint: bool,
    ) -> Directive {
        let frames = FrameBuilder::new(&self.unit, self.context_lines).build_stack(stack);
        let variables = frames.first().map(Variables::of).unwrap_or_default();
        let focused = self.focus.map_or(true, |focus| focus.contains(line));
        {
            let mut view = self.shared.view.write();
            view.tracker
                .record_step(line, self.unit.line(line).unwrap_or_default(), EventKind::Line);
            if focused {
                let state = ProgramState::new(
                    frames.clone(),
                    variables.clone(),
                    Some(line),
                    self.shared.output.contents(),
                );
                view.history.capture(state);
            }
            view.frames = frames;
            view.variables = variables;
            view.current_line = Some(line);
        }
        debug!(line, depth, breakpoint, "paused");
        self.shared.enter_pause(stack.scope());

        loop {
            let command = self.shared.wait_for_command(self.liveness_poll);
            debug!(%command, line, "command received");
            self.mode = match command {
                Command::Rewind => {
                    self.rewind();
                    continue;
                }
                Command::Step => RunMode::StepInto,
                Command::StepOver => RunMode::StepOver { depth },
                Command::Continue => RunMode::Continue,
                Command::Terminate => {
                    info!(line, "terminating target");
                    return Directive::Unwind;
                }
            };
            return Directive::Proceed;
        }
    }

    fn rewind(&self) {
        {
            let mut view = self.shared.view.write();
            let restored = view.history.rewind().cloned();
            match restored {
                Some(state) => {
                    debug!(line = ?state.current_line, cursor = ?view.history.cursor(), "rewound");
                    view.restore(&state);
                }
                None => debug!("rewind with no captured history"),
            }
        }
        self.shared.finish_rewind();
    }
}

impl Tracer for DebugContext {
    fn on_event(&mut self, event: TraceEvent<'_>, stack: &LiveStack<'_>) -> Directive {
        if let TraceEvent::Exception { error } = event {
            warn!(%error, line = ?error.line, "target raised an uncaught error");
            self.shared.view.write().exception = Some(error.to_string());
            return Directive::Proceed;
        }
        if self.shared.terminate_requested() {
            return Directive::Unwind;
        }
        match event {
            TraceEvent::Line => self.on_line(stack),
            TraceEvent::Call { caller, callee } => {
                trace!(caller, callee, depth = stack.depth(), "call");
                let mut view = self.shared.view.write();
                view.tracker.record_call(caller, callee);
                view.profiler.start(callee, stack.line());
                Directive::Proceed
            }
            TraceEvent::Return { function } => {
                trace!(function, "return");
                let mut view = self.shared.view.write();
                view.profiler.finish(function);
                view.tracker.record_return(function);
                Directive::Proceed
            }
            TraceEvent::Exception { .. } => Directive::Proceed,
        }
    }
}
