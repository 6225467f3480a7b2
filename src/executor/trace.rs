use super::scope::{Activation, Bindings, Scope};
use crate::error::RuntimeError;

/// Notification that execution reached a call, line or return boundary.
#[derive(Debug, Clone, Copy)]
pub enum TraceEvent<'e> {
    /// A function activation was pushed; its body has not run yet.
    Call { caller: &'e str, callee: &'e str },
    /// The innermost frame is about to execute its current line.
    Line,
    /// The innermost activation is about to be popped.
    Return { function: &'e str },
    /// A runtime error escaped the module level.
    Exception { error: &'e RuntimeError },
}

/// What the interpreter should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Proceed,
    /// Stop at this checkpoint and unwind the whole run.
    Unwind,
}

/// Receiver of trace events. Runs on the interpreter's thread and may block.
pub trait Tracer {
    fn on_event(&mut self, event: TraceEvent<'_>, stack: &LiveStack<'_>) -> Directive;
}

/// Tracer that never intervenes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTracer;

impl Tracer for NullTracer {
    fn on_event(&mut self, _event: TraceEvent<'_>, _stack: &LiveStack<'_>) -> Directive {
        Directive::Proceed
    }
}

/// Read-only view of the interpreter's stack at a trace event.
pub struct LiveStack<'a> {
    frames: &'a [Activation],
    globals: &'a Bindings,
}

/// One stack level as seen through a [`LiveStack`].
#[derive(Debug, Clone, Copy)]
pub struct LiveLevel<'a> {
    pub function: &'a str,
    pub line: usize,
    pub locals: &'a Bindings,
    pub globals: &'a Bindings,
}

impl<'a> LiveStack<'a> {
    pub(crate) fn new(frames: &'a [Activation], globals: &'a Bindings) -> Self {
        Self { frames, globals }
    }

    /// Number of open function activations (module level is depth 0).
    pub fn depth(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    pub fn line(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.line)
    }

    pub fn function(&self) -> &'a str {
        self.frames
            .last()
            .map_or(super::scope::MODULE_NAME, |frame| frame.function.as_str())
    }

    /// Stack levels, innermost first.
    pub fn levels(&self) -> impl Iterator<Item = LiveLevel<'a>> + '_ {
        let globals = self.globals;
        self.frames.iter().rev().map(move |frame| LiveLevel {
            function: &frame.function,
            line: frame.line,
            locals: if frame.module { globals } else { &frame.locals },
            globals,
        })
    }

    /// Detached copy of the innermost level's bindings.
    pub fn scope(&self) -> Scope {
        match self.levels().next() {
            Some(level) => Scope::new(level.locals.clone(), level.globals.clone()),
            None => Scope::new(Bindings::new(), self.globals.clone()),
        }
    }
}
