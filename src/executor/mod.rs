//! Tree-walking interpreter for script programs. Every call, line and return
//! boundary is reported to a [`Tracer`], which is how the debugger observes
//! and steers a run.

mod builtins;
mod output;
mod runner;
mod scope;
mod trace;
mod value;

pub use builtins::Builtin;
pub use output::{OutputBuffer, OutputSink};
pub use runner::{ExecError, Interpreter, RunOutcome};
pub use scope::{Bindings, Scope, MODULE_NAME};
pub use trace::{Directive, LiveLevel, LiveStack, NullTracer, TraceEvent, Tracer};
pub use value::Value;
