//! Debug control core: breakpoints, stepping, snapshots and the session that
//! ties them to a running target.

mod breakpoints;
mod context;
mod control;
mod evaluator;
mod frames;
mod history;
mod profiler;
mod session;
mod stepping;
mod tracker;

pub use breakpoints::{Breakpoint, BreakpointInfo, BreakpointListing, BreakpointRegistry, Location};
pub use context::DebugContext;
pub use control::Phase;
pub use evaluator::{BindingScope, ChangeKind, Evaluation, EvaluationKind, Evaluator, SideEffect};
pub use frames::{DisplayMap, Frame, FrameBuilder, SourceExcerpt, Variables};
pub use history::{History, ProgramState};
pub use profiler::{FunctionProfile, Profile, Profiler};
pub use session::{Debugger, FocusRange, SessionHandle, Status, Visualization};
pub use stepping::{Command, RunMode};
pub use tracker::{CallGraphNode, EventKind, ExecutionStep, ExecutionTracker};
