//! Interactive debugger for line-oriented scripts: a tree-walking interpreter
//! instrumented with trace events, and a debug control core that pauses,
//! steps, rewinds and inspects a run from another thread.

pub mod config;
pub mod debugger;
pub mod error;
pub mod executor;
pub mod parser;

pub use config::DebuggerConfig;
pub use debugger::{Debugger, SessionHandle};
pub use error::{DebugError, DebugResult};
