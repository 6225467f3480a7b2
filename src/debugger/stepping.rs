use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Run modes for the debugger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Only breakpoints pause.
    Continue,
    /// Pause at the next line event at any depth.
    StepInto,
    /// Pause at the next line event at `depth` or shallower.
    StepOver { depth: usize },
}

impl RunMode {
    pub fn pauses_at(self, depth: usize) -> bool {
        match self {
            RunMode::Continue => false,
            RunMode::StepInto => true,
            RunMode::StepOver { depth: bound } => depth <= bound,
        }
    }
}

/// Operator command delivered to a paused session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Command {
    Step,
    StepOver,
    Continue,
    Rewind,
    Terminate,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Step => "step",
            Command::StepOver => "step-over",
            Command::Continue => "continue",
            Command::Rewind => "rewind",
            Command::Terminate => "terminate",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ProtocolError;

    fn from_str(kind: &str) -> Result<Self, Self::Err> {
        match kind.trim() {
            "step" => Ok(Command::Step),
            "step-over" | "step_over" | "next" => Ok(Command::StepOver),
            "continue" => Ok(Command::Continue),
            "rewind" | "step_back" | "back" => Ok(Command::Rewind),
            "terminate" | "quit" => Ok(Command::Terminate),
            other => Err(ProtocolError::UnknownCommand(other.to_string())),
        }
    }
}
