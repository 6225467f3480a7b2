//! Debugger configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{DebugError, DebugResult};

/// Tunables for a debugging session. Every field has a default, so a TOML
/// file only needs the keys it wants to change.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebuggerConfig {
    /// Maximum number of snapshots kept for time travel.
    pub history_capacity: usize,
    /// Source lines shown on each side of a frame's current line.
    pub context_lines: usize,
    /// Pause on the first line event of a run.
    pub stop_on_entry: bool,
    /// How long `start_run` waits for a previous session to terminate.
    pub teardown_timeout_ms: u64,
    /// Interval at which a paused executor logs that it is still waiting.
    pub liveness_poll_ms: u64,
    /// Deepest call nesting before the target raises `RecursionError`.
    pub max_call_depth: usize,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 100,
            context_lines: 3,
            stop_on_entry: true,
            teardown_timeout_ms: 2_000,
            liveness_poll_ms: 5_000,
            max_call_depth: 200,
        }
    }
}

impl DebuggerConfig {
    pub fn from_toml_str(text: &str) -> DebugResult<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> DebugResult<Self> {
        let text = std::fs::read_to_string(path).map_err(DebugError::ConfigIo)?;
        Self::from_toml_str(&text)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    pub fn liveness_poll(&self) -> Duration {
        Duration::from_millis(self.liveness_poll_ms.max(1))
    }
}
