use std::collections::VecDeque;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::frames::{Frame, Variables};

/// Everything visible at one pause, captured for time travel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramState {
    pub frames: Vec<Frame>,
    pub variables: Variables,
    pub current_line: Option<usize>,
    pub output: String,
    pub timestamp: SystemTime,
}

impl ProgramState {
    pub fn new(
        frames: Vec<Frame>,
        variables: Variables,
        current_line: Option<usize>,
        output: String,
    ) -> Self {
        Self {
            frames,
            variables,
            current_line,
            output,
            timestamp: SystemTime::now(),
        }
    }
}

/// Bounded snapshot store with a movable cursor. The oldest entry is evicted
/// once capacity is exceeded.
#[derive(Debug, Clone)]
pub struct History {
    states: VecDeque<ProgramState>,
    capacity: usize,
    cursor: Option<usize>,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            states: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            cursor: None,
        }
    }

    /// Append `state` and move the cursor to it.
    pub fn capture(&mut self, state: ProgramState) {
        self.states.push_back(state);
        let mut cursor = self.states.len() - 1;
        if self.states.len() > self.capacity {
            self.states.pop_front();
            cursor -= 1;
        }
        self.cursor = Some(cursor);
    }

    pub fn current(&self) -> Option<&ProgramState> {
        self.cursor.and_then(|index| self.states.get(index))
    }

    /// Step the cursor one entry back. At the oldest entry this does nothing.
    pub fn rewind(&mut self) -> Option<&ProgramState> {
        if let Some(cursor) = self.cursor.as_mut() {
            *cursor = cursor.saturating_sub(1);
        }
        self.current()
    }

    pub fn size(&self) -> usize {
        self.states.len()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }
}
