use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::evaluator::Evaluator;
use crate::executor::Scope;

/// A line in a source unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Location {
    pub unit: String,
    pub line: usize,
}

impl Location {
    pub fn new(unit: impl Into<String>, line: usize) -> Self {
        Self {
            unit: unit.into(),
            line,
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.unit, self.line)
    }
}

/// A breakpoint request, optionally gated by a condition expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub location: Location,
    #[serde(default)]
    pub condition: Option<String>,
}

impl Breakpoint {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakpointInfo {
    pub condition: Option<String>,
}

/// Breakpoints grouped by unit, then line.
pub type BreakpointListing = BTreeMap<String, BTreeMap<usize, BreakpointInfo>>;

/// Armed breakpoints keyed by location. Conditions are stored as text and
/// only evaluated when execution reaches their line.
#[derive(Debug, Clone, Default)]
pub struct BreakpointRegistry {
    points: BTreeMap<Location, Option<String>>,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `location`. Setting without a condition drops any previous one.
    pub fn set(&mut self, location: Location, condition: Option<String>) {
        let condition = condition
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        debug!(%location, condition = ?condition, "breakpoint set");
        self.points.insert(location, condition);
    }

    pub fn clear(&mut self, location: &Location) -> bool {
        let removed = self.points.remove(location).is_some();
        if removed {
            debug!(%location, "breakpoint cleared");
        }
        removed
    }

    pub fn clear_all(&mut self) {
        self.points.clear();
    }

    /// Replace the whole set.
    pub fn replace(&mut self, breakpoints: impl IntoIterator<Item = Breakpoint>) {
        self.clear_all();
        for breakpoint in breakpoints {
            self.set(breakpoint.location, breakpoint.condition);
        }
    }

    pub fn is_armed(&self, location: &Location) -> bool {
        self.points.contains_key(location)
    }

    pub fn condition(&self, location: &Location) -> Option<&str> {
        self.points.get(location).and_then(|c| c.as_deref())
    }

    /// Whether execution at `location` should stop. A condition that fails
    /// to evaluate pauses anyway and is reported as a warning.
    pub fn should_pause(&self, location: &Location, scope: &Scope, evaluator: &Evaluator) -> bool {
        let Some(condition) = self.points.get(location) else {
            return false;
        };
        let Some(condition) = condition else {
            return true;
        };
        match evaluator.condition(condition, scope) {
            Ok(hit) => hit,
            Err(error) => {
                warn!(
                    %location,
                    condition = %condition,
                    %error,
                    "breakpoint condition failed, pausing"
                );
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Breakpoint> + '_ {
        self.points.iter().map(|(location, condition)| Breakpoint {
            location: location.clone(),
            condition: condition.clone(),
        })
    }

    pub fn listing(&self) -> BreakpointListing {
        let mut listing = BreakpointListing::new();
        for (location, condition) in &self.points {
            listing.entry(location.unit.clone()).or_default().insert(
                location.line,
                BreakpointInfo {
                    condition: condition.clone(),
                },
            );
        }
        listing
    }
}
