use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionProfile {
    pub calls: u64,
    pub total_time: Duration,
    pub avg_time: Duration,
    pub last_call_time: Duration,
    /// Line of the function's definition.
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub functions: BTreeMap<String, FunctionProfile>,
    pub total_time: Duration,
}

/// Wall-clock timing of script functions, driven by call and return events.
#[derive(Debug, Default)]
pub struct Profiler {
    functions: BTreeMap<String, FunctionProfile>,
    open: HashMap<String, Vec<Instant>>,
}

impl Profiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self, function: &str, line: usize) {
        self.open
            .entry(function.to_string())
            .or_default()
            .push(Instant::now());
        let entry = self
            .functions
            .entry(function.to_string())
            .or_insert_with(|| FunctionProfile {
                line,
                ..FunctionProfile::default()
            });
        entry.calls += 1;
    }

    /// Stops the innermost open activation of `function`. Unmatched returns
    /// are ignored.
    pub fn finish(&mut self, function: &str) {
        let Some(started) = self.open.get_mut(function).and_then(Vec::pop) else {
            return;
        };
        let elapsed = started.elapsed();
        if let Some(entry) = self.functions.get_mut(function) {
            entry.total_time += elapsed;
            entry.last_call_time = elapsed;
            entry.avg_time = average(entry.total_time, entry.calls);
        }
    }

    pub fn profile(&self) -> Profile {
        Profile {
            total_time: self.functions.values().map(|p| p.total_time).sum(),
            functions: self.functions.clone(),
        }
    }
}

/// Mean duration per call. Counts past `u32::MAX` saturate.
fn average(total: Duration, calls: u64) -> Duration {
    total / u32::try_from(calls.max(1)).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recursive_activations_are_timed_separately() {
        let mut profiler = Profiler::new();
        profiler.start("fib", 1);
        profiler.start("fib", 1);
        profiler.finish("fib");
        profiler.finish("fib");
        profiler.finish("fib");
        let profile = profiler.profile();
        let fib = &profile.functions["fib"];
        assert_eq!(fib.calls, 2);
        assert_eq!(fib.line, 1);
        assert!(fib.total_time >= fib.last_call_time);
        assert_eq!(profile.total_time, fib.total_time);
    }

    #[test]
    fn unmatched_finish_is_ignored() {
        let mut profiler = Profiler::new();
        profiler.finish("ghost");
        assert!(profiler.profile().functions.is_empty());
    }

    #[test]
    fn average_survives_huge_call_counts() {
        let total = Duration::from_secs(8);
        assert_eq!(average(total, 0), total);
        assert_eq!(average(total, 4), Duration::from_secs(2));
        assert_eq!(average(total, 1 << 32), total / u32::MAX);
    }
}
