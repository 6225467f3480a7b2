use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

const MAX_CODE_LEN: usize = 30;
const TRUNCATED_LEN: usize = 27;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Line,
    Call,
    Return,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Line => "line",
            EventKind::Call => "call",
            EventKind::Return => "return",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionStep {
    pub line: usize,
    pub code: String,
    pub event: EventKind,
    pub timestamp: SystemTime,
    pub call_depth: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallGraphNode {
    pub name: String,
    pub calls: BTreeSet<String>,
    pub called_from: BTreeSet<String>,
}

/// Records observed steps and call edges; renders them as Mermaid diagrams.
#[derive(Debug, Clone, Default)]
pub struct ExecutionTracker {
    steps: Vec<ExecutionStep>,
    graph: BTreeMap<String, CallGraphNode>,
    open_calls: Vec<String>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_step(&mut self, line: usize, code: &str, event: EventKind) {
        self.steps.push(ExecutionStep {
            line,
            code: clean_code(code),
            event,
            timestamp: SystemTime::now(),
            call_depth: self.open_calls.len(),
        });
    }

    pub fn record_call(&mut self, caller: &str, callee: &str) {
        self.node(caller).calls.insert(callee.to_string());
        self.node(callee).called_from.insert(caller.to_string());
        self.open_calls.push(callee.to_string());
    }

    /// Pops the innermost open call only when it is `callee`.
    pub fn record_return(&mut self, callee: &str) {
        if self.open_calls.last().is_some_and(|top| top == callee) {
            self.open_calls.pop();
        }
    }

    fn node(&mut self, name: &str) -> &mut CallGraphNode {
        self.graph
            .entry(name.to_string())
            .or_insert_with(|| CallGraphNode {
                name: name.to_string(),
                ..CallGraphNode::default()
            })
    }

    pub fn steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    pub fn call_graph(&self) -> &BTreeMap<String, CallGraphNode> {
        &self.graph
    }

    pub fn call_depth(&self) -> usize {
        self.open_calls.len()
    }

    pub fn to_flowchart(&self) -> String {
        if self.steps.is_empty() {
            return "flowchart TB\nstart[No execution steps yet]".to_string();
        }
        let mut nodes = Vec::with_capacity(self.steps.len() * 2);
        let mut edges = Vec::with_capacity(self.steps.len());
        for (i, step) in self.steps.iter().enumerate() {
            nodes.push(format!("node{i}[\"{}: {}\"]", step.line, step.code));
            nodes.push(format!(
                "click node{i} callback \"Line {}<br/>Code: {}<br/>Event: {}\"",
                step.line,
                step.code,
                step.event.as_str()
            ));
            if i > 0 {
                edges.push(format!("node{} --> node{i}", i - 1));
            }
        }
        format!("flowchart TB\n{}\n{}", nodes.join("\n"), edges.join("\n"))
    }

    pub fn to_call_graph(&self) -> String {
        if self.graph.is_empty() {
            return "flowchart LR\nstart[No function calls yet]".to_string();
        }
        let mut nodes = String::new();
        let mut edges = Vec::new();
        for (name, node) in &self.graph {
            let id = node_id(name);
            let _ = writeln!(nodes, "{id}[\"{name}\"]");
            let _ = writeln!(
                nodes,
                "click {id} callback \"Function: {name}<br/>Calls: {}<br/>Called by: {}\"",
                node.calls.len(),
                node.called_from.len()
            );
            for callee in &node.calls {
                edges.push(format!("{id} --> {}", node_id(callee)));
            }
        }
        format!("flowchart LR\n{}{}", nodes, edges.join("\n"))
    }
}

/// Diagram-safe single-line rendering of a source line.
pub fn clean_code(code: &str) -> String {
    let clean = code.trim().replace('"', "'").replace('\n', " ");
    if clean.chars().count() > MAX_CODE_LEN {
        let mut short: String = clean.chars().take(TRUNCATED_LEN).collect();
        short.push_str("...");
        short
    } else {
        clean
    }
}

fn node_id(name: &str) -> String {
    name.replace(['<', '>'], "").replace(' ', "_")
}
