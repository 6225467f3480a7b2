use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::executor::{Bindings, ExecError, Interpreter, NullTracer, OutputBuffer, Scope};
use crate::parser::{dedent, parse_expression, parse_program};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvaluationKind {
    Expression,
    Statement,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    New,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingScope {
    Local,
    Global,
}

/// A binding the evaluated code created or changed in its scope copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideEffect {
    pub name: String,
    pub change: ChangeKind,
    pub scope: BindingScope,
}

impl fmt::Display for SideEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let change = match self.change {
            ChangeKind::New => "New",
            ChangeKind::Modified => "Modified",
        };
        let scope = match self.scope {
            BindingScope::Local => "local",
            BindingScope::Global => "global",
        };
        write!(f, "{change} {scope} variable: {}", self.name)
    }
}

/// Result of an ad-hoc evaluation. Failures are reported here, never as `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub kind: EvaluationKind,
    pub result: Option<String>,
    pub error: Option<String>,
    pub output: String,
    pub side_effects: Vec<SideEffect>,
}

impl Evaluation {
    fn failed(error: impl fmt::Display, output: &OutputBuffer) -> Self {
        Self {
            kind: EvaluationKind::Error,
            result: None,
            error: Some(error.to_string()),
            output: output.contents(),
            side_effects: Vec::new(),
        }
    }

    pub fn notes(&self) -> Vec<String> {
        self.side_effects.iter().map(ToString::to_string).collect()
    }
}

/// Runs expressions and statements against an isolated copy of a scope.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    max_call_depth: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(200)
    }
}

impl Evaluator {
    pub fn new(max_call_depth: usize) -> Self {
        Self { max_call_depth }
    }

    /// Evaluate `text` as one expression, or as statements when it does not
    /// parse as an expression. `scope` itself is never touched.
    pub fn evaluate(&self, text: &str, scope: &Scope) -> Evaluation {
        let text = dedent(text);
        let output = OutputBuffer::new();
        let mut tracer = NullTracer;
        let mut interpreter =
            Interpreter::with_scope(scope.clone(), &mut tracer, &output, self.max_call_depth);

        let (kind, result) = match parse_expression(&text) {
            Ok(expr) => match interpreter.eval_expression(&expr) {
                Ok(value) => (EvaluationKind::Expression, Some(value.repr())),
                Err(err) => return Evaluation::failed(describe(err), &output),
            },
            Err(_) => {
                let program = match parse_program(&text) {
                    Ok(program) => program,
                    Err(err) => return Evaluation::failed(err, &output),
                };
                if let Err(err) = interpreter.exec_statements(&program.statements) {
                    return Evaluation::failed(describe(err), &output);
                }
                (EvaluationKind::Statement, None)
            }
        };

        let after = interpreter.into_scope();
        let mut side_effects = diff(&scope.locals, &after.locals, BindingScope::Local);
        side_effects.extend(diff(&scope.globals, &after.globals, BindingScope::Global));
        debug!(?kind, side_effects = side_effects.len(), "evaluated");

        Evaluation {
            kind,
            result,
            error: None,
            output: output.contents(),
            side_effects,
        }
    }

    /// Truthiness of a breakpoint condition, or the reason it could not be
    /// evaluated.
    pub fn condition(&self, text: &str, scope: &Scope) -> Result<bool, String> {
        let expr = parse_expression(text.trim()).map_err(|err| err.to_string())?;
        let output = OutputBuffer::new();
        let mut tracer = NullTracer;
        let mut interpreter =
            Interpreter::with_scope(scope.clone(), &mut tracer, &output, self.max_call_depth);
        interpreter
            .eval_expression(&expr)
            .map(|value| value.is_truthy())
            .map_err(describe)
    }
}

fn describe(err: ExecError) -> String {
    match err {
        ExecError::Runtime(err) => err.to_string(),
        ExecError::Terminated => "evaluation interrupted".to_string(),
    }
}

fn diff(before: &Bindings, after: &Bindings, scope: BindingScope) -> Vec<SideEffect> {
    after
        .iter()
        .filter_map(|(name, value)| {
            let change = match before.get(name) {
                None => ChangeKind::New,
                Some(old) if old != value => ChangeKind::Modified,
                Some(_) => return None,
            };
            Some(SideEffect {
                name: name.clone(),
                change,
                scope,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Value;

    fn scope() -> Scope {
        let mut scope = Scope::default();
        scope.locals.insert("x".into(), Value::Int(5));
        scope.globals.insert("limit".into(), Value::Int(10));
        scope
    }

    #[test]
    fn expressions_return_their_repr() {
        let evaluation = Evaluator::default().evaluate("x * 2 + limit", &scope());
        assert_eq!(evaluation.kind, EvaluationKind::Expression);
        assert_eq!(evaluation.result.as_deref(), Some("20"));
        assert!(evaluation.side_effects.is_empty());
    }

    #[test]
    fn statements_report_modified_locals() {
        let original = scope();
        let evaluation = Evaluator::default().evaluate("x = x + 1", &original);
        assert_eq!(evaluation.kind, EvaluationKind::Statement);
        assert_eq!(evaluation.result, None);
        assert_eq!(evaluation.notes(), ["Modified local variable: x"]);
        assert_eq!(original.locals.get("x"), Some(&Value::Int(5)));
    }

    #[test]
    fn new_and_global_bindings_are_classified() {
        let evaluation =
            Evaluator::default().evaluate("global limit\nlimit = 1\nfresh = [1]", &scope());
        assert_eq!(
            evaluation.notes(),
            ["New local variable: fresh", "Modified global variable: limit"]
        );
    }

    #[test]
    fn output_is_captured_up_to_the_failure() {
        let evaluation = Evaluator::default().evaluate("print('hi')\nx / 0", &scope());
        assert_eq!(evaluation.kind, EvaluationKind::Error);
        assert_eq!(evaluation.output, "hi\n");
        assert_eq!(
            evaluation.error.as_deref(),
            Some("ZeroDivisionError: division by zero")
        );
    }

    #[test]
    fn indented_snippets_are_dedented() {
        let evaluation = Evaluator::default().evaluate("    y = x\n    print(y)\n", &scope());
        assert_eq!(evaluation.kind, EvaluationKind::Statement);
        assert_eq!(evaluation.output, "5\n");
    }

    #[test]
    fn syntax_errors_are_values() {
        let evaluation = Evaluator::default().evaluate("x = = 1", &scope());
        assert_eq!(evaluation.kind, EvaluationKind::Error);
        assert!(evaluation
            .error
            .as_deref()
            .is_some_and(|e| e.starts_with("SyntaxError")));
    }

    #[test]
    fn deeply_nested_input_is_an_error_value() {
        let deep = format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000));
        let evaluation = Evaluator::default().evaluate(&deep, &scope());
        assert_eq!(evaluation.kind, EvaluationKind::Error);
        assert!(Evaluator::default().condition(&deep, &scope()).is_err());
    }

    #[test]
    fn mixed_unicode_indentation_is_not_split() {
        let evaluation = Evaluator::default().evaluate("\u{a0}\u{a0}x = 1\n y = 2", &scope());
        assert_eq!(evaluation.kind, EvaluationKind::Statement);
        assert_eq!(
            evaluation.notes(),
            ["Modified local variable: x", "New local variable: y"]
        );
    }

    #[test]
    fn conditions_report_failures() {
        let evaluator = Evaluator::default();
        assert_eq!(evaluator.condition("x == 5", &scope()), Ok(true));
        assert_eq!(evaluator.condition("x < 0", &scope()), Ok(false));
        assert!(evaluator.condition("nope", &scope()).is_err());
    }
}
