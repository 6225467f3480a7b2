use std::sync::Arc;

use super::builtins::{self, Builtin};
use super::output::OutputSink;
use super::scope::{Activation, Bindings, Scope, MODULE_NAME};
use super::trace::{Directive, LiveStack, TraceEvent, Tracer};
use super::value::Value;
use crate::error::{ErrorKind, RuntimeError};
use crate::parser::{Expr, Function, LogicalOp, Program, Stmt, StmtKind, Target, UnaryOp};

/// Why execution stopped early.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecError {
    Runtime(RuntimeError),
    /// The tracer asked to unwind.
    Terminated,
}

impl From<RuntimeError> for ExecError {
    fn from(err: RuntimeError) -> Self {
        ExecError::Runtime(err)
    }
}

impl ExecError {
    fn at_line(self, line: usize) -> Self {
        match self {
            ExecError::Runtime(err) => ExecError::Runtime(err.at_line(line)),
            other => other,
        }
    }
}

/// How a whole run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed,
    Terminated,
    Failed(RuntimeError),
}

enum Flow {
    Normal,
    Break,
    Continue,
    Return(Value),
}

/// Tree-walking interpreter that reports every call, line and return to a
/// [`Tracer`].
pub struct Interpreter<'t> {
    globals: Bindings,
    frames: Vec<Activation>,
    tracer: &'t mut dyn Tracer,
    output: &'t dyn OutputSink,
    max_depth: usize,
}

impl<'t> Interpreter<'t> {
    /// Interpreter for a fresh program run at module level.
    pub fn new(tracer: &'t mut dyn Tracer, output: &'t dyn OutputSink, max_depth: usize) -> Self {
        Self {
            globals: Bindings::new(),
            frames: vec![Activation::module()],
            tracer,
            output,
            max_depth,
        }
    }

    /// Interpreter whose single frame holds a copy of `scope`. Assignments
    /// land in the copied locals unless declared `global`.
    pub fn with_scope(
        scope: Scope,
        tracer: &'t mut dyn Tracer,
        output: &'t dyn OutputSink,
        max_depth: usize,
    ) -> Self {
        Self {
            globals: scope.globals,
            frames: vec![Activation::function("<eval>", 0, scope.locals)],
            tracer,
            output,
            max_depth,
        }
    }

    /// Bindings of the bottom frame after execution.
    pub fn into_scope(mut self) -> Scope {
        let locals = self
            .frames
            .drain(..)
            .next()
            .map(|frame| frame.locals)
            .unwrap_or_default();
        Scope::new(locals, self.globals)
    }

    pub fn run(&mut self, program: &Program) -> RunOutcome {
        match self.exec_block(&program.statements) {
            Ok(_) => RunOutcome::Completed,
            Err(ExecError::Terminated) => RunOutcome::Terminated,
            Err(ExecError::Runtime(err)) => {
                // The run is over either way; the directive does not matter.
                let _ = self.trace(TraceEvent::Exception { error: &err });
                RunOutcome::Failed(err)
            }
        }
    }

    /// Execute statements in the current frame.
    pub fn exec_statements(&mut self, statements: &[Stmt]) -> Result<(), ExecError> {
        self.exec_block(statements).map(|_| ())
    }

    pub fn eval_expression(&mut self, expr: &Expr) -> Result<Value, ExecError> {
        self.eval(expr)
    }

    // ---- tracing -------------------------------------------------------

    fn trace(&mut self, event: TraceEvent<'_>) -> Result<(), ExecError> {
        let stack = LiveStack::new(&self.frames, &self.globals);
        match self.tracer.on_event(event, &stack) {
            Directive::Proceed => Ok(()),
            Directive::Unwind => Err(ExecError::Terminated),
        }
    }

    fn line_event(&mut self, line: usize) -> Result<(), ExecError> {
        if let Some(frame) = self.frames.last_mut() {
            frame.line = line;
        }
        self.trace(TraceEvent::Line)
    }

    // ---- statements ----------------------------------------------------

    fn exec_block(&mut self, statements: &[Stmt]) -> Result<Flow, ExecError> {
        for stmt in statements {
            match self.exec_stmt(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Result<Flow, ExecError> {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for branch in branches {
                    self.line_event(branch.line)?;
                    if self.eval_at(&branch.condition, branch.line)?.is_truthy() {
                        return self.exec_block(&branch.body);
                    }
                }
                match otherwise {
                    Some(body) => self.exec_block(body),
                    None => Ok(Flow::Normal),
                }
            }
            StmtKind::While { condition, body } => loop {
                self.line_event(line)?;
                if !self.eval_at(condition, line)?.is_truthy() {
                    return Ok(Flow::Normal);
                }
                match self.exec_block(body)? {
                    Flow::Break => return Ok(Flow::Normal),
                    Flow::Return(value) => return Ok(Flow::Return(value)),
                    Flow::Normal | Flow::Continue => {}
                }
            },
            StmtKind::For {
                var,
                iterable,
                body,
            } => {
                self.line_event(line)?;
                let items = self.eval_at(iterable, line)?;
                let items = builtins::iterate(items).map_err(|err| err.at_line(line))?;
                let mut items = items.into_iter();
                let mut first = true;
                loop {
                    if !first {
                        self.line_event(line)?;
                    }
                    first = false;
                    let Some(item) = items.next() else {
                        return Ok(Flow::Normal);
                    };
                    self.assign_name(var, item);
                    match self.exec_block(body)? {
                        Flow::Break => return Ok(Flow::Normal),
                        Flow::Return(value) => return Ok(Flow::Return(value)),
                        Flow::Normal | Flow::Continue => {}
                    }
                }
            }
            simple => {
                self.line_event(line)?;
                self.exec_simple(simple, line)
            }
        }
    }

    fn exec_simple(&mut self, kind: &StmtKind, line: usize) -> Result<Flow, ExecError> {
        match kind {
            StmtKind::Expr(expr) => {
                self.eval_at(expr, line)?;
            }
            StmtKind::Assign { target, op, value } => {
                let mut value = self.eval_at(value, line)?;
                if let Some(op) = op {
                    let current = self.read_target(target, line)?;
                    value = builtins::binary(*op, &current, &value)
                        .map_err(|err| err.at_line(line))?;
                }
                self.store(target, value, line)?;
            }
            StmtKind::Def(function) => {
                self.assign_name(&function.name, Value::Function(Arc::clone(function)));
            }
            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => self.eval_at(expr, line)?,
                    None => Value::Nil,
                };
                return Ok(Flow::Return(value));
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
            StmtKind::Global(names) => {
                if let Some(frame) = self.frames.last_mut() {
                    if !frame.module {
                        frame.global_names.extend(names.iter().cloned());
                    }
                }
            }
            StmtKind::Pass => {}
            StmtKind::If { .. } | StmtKind::While { .. } | StmtKind::For { .. } => {
                unreachable!("compound statements are handled by exec_stmt")
            }
        }
        Ok(Flow::Normal)
    }

    // ---- variables -----------------------------------------------------

    fn writes_global(&self, name: &str) -> bool {
        self.frames
            .last()
            .map_or(true, |frame| frame.module || frame.global_names.contains(name))
    }

    fn assign_name(&mut self, name: &str, value: Value) {
        if self.writes_global(name) {
            self.globals.insert(name.to_string(), value);
        } else if let Some(frame) = self.frames.last_mut() {
            frame.locals.insert(name.to_string(), value);
        }
    }

    fn lookup(&self, name: &str) -> Option<&Value> {
        let local = match self.frames.last() {
            Some(frame) if !frame.module && !frame.global_names.contains(name) => {
                frame.locals.get(name)
            }
            _ => None,
        };
        local.or_else(|| self.globals.get(name))
    }

    fn read_target(&mut self, target: &Target, line: usize) -> Result<Value, ExecError> {
        match target {
            Target::Name(name) => self
                .lookup(name)
                .cloned()
                .ok_or_else(|| ExecError::Runtime(RuntimeError::name(name).at_line(line))),
            Target::Index { target, index } => {
                let container = self.read_target(target, line)?;
                let index = self.eval_at(index, line)?;
                builtins::get_item(&container, &index)
                    .map_err(|err| ExecError::Runtime(err.at_line(line)))
            }
        }
    }

    fn store(&mut self, target: &Target, value: Value, line: usize) -> Result<(), ExecError> {
        match target {
            Target::Name(name) => {
                self.assign_name(name, value);
                Ok(())
            }
            Target::Index {
                target: inner,
                index,
            } => {
                let mut container = self.read_target(inner, line)?;
                let index = self.eval_at(index, line)?;
                builtins::set_item(&mut container, &index, value)
                    .map_err(|err| err.at_line(line))?;
                self.store(inner, container, line)
            }
        }
    }

    // ---- expressions ---------------------------------------------------

    fn eval_at(&mut self, expr: &Expr, line: usize) -> Result<Value, ExecError> {
        self.eval(expr).map_err(|err| err.at_line(line))
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ExecError> {
        let value = match expr {
            Expr::Nil => Value::Nil,
            Expr::Bool(b) => Value::Bool(*b),
            Expr::Int(i) => Value::Int(*i),
            Expr::Float(f) => Value::Float(*f),
            Expr::Str(s) => Value::Str(s.clone()),
            Expr::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item)?);
                }
                Value::List(values)
            }
            Expr::Name(name) => self
                .lookup(name)
                .cloned()
                .ok_or_else(|| RuntimeError::name(name))?,
            Expr::Unary { op, operand } => {
                let operand = self.eval(operand)?;
                match (op, operand) {
                    (UnaryOp::Not, value) => Value::Bool(!value.is_truthy()),
                    (UnaryOp::Neg, Value::Int(i)) => Value::Int(i.checked_neg().ok_or_else(|| {
                        RuntimeError::new(ErrorKind::ValueError, "integer overflow")
                    })?),
                    (UnaryOp::Neg, Value::Float(f)) => Value::Float(-f),
                    (UnaryOp::Neg, other) => {
                        return Err(RuntimeError::type_error(format!(
                            "bad operand type for unary -: '{}'",
                            other.type_name()
                        ))
                        .into())
                    }
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                builtins::binary(*op, &lhs, &rhs)?
            }
            Expr::Logical { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                match (op, lhs.is_truthy()) {
                    (LogicalOp::And, false) | (LogicalOp::Or, true) => lhs,
                    _ => self.eval(rhs)?,
                }
            }
            Expr::Call { callee, args } => return self.eval_call(callee, args),
            Expr::Index { target, index } => {
                let container = self.eval(target)?;
                let index = self.eval(index)?;
                builtins::get_item(&container, &index)?
            }
        };
        Ok(value)
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value, ExecError> {
        let builtin = match callee {
            Expr::Name(name) if self.lookup(name).is_none() => Builtin::lookup(name),
            _ => None,
        };
        let function = match builtin {
            Some(_) => None,
            None => Some(self.eval(callee)?),
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval(arg)?);
        }

        match (builtin, function) {
            (Some(builtin), _) => Ok(builtin.call(values, self.output)?),
            (None, Some(Value::Function(function))) => self.call_function(function, values),
            (None, Some(other)) => Err(RuntimeError::type_error(format!(
                "'{}' object is not callable",
                other.type_name()
            ))
            .into()),
            (None, None) => unreachable!("callee is evaluated when no builtin matches"),
        }
    }

    fn call_function(
        &mut self,
        function: Arc<Function>,
        args: Vec<Value>,
    ) -> Result<Value, ExecError> {
        if args.len() != function.params.len() {
            return Err(RuntimeError::type_error(format!(
                "{}() takes {} positional argument(s) but {} were given",
                function.name,
                function.params.len(),
                args.len()
            ))
            .into());
        }
        if self.frames.len() > self.max_depth {
            return Err(RuntimeError::new(
                ErrorKind::RecursionError,
                "maximum recursion depth exceeded",
            )
            .into());
        }

        let locals: Bindings = function.params.iter().cloned().zip(args).collect();
        let caller = self
            .frames
            .last()
            .map_or_else(|| MODULE_NAME.to_string(), |frame| frame.function.clone());
        self.frames
            .push(Activation::function(&function.name, function.line, locals));

        let result = match self.trace(TraceEvent::Call {
            caller: &caller,
            callee: &function.name,
        }) {
            Ok(()) => self.exec_block(&function.body),
            Err(err) => Err(err),
        };
        if matches!(result, Err(ExecError::Terminated)) {
            self.frames.pop();
            return Err(ExecError::Terminated);
        }

        let returned = self.trace(TraceEvent::Return {
            function: &function.name,
        });
        self.frames.pop();
        returned?;

        match result? {
            Flow::Return(value) => Ok(value),
            _ => Ok(Value::Nil),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{NullTracer, OutputBuffer};
    use crate::parser::parse_program;

    fn run(source: &str) -> (RunOutcome, String) {
        let program = parse_program(source).unwrap();
        let output = OutputBuffer::new();
        let mut tracer = NullTracer;
        let outcome = Interpreter::new(&mut tracer, &output, 50).run(&program);
        (outcome, output.contents())
    }

    struct Recorder(Vec<String>);

    impl Tracer for Recorder {
        fn on_event(&mut self, event: TraceEvent<'_>, stack: &LiveStack<'_>) -> Directive {
            let entry = match event {
                TraceEvent::Call { caller, callee } => format!("call {caller}->{callee}"),
                TraceEvent::Line => format!("line {}@{}", stack.line(), stack.depth()),
                TraceEvent::Return { function } => format!("return {function}"),
                TraceEvent::Exception { error } => format!("exception {error}"),
            };
            self.0.push(entry);
            Directive::Proceed
        }
    }

    #[test]
    fn loops_functions_and_output() {
        let (outcome, output) = run(
            "def fact(n)\n  if n <= 1\n    return 1\n  end\n  return n * fact(n - 1)\nend\nfor i in range(1, 5)\n  print(i, fact(i))\nend\n",
        );
        assert_eq!(outcome, RunOutcome::Completed);
        assert_eq!(output, "1 1\n2 2\n3 6\n4 24\n");
    }

    #[test]
    fn globals_require_declaration_inside_functions() {
        let (_, output) = run(
            "count = 0\ndef bump()\n  global count\n  count += 1\nend\ndef shadow()\n  count = 100\nend\nbump(); bump(); shadow()\nprint(count)\n",
        );
        assert_eq!(output, "2\n");
    }

    #[test]
    fn indexed_assignment_updates_nested_lists() {
        let (_, output) =
            run("grid = [[0, 0], [0, 0]]\ngrid[1][0] = 5\ngrid[0][-1] += 2\nprint(grid)\n");
        assert_eq!(output, "[[0, 2], [5, 0]]\n");
    }

    #[test]
    fn runtime_errors_carry_category_and_line() {
        let (outcome, output) = run("print('before')\nx = 1\ny = x / 0\nprint('after')\n");
        assert_eq!(output, "before\n");
        let RunOutcome::Failed(err) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn unbounded_recursion_is_a_recursion_error() {
        let (outcome, _) = run("def f(n)\n  return f(n + 1)\nend\nf(0)\n");
        let RunOutcome::Failed(err) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(err.kind, ErrorKind::RecursionError);
    }

    #[test]
    fn trace_order_for_calls_and_loops() {
        let program =
            parse_program("def f(a)\n  return a\nend\nfor i in [1]\n  f(i)\nend\n").unwrap();
        let output = OutputBuffer::new();
        let mut recorder = Recorder(Vec::new());
        Interpreter::new(&mut recorder, &output, 50).run(&program);
        assert_eq!(
            recorder.0,
            [
                "line 1@0",
                "line 4@0",
                "line 5@0",
                "call <module>->f",
                "line 2@1",
                "return f",
                "line 4@0",
            ]
        );
    }

    #[test]
    fn errors_inside_functions_still_report_returns() {
        let program = parse_program("def f()\n  return missing\nend\nf()\n").unwrap();
        let output = OutputBuffer::new();
        let mut recorder = Recorder(Vec::new());
        let outcome = Interpreter::new(&mut recorder, &output, 50).run(&program);
        assert!(matches!(outcome, RunOutcome::Failed(_)));
        assert_eq!(
            recorder.0[recorder.0.len() - 2..],
            [
                "return f".to_string(),
                "exception NameError: name 'missing' is not defined".to_string()
            ]
        );
    }

    #[test]
    fn unwind_directive_stops_at_the_checkpoint() {
        struct StopAt(usize);
        impl Tracer for StopAt {
            fn on_event(&mut self, event: TraceEvent<'_>, stack: &LiveStack<'_>) -> Directive {
                match event {
                    TraceEvent::Line if stack.line() == self.0 => Directive::Unwind,
                    _ => Directive::Proceed,
                }
            }
        }
        let program = parse_program("print(1)\nprint(2)\nprint(3)\n").unwrap();
        let output = OutputBuffer::new();
        let mut tracer = StopAt(2);
        let outcome = Interpreter::new(&mut tracer, &output, 50).run(&program);
        assert_eq!(outcome, RunOutcome::Terminated);
        assert_eq!(output.contents(), "1\n");
    }

    #[test]
    fn scoped_interpreter_writes_to_copied_locals() {
        let mut scope = Scope::default();
        scope.locals.insert("x".into(), Value::Int(5));
        scope.globals.insert("x".into(), Value::Int(5));
        let program = parse_program("x = x + 1\ny = 2").unwrap();
        let output = OutputBuffer::new();
        let mut tracer = NullTracer;
        let mut interpreter = Interpreter::with_scope(scope, &mut tracer, &output, 50);
        interpreter.exec_statements(&program.statements).unwrap();
        let scope = interpreter.into_scope();
        assert_eq!(scope.locals.get("x"), Some(&Value::Int(6)));
        assert_eq!(scope.locals.get("y"), Some(&Value::Int(2)));
        assert_eq!(scope.globals.get("x"), Some(&Value::Int(5)));
    }
}
