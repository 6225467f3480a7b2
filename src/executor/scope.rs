use std::collections::HashSet;

use indexmap::IndexMap;

use super::value::Value;

pub type Bindings = IndexMap<String, Value>;

/// Detached copy of the bindings visible at one stack level.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scope {
    pub locals: Bindings,
    pub globals: Bindings,
}

impl Scope {
    pub fn new(locals: Bindings, globals: Bindings) -> Self {
        Self { locals, globals }
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.locals.get(name).or_else(|| self.globals.get(name))
    }
}

/// One activation record of the running interpreter.
#[derive(Debug, Clone)]
pub(crate) struct Activation {
    pub function: String,
    pub line: usize,
    pub locals: Bindings,
    pub global_names: HashSet<String>,
    /// Module level reads and writes go straight to globals.
    pub module: bool,
}

impl Activation {
    pub fn module() -> Self {
        Self {
            function: MODULE_NAME.to_string(),
            line: 0,
            locals: Bindings::new(),
            global_names: HashSet::new(),
            module: true,
        }
    }

    pub fn function(name: &str, line: usize, locals: Bindings) -> Self {
        Self {
            function: name.to_string(),
            line,
            locals,
            global_names: HashSet::new(),
            module: false,
        }
    }
}

/// Function name reported for top-level code.
pub const MODULE_NAME: &str = "<module>";
