//! Error types shared across the crate.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Syntax error in a program or an evaluated snippet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("SyntaxError: {message} (line {line})")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Category of a target runtime error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NameError,
    TypeError,
    ValueError,
    ZeroDivisionError,
    IndexError,
    RecursionError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NameError => "NameError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::ValueError => "ValueError",
            ErrorKind::ZeroDivisionError => "ZeroDivisionError",
            ErrorKind::IndexError => "IndexError",
            ErrorKind::RecursionError => "RecursionError",
        };
        f.write_str(name)
    }
}

/// Error raised by running script code. `Display` is the one-line
/// classification recorded as a session's exception.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct RuntimeError {
    pub kind: ErrorKind,
    pub message: String,
    /// Line executing when the error was raised, once known.
    pub line: Option<usize>,
}

impl RuntimeError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: None,
        }
    }

    pub fn name(name: &str) -> Self {
        Self::new(ErrorKind::NameError, format!("name '{name}' is not defined"))
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeError, message)
    }

    pub(crate) fn at_line(mut self, line: usize) -> Self {
        if self.line.is_none() {
            self.line = Some(line);
        }
        self
    }
}

/// Misuse of the session control surface. The session is left unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown command kind '{0}'")]
    UnknownCommand(String),
    #[error("session is not paused")]
    NotPaused,
    #[error("a command is already pending")]
    CommandPending,
    #[error("session is not running")]
    NotRunning,
}

#[derive(Debug, Error)]
pub enum DebugError {
    #[error("no debug session has been started")]
    NoSession,
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("previous session did not terminate within {0:?}")]
    TeardownTimeout(Duration),
    #[error("failed to spawn target executor: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("failed to read configuration: {0}")]
    ConfigIo(#[source] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

pub type DebugResult<T> = Result<T, DebugError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_renders_one_line_classification() {
        let err = RuntimeError::new(ErrorKind::ZeroDivisionError, "division by zero").at_line(4);
        assert_eq!(err.to_string(), "ZeroDivisionError: division by zero");
        assert_eq!(err.line, Some(4));
        assert_eq!(err.at_line(9).line, Some(4));
    }

    #[test]
    fn protocol_errors_convert_into_debug_errors() {
        let err: DebugError = ProtocolError::NotPaused.into();
        assert_eq!(err.to_string(), "session is not paused");
    }
}
