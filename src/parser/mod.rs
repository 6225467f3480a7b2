mod expressions;
mod grammar;
mod lexer;
mod preprocessor;
mod types;

pub use lexer::tokenize;
pub use preprocessor::{dedent, SourceUnit, MAIN_UNIT};
pub use types::{
    BinaryOp, Branch, Expr, Function, Keyword, LogicalOp, Program, Stmt, StmtKind, Target, Token,
    TokenKind, UnaryOp,
};

use crate::error::ParseError;
use grammar::Parser;

pub use grammar::MAX_NESTING;

/// Parse a whole program (statement sequence).
pub fn parse_program(source: &str) -> Result<Program, ParseError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_program()
}

/// Parse `source` as exactly one expression; anything left over is an error.
pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(source)?;
    Parser::new(tokens).parse_single_expression()
}
