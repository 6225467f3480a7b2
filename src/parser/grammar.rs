use std::sync::Arc;

use super::types::{
    BinaryOp, Branch, Function, Keyword, Program, Stmt, StmtKind, Target, Token, TokenKind,
};
use crate::error::ParseError;

/// Deepest tree the parser will build, counting brackets, prefix operators,
/// chained binary operators and nested blocks.
pub const MAX_NESTING: usize = 200;

/// Recursive-descent parser over a token stream.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    loop_depth: usize,
    function_depth: usize,
    pub(super) nesting: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            loop_depth: 0,
            function_depth: 0,
            nesting: 0,
        }
    }

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let statements = self.parse_block(&[])?;
        if !self.at_eof() {
            let token = self.peek().clone();
            return Err(self.unexpected(&token, "statement"));
        }
        Ok(Program { statements })
    }

    /// Parse the whole input as exactly one expression.
    pub fn parse_single_expression(&mut self) -> Result<super::types::Expr, ParseError> {
        self.skip_separators();
        let expr = self.parse_expr()?;
        self.skip_separators();
        if !self.at_eof() {
            let token = self.peek().clone();
            return Err(self.unexpected(&token, "end of expression"));
        }
        Ok(expr)
    }

    // ---- token helpers -------------------------------------------------

    pub(super) fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    pub(super) fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    pub(super) fn check(&self, kind: &TokenKind) -> bool {
        &self.peek().kind == kind
    }

    pub(super) fn check_keyword(&self, keyword: Keyword) -> bool {
        self.check(&TokenKind::Keyword(keyword))
    }

    pub(super) fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    pub(super) fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            let token = self.peek().clone();
            Err(self.unexpected(&token, what))
        }
    }

    pub(super) fn expect_ident(&mut self, what: &str) -> Result<String, ParseError> {
        match self.peek().kind.clone() {
            TokenKind::Ident(name) => {
                self.advance();
                Ok(name)
            }
            _ => {
                let token = self.peek().clone();
                Err(self.unexpected(&token, what))
            }
        }
    }

    pub(super) fn unexpected(&self, token: &Token, expected: &str) -> ParseError {
        let found = match &token.kind {
            TokenKind::Eof => "end of input".to_string(),
            TokenKind::Newline => "end of line".to_string(),
            TokenKind::Ident(name) => format!("'{name}'"),
            TokenKind::Keyword(keyword) => format!("keyword '{}'", keyword_text(*keyword)),
            other => format!("{other:?}"),
        };
        ParseError::new(token.line, format!("expected {expected}, found {found}"))
    }

    /// Take one level of nesting, failing once `MAX_NESTING` is reached.
    pub(super) fn enter(&mut self) -> Result<(), ParseError> {
        if self.nesting >= MAX_NESTING {
            return Err(ParseError::new(self.peek().line, "too many nested levels"));
        }
        self.nesting += 1;
        Ok(())
    }

    pub(super) fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        self.enter()?;
        let parsed = parse(self);
        self.nesting -= 1;
        parsed
    }

    fn at_eof(&self) -> bool {
        self.check(&TokenKind::Eof)
    }

    fn skip_separators(&mut self) {
        while self.eat(&TokenKind::Newline) {}
    }

    fn end_of_statement(&mut self) -> Result<(), ParseError> {
        if self.at_eof() || self.eat(&TokenKind::Newline) {
            return Ok(());
        }
        let token = self.peek().clone();
        Err(self.unexpected(&token, "end of statement"))
    }

    fn end_of_header(&mut self) -> Result<(), ParseError> {
        self.eat(&TokenKind::Colon);
        self.end_of_statement()
    }

    // ---- statements ----------------------------------------------------

    /// Parse statements until one of `terminators` (or end of input when
    /// `terminators` is empty). The terminator itself is not consumed.
    fn parse_block(&mut self, terminators: &[Keyword]) -> Result<Vec<Stmt>, ParseError> {
        let mut statements = Vec::new();
        loop {
            self.skip_separators();
            if self.at_eof() {
                if let Some(first) = terminators.first() {
                    let token = self.peek().clone();
                    return Err(self.unexpected(&token, &format!("'{}'", keyword_text(*first))));
                }
                return Ok(statements);
            }
            if terminators.iter().any(|k| self.check_keyword(*k)) {
                return Ok(statements);
            }
            statements.push(self.nested(Self::parse_statement)?);
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        let token = self.peek().clone();
        let line = token.line;
        let kind = match token.kind {
            TokenKind::Keyword(Keyword::If) => return self.parse_if(),
            TokenKind::Keyword(Keyword::While) => return self.parse_while(),
            TokenKind::Keyword(Keyword::For) => return self.parse_for(),
            TokenKind::Keyword(Keyword::Def) => return self.parse_def(),
            TokenKind::Keyword(Keyword::Return) => {
                self.advance();
                if self.function_depth == 0 {
                    return Err(ParseError::new(line, "'return' outside function"));
                }
                let value = if self.check(&TokenKind::Newline) || self.at_eof() {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                StmtKind::Return(value)
            }
            TokenKind::Keyword(Keyword::Break) => {
                self.advance();
                if self.loop_depth == 0 {
                    return Err(ParseError::new(line, "'break' outside loop"));
                }
                StmtKind::Break
            }
            TokenKind::Keyword(Keyword::Continue) => {
                self.advance();
                if self.loop_depth == 0 {
                    return Err(ParseError::new(line, "'continue' not properly in loop"));
                }
                StmtKind::Continue
            }
            TokenKind::Keyword(Keyword::Pass) => {
                self.advance();
                StmtKind::Pass
            }
            TokenKind::Keyword(Keyword::Global) => {
                self.advance();
                let mut names = vec![self.expect_ident("variable name")?];
                while self.eat(&TokenKind::Comma) {
                    names.push(self.expect_ident("variable name")?);
                }
                StmtKind::Global(names)
            }
            _ => self.parse_simple()?,
        };
        self.end_of_statement()?;
        Ok(Stmt { line, kind })
    }

    /// Expression statement or assignment.
    fn parse_simple(&mut self) -> Result<StmtKind, ParseError> {
        let line = self.peek().line;
        let expr = self.parse_expr()?;
        let op = match self.peek().kind {
            TokenKind::Assign => None,
            TokenKind::PlusAssign => Some(BinaryOp::Add),
            TokenKind::MinusAssign => Some(BinaryOp::Sub),
            TokenKind::StarAssign => Some(BinaryOp::Mul),
            TokenKind::SlashAssign => Some(BinaryOp::Div),
            _ => return Ok(StmtKind::Expr(expr)),
        };
        self.advance();
        let target = to_target(expr)
            .ok_or_else(|| ParseError::new(line, "cannot assign to expression"))?;
        let value = self.parse_expr()?;
        Ok(StmtKind::Assign { target, op, value })
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let line = self.advance().line;
        let condition = self.parse_expr()?;
        self.end_of_header()?;
        let body = self.parse_block(&[Keyword::Elif, Keyword::Else, Keyword::End])?;
        let mut branches = vec![Branch {
            line,
            condition,
            body,
        }];
        let mut otherwise = None;

        loop {
            let token = self.advance();
            match token.kind {
                TokenKind::Keyword(Keyword::Elif) => {
                    let condition = self.parse_expr()?;
                    self.end_of_header()?;
                    let body = self.parse_block(&[Keyword::Elif, Keyword::Else, Keyword::End])?;
                    branches.push(Branch {
                        line: token.line,
                        condition,
                        body,
                    });
                }
                TokenKind::Keyword(Keyword::Else) => {
                    self.end_of_header()?;
                    otherwise = Some(self.parse_block(&[Keyword::End])?);
                    self.advance();
                    break;
                }
                _ => break,
            }
        }
        self.end_of_statement()?;

        Ok(Stmt {
            line,
            kind: StmtKind::If {
                branches,
                otherwise,
            },
        })
    }

    fn parse_while(&mut self) -> Result<Stmt, ParseError> {
        let line = self.advance().line;
        let condition = self.parse_expr()?;
        self.end_of_header()?;
        let body = self.parse_loop_body()?;
        Ok(Stmt {
            line,
            kind: StmtKind::While { condition, body },
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, ParseError> {
        let line = self.advance().line;
        let var = self.expect_ident("loop variable")?;
        self.expect(&TokenKind::Keyword(Keyword::In), "'in'")?;
        let iterable = self.parse_expr()?;
        self.end_of_header()?;
        let body = self.parse_loop_body()?;
        Ok(Stmt {
            line,
            kind: StmtKind::For {
                var,
                iterable,
                body,
            },
        })
    }

    fn parse_loop_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.loop_depth += 1;
        let body = self.parse_block(&[Keyword::End]);
        self.loop_depth -= 1;
        let body = body?;
        self.advance();
        self.end_of_statement()?;
        Ok(body)
    }

    fn parse_def(&mut self) -> Result<Stmt, ParseError> {
        let line = self.advance().line;
        let name = self.expect_ident("function name")?;
        self.expect(&TokenKind::LParen, "'('")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let param = self.expect_ident("parameter name")?;
                if params.contains(&param) {
                    return Err(ParseError::new(
                        line,
                        format!("duplicate argument '{param}' in function definition"),
                    ));
                }
                params.push(param);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen, "')'")?;
        self.end_of_header()?;

        // A function body starts a fresh loop context.
        let saved_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.function_depth += 1;
        let body = self.parse_block(&[Keyword::End]);
        self.function_depth -= 1;
        self.loop_depth = saved_loops;
        let body = body?;
        self.advance();
        self.end_of_statement()?;

        Ok(Stmt {
            line,
            kind: StmtKind::Def(Arc::new(Function {
                name,
                params,
                body,
                line,
            })),
        })
    }
}

fn to_target(expr: super::types::Expr) -> Option<Target> {
    use super::types::Expr;
    match expr {
        Expr::Name(name) => Some(Target::Name(name)),
        Expr::Index { target, index } => Some(Target::Index {
            target: Box::new(to_target(*target)?),
            index: *index,
        }),
        _ => None,
    }
}

pub(super) fn keyword_text(keyword: Keyword) -> &'static str {
    match keyword {
        Keyword::If => "if",
        Keyword::Elif => "elif",
        Keyword::Else => "else",
        Keyword::End => "end",
        Keyword::While => "while",
        Keyword::For => "for",
        Keyword::In => "in",
        Keyword::Def => "def",
        Keyword::Return => "return",
        Keyword::Break => "break",
        Keyword::Continue => "continue",
        Keyword::Global => "global",
        Keyword::Pass => "pass",
        Keyword::And => "and",
        Keyword::Or => "or",
        Keyword::Not => "not",
        Keyword::True => "true",
        Keyword::False => "false",
        Keyword::Nil => "nil",
    }
}
