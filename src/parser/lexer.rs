use super::types::{Keyword, Token, TokenKind};
use crate::error::ParseError;

/// Split source text into tokens. Newlines inside `()`/`[]` are dropped so
/// call arguments and list literals may span lines.
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1usize;
    let mut nesting = 0usize;

    while let Some(&ch) = chars.peek() {
        match ch {
            '\n' => {
                chars.next();
                if nesting == 0 {
                    push_separator(&mut tokens, line);
                }
                line += 1;
            }
            ';' => {
                chars.next();
                push_separator(&mut tokens, line);
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while let Some(&c) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '"' | '\'' => {
                chars.next();
                let text = read_string(&mut chars, ch, line)?;
                tokens.push(Token {
                    kind: TokenKind::Str(text),
                    line,
                });
            }
            c if c.is_ascii_digit() => {
                let kind = read_number(&mut chars, line)?;
                tokens.push(Token { kind, line });
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let kind = match Keyword::from_ident(&ident) {
                    Some(keyword) => TokenKind::Keyword(keyword),
                    None => TokenKind::Ident(ident),
                };
                tokens.push(Token { kind, line });
            }
            _ => {
                chars.next();
                let next = chars.peek().copied();
                let (kind, consumed_next) = match (ch, next) {
                    ('=', Some('=')) => (TokenKind::EqEq, true),
                    ('!', Some('=')) => (TokenKind::NotEq, true),
                    ('<', Some('=')) => (TokenKind::Le, true),
                    ('>', Some('=')) => (TokenKind::Ge, true),
                    ('+', Some('=')) => (TokenKind::PlusAssign, true),
                    ('-', Some('=')) => (TokenKind::MinusAssign, true),
                    ('*', Some('=')) => (TokenKind::StarAssign, true),
                    ('/', Some('=')) => (TokenKind::SlashAssign, true),
                    ('/', Some('/')) => (TokenKind::SlashSlash, true),
                    ('=', _) => (TokenKind::Assign, false),
                    ('<', _) => (TokenKind::Lt, false),
                    ('>', _) => (TokenKind::Gt, false),
                    ('+', _) => (TokenKind::Plus, false),
                    ('-', _) => (TokenKind::Minus, false),
                    ('*', _) => (TokenKind::Star, false),
                    ('/', _) => (TokenKind::Slash, false),
                    ('%', _) => (TokenKind::Percent, false),
                    (',', _) => (TokenKind::Comma, false),
                    (':', _) => (TokenKind::Colon, false),
                    ('(', _) => {
                        nesting += 1;
                        (TokenKind::LParen, false)
                    }
                    ('[', _) => {
                        nesting += 1;
                        (TokenKind::LBracket, false)
                    }
                    (')', _) => {
                        nesting = nesting.saturating_sub(1);
                        (TokenKind::RParen, false)
                    }
                    (']', _) => {
                        nesting = nesting.saturating_sub(1);
                        (TokenKind::RBracket, false)
                    }
                    _ => {
                        return Err(ParseError::new(line, format!("unexpected character '{ch}'")))
                    }
                };
                if consumed_next {
                    chars.next();
                }
                tokens.push(Token { kind, line });
            }
        }
    }

    push_separator(&mut tokens, line);
    tokens.push(Token {
        kind: TokenKind::Eof,
        line,
    });
    Ok(tokens)
}

/// Collapse runs of separators into one.
fn push_separator(tokens: &mut Vec<Token>, line: usize) {
    if matches!(tokens.last(), Some(Token { kind: TokenKind::Newline, .. }) | None) {
        return;
    }
    tokens.push(Token {
        kind: TokenKind::Newline,
        line,
    });
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    quote: char,
    line: usize,
) -> Result<String, ParseError> {
    let mut text = String::new();
    loop {
        match chars.next() {
            None | Some('\n') => {
                return Err(ParseError::new(line, "unterminated string literal"));
            }
            Some('\\') => match chars.next() {
                Some('n') => text.push('\n'),
                Some('t') => text.push('\t'),
                Some('\\') => text.push('\\'),
                Some('\'') => text.push('\''),
                Some('"') => text.push('"'),
                Some(other) => {
                    text.push('\\');
                    text.push(other);
                }
                None => return Err(ParseError::new(line, "unterminated string literal")),
            },
            Some(c) if c == quote => return Ok(text),
            Some(c) => text.push(c),
        }
    }
}

fn read_number(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: usize,
) -> Result<TokenKind, ParseError> {
    let mut digits = String::new();
    let mut is_float = false;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() || c == '_' {
            if c != '_' {
                digits.push(c);
            }
            chars.next();
        } else if c == '.' && !is_float {
            is_float = true;
            digits.push(c);
            chars.next();
        } else {
            break;
        }
    }

    if is_float {
        digits
            .parse::<f64>()
            .map(TokenKind::Float)
            .map_err(|_| ParseError::new(line, format!("invalid float literal '{digits}'")))
    } else {
        digits
            .parse::<i64>()
            .map(TokenKind::Int)
            .map_err(|_| ParseError::new(line, format!("integer literal '{digits}' out of range")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source)
            .unwrap()
            .into_iter()
            .map(|token| token.kind)
            .collect()
    }

    #[test]
    fn separators_collapse_and_track_lines() {
        let tokens = tokenize("x = 1\n\n\ny = 2; z = 3").unwrap();
        let lines: Vec<usize> = tokens
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Ident(_) => Some(t.line),
                _ => None,
            })
            .collect();
        assert_eq!(lines, vec![1, 4, 4]);
        let separators = tokens
            .iter()
            .filter(|t| t.kind == TokenKind::Newline)
            .count();
        assert_eq!(separators, 3);
    }

    #[test]
    fn newlines_inside_brackets_are_ignored() {
        assert_eq!(
            kinds("[1,\n2]"),
            vec![
                TokenKind::LBracket,
                TokenKind::Int(1),
                TokenKind::Comma,
                TokenKind::Int(2),
                TokenKind::RBracket,
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn two_character_operators() {
        assert_eq!(
            kinds("a //= b")[..3],
            [
                TokenKind::Ident("a".into()),
                TokenKind::SlashSlash,
                TokenKind::Assign,
            ]
        );
        assert_eq!(kinds("x += 1")[1], TokenKind::PlusAssign);
        assert_eq!(kinds("x != 1")[1], TokenKind::NotEq);
    }

    #[test]
    fn strings_and_comments() {
        assert_eq!(
            kinds("'it\\'s' # trailing"),
            vec![
                TokenKind::Str("it's".into()),
                TokenKind::Newline,
                TokenKind::Eof
            ]
        );
        let err = tokenize("x = \"open").unwrap_err();
        assert_eq!(err.line, 1);
    }
}
