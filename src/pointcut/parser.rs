//! Pointcut lexer and recursive-descent parser.
//!
//! Precedence, loosest first: `||`, `&&`, `!`. Parentheses override.

use tracing::warn;

use super::pattern::ExecutionPattern;
use super::{Expr, PointcutSyntaxError};

#[derive(Debug, Clone, PartialEq, Eq)]
enum TokenKind {
    LParen,
    RParen,
    Not,
    And,
    Or,
    /// `designator(body)` or `@designator(body)`
    Leaf {
        annotation: bool,
        designator: String,
        body: String,
    },
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    start: usize,
    end: usize,
}

/// Parse a complete pointcut expression.
pub(crate) fn parse(source: &str) -> Result<Expr, PointcutSyntaxError> {
    let tokens = tokenize(source)?;
    if tokens.is_empty() {
        return Err(PointcutSyntaxError::new("empty pointcut expression", source, 0));
    }

    let mut parser = Parser {
        source,
        tokens,
        pos: 0,
    };
    let expr = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(parser.error_at(token, "unexpected trailing input"));
    }
    Ok(expr)
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '$' | '.' | '*')
}

fn tokenize(source: &str) -> Result<Vec<Token>, PointcutSyntaxError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(start, ch)) = chars.peek() {
        if ch.is_whitespace() {
            chars.next();
            continue;
        }

        let simple = match ch {
            '(' => Some(TokenKind::LParen),
            ')' => Some(TokenKind::RParen),
            '!' => Some(TokenKind::Not),
            _ => None,
        };
        if let Some(kind) = simple {
            chars.next();
            tokens.push(Token {
                kind,
                start,
                end: start + 1,
            });
            continue;
        }

        if ch == '&' || ch == '|' {
            chars.next();
            if bytes.get(start + 1) != Some(&(ch as u8)) {
                return Err(PointcutSyntaxError::new(
                    format!("expected '{ch}{ch}'"),
                    &source[start..],
                    start,
                ));
            }
            chars.next();
            let kind = if ch == '&' {
                TokenKind::And
            } else {
                TokenKind::Or
            };
            tokens.push(Token {
                kind,
                start,
                end: start + 2,
            });
            continue;
        }

        let annotation = ch == '@';
        if annotation {
            chars.next();
        }

        let ident_start = chars.peek().map(|&(i, _)| i).unwrap_or(source.len());
        let mut ident_end = ident_start;
        while let Some(&(i, c)) = chars.peek() {
            if !is_ident_char(c) {
                break;
            }
            ident_end = i + c.len_utf8();
            chars.next();
        }
        if ident_end == ident_start {
            return Err(PointcutSyntaxError::new(
                format!("unexpected character '{}'", source[ident_start..].chars().next().unwrap_or(ch)),
                &source[start..],
                start,
            ));
        }
        let designator = source[ident_start..ident_end].to_string();

        while let Some(&(_, c)) = chars.peek() {
            if !c.is_whitespace() {
                break;
            }
            chars.next();
        }
        match chars.next() {
            Some((_, '(')) => {}
            _ => {
                return Err(PointcutSyntaxError::new(
                    format!("expected '(' after '{designator}'"),
                    &source[start..],
                    start,
                ))
            }
        }

        // Read the balanced body up to the matching ')'.
        let body_start = chars.peek().map(|&(i, _)| i).unwrap_or(source.len());
        let mut depth = 1usize;
        let mut body_end = None;
        for (i, c) in chars.by_ref() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        body_end = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let body_end = body_end.ok_or_else(|| {
            PointcutSyntaxError::new("unbalanced parentheses", &source[start..], start)
        })?;

        tokens.push(Token {
            kind: TokenKind::Leaf {
                annotation,
                designator,
                body: source[body_start..body_end].trim().to_string(),
            },
            start,
            end: body_end + 1,
        });
    }

    Ok(tokens)
}

struct Parser<'a> {
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn error_at(&self, token: &Token, message: &str) -> PointcutSyntaxError {
        PointcutSyntaxError::new(message, &self.source[token.start..token.end], token.start)
    }

    fn error_at_end(&self, message: &str) -> PointcutSyntaxError {
        PointcutSyntaxError::new(message, self.source, self.source.len())
    }

    fn parse_or(&mut self) -> Result<Expr, PointcutSyntaxError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Or)) {
            self.next();
            let rhs = self.parse_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, PointcutSyntaxError> {
        let mut lhs = self.parse_unary()?;
        while matches!(self.peek().map(|t| &t.kind), Some(TokenKind::And)) {
            self.next();
            let rhs = self.parse_unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, PointcutSyntaxError> {
        if matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Not)) {
            self.next();
            let inner = self.parse_unary()?;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, PointcutSyntaxError> {
        let token = self
            .next()
            .ok_or_else(|| self.error_at_end("expected an expression"))?;

        match token.kind {
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token {
                        kind: TokenKind::RParen,
                        ..
                    }) => Ok(inner),
                    Some(other) => Err(self.error_at(&other, "expected ')'")),
                    None => Err(PointcutSyntaxError::new(
                        "unbalanced parentheses",
                        &self.source[token.start..],
                        token.start,
                    )),
                }
            }
            TokenKind::Leaf {
                annotation,
                ref designator,
                ref body,
            } => self.leaf(&token, annotation, designator, body),
            _ => Err(self.error_at(&token, "expected an expression")),
        }
    }

    fn leaf(
        &self,
        token: &Token,
        annotation: bool,
        designator: &str,
        body: &str,
    ) -> Result<Expr, PointcutSyntaxError> {
        if annotation {
            if designator != "annotation" {
                return Ok(self.unsupported(&format!("@{designator}"), body));
            }
            if body.is_empty() || !body.chars().all(is_ident_char) {
                return Err(self.error_at(token, "@annotation expects a single tag name"));
            }
            return Ok(Expr::Annotation(body.to_string()));
        }

        if designator == "execution" {
            return ExecutionPattern::parse(body)
                .map(Expr::Execution)
                .map_err(|message| self.error_at(token, &message));
        }

        if body.is_empty() {
            return Ok(Expr::Reference(designator.to_string()));
        }

        Ok(self.unsupported(designator, body))
    }

    fn unsupported(&self, designator: &str, body: &str) -> Expr {
        warn!(
            designator = %designator,
            pointcut = %self.source,
            "Unsupported pointcut designator never matches"
        );
        Expr::Unsupported {
            designator: designator.to_string(),
            body: body.to_string(),
        }
    }
}
