//! Selection expressions deciding which records reach the catalog.
//!
//! ```text
//! expr       := and ( "||" and )*
//! and        := unary ( "&&" unary )*
//! unary      := "!" unary | "(" expr ")" | comparison
//! comparison := field ( "==" | "!=" | "=~" | "!~" ) string
//! field      := id | name | displayName | description | env | proxy | attr.<key>
//! ```
//!
//! Strings are double or single quoted; `\` escapes the next character.
//! Regex comparisons are unanchored. A multi-valued field (`env`, `proxy`)
//! satisfies `==`/`=~` when any value matches and `!=`/`!~` when none does.

use super::RemoteRecord;
use crate::error::{SyncError, SyncResult};
use regex::Regex;
use std::fmt;

const FIELDS: &[&str] = &["id", "name", "displayName", "description", "env", "proxy"];

/// Compiled inclusion filter. The empty expression admits everything.
#[derive(Clone)]
pub struct RecordFilter {
    source: String,
    expr: Option<Expr>,
}

#[derive(Clone, Debug)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare { field: String, op: Op },
}

#[derive(Clone, Debug)]
enum Op {
    Eq(String),
    Ne(String),
    Match(Regex),
    NotMatch(Regex),
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Eq,
    Ne,
    Match,
    NotMatch,
    And,
    Or,
    Not,
    LParen,
    RParen,
}

impl RecordFilter {
    /// Filter that admits every record.
    pub fn allow_all() -> Self {
        Self {
            source: String::new(),
            expr: None,
        }
    }

    pub fn parse(source: &str) -> SyncResult<Self> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Ok(Self::allow_all());
        }

        let tokens = tokenize(trimmed)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or()?;
        if let Some(tok) = parser.peek() {
            return Err(invalid(format!("unexpected {:?} after expression", tok)));
        }

        Ok(Self {
            source: trimmed.to_string(),
            expr: Some(expr),
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_allow_all(&self) -> bool {
        self.expr.is_none()
    }

    pub fn matches(&self, record: &RemoteRecord) -> bool {
        match &self.expr {
            None => true,
            Some(expr) => expr.eval(record),
        }
    }
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

impl fmt::Debug for RecordFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RecordFilter").field(&self.source).finish()
    }
}

impl Expr {
    fn eval(&self, record: &RemoteRecord) -> bool {
        match self {
            Expr::Or(l, r) => l.eval(record) || r.eval(record),
            Expr::And(l, r) => l.eval(record) && r.eval(record),
            Expr::Not(inner) => !inner.eval(record),
            Expr::Compare { field, op } => {
                let values = record.field_values(field);
                match op {
                    Op::Eq(want) => values.iter().any(|v| v == want),
                    Op::Ne(want) => values.iter().all(|v| v != want),
                    Op::Match(re) => values.iter().any(|v| re.is_match(v)),
                    Op::NotMatch(re) => !values.iter().any(|v| re.is_match(v)),
                }
            }
        }
    }
}

fn invalid(msg: impl Into<String>) -> SyncError {
    SyncError::ConfigurationInvalid(format!("selection expression: {}", msg.into()))
}

fn tokenize(input: &str) -> SyncResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '&' | '|' => {
                chars.next();
                if chars.next() != Some(c) {
                    return Err(invalid(format!("expected '{}{}'", c, c)));
                }
                tokens.push(if c == '&' { Token::And } else { Token::Or });
            }
            '=' => {
                chars.next();
                match chars.next() {
                    Some('=') => tokens.push(Token::Eq),
                    Some('~') => tokens.push(Token::Match),
                    _ => return Err(invalid("expected '==' or '=~'")),
                }
            }
            '!' => {
                chars.next();
                match chars.peek() {
                    Some('=') => {
                        chars.next();
                        tokens.push(Token::Ne);
                    }
                    Some('~') => {
                        chars.next();
                        tokens.push(Token::NotMatch);
                    }
                    _ => tokens.push(Token::Not),
                }
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                loop {
                    match chars.next() {
                        Some('\\') => match chars.next() {
                            Some(escaped) => value.push(escaped),
                            None => return Err(invalid("unterminated string")),
                        },
                        Some(ch) if ch == quote => break,
                        Some(ch) => value.push(ch),
                        None => return Err(invalid("unterminated string")),
                    }
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_alphanumeric() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-') {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(invalid(format!("unexpected character '{}'", other))),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn parse_or(&mut self) -> SyncResult<Expr> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.next();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> SyncResult<Expr> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::And) {
            self.next();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> SyncResult<Expr> {
        match self.next() {
            Some(Token::Not) => Ok(Expr::Not(Box::new(self.parse_unary()?))),
            Some(Token::LParen) => {
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(invalid("missing ')'")),
                }
            }
            Some(Token::Ident(field)) => self.parse_comparison(field),
            Some(tok) => Err(invalid(format!("unexpected {:?}", tok))),
            None => Err(invalid("unexpected end of expression")),
        }
    }

    fn parse_comparison(&mut self, field: String) -> SyncResult<Expr> {
        let known = FIELDS.contains(&field.as_str())
            || field.strip_prefix("attr.").is_some_and(|key| !key.is_empty());
        if !known {
            return Err(invalid(format!("unknown field '{}'", field)));
        }

        let op_token = self.next();
        let value = match self.next() {
            Some(Token::Str(value)) => value,
            _ => return Err(invalid(format!("expected quoted value after '{}'", field))),
        };

        let op = match op_token {
            Some(Token::Eq) => Op::Eq(value),
            Some(Token::Ne) => Op::Ne(value),
            Some(Token::Match) => Op::Match(compile(&value)?),
            Some(Token::NotMatch) => Op::NotMatch(compile(&value)?),
            _ => return Err(invalid(format!("expected operator after '{}'", field))),
        };

        Ok(Expr::Compare { field, op })
    }
}

fn compile(pattern: &str) -> SyncResult<Regex> {
    Regex::new(pattern).map_err(|e| invalid(format!("bad regex '{}': {}", pattern, e)))
}
