// SPDX-License-Identifier: MIT OR Apache-2.0
//! The task `condition` expression grammar and evaluator.
//!
//! Grammar:
//! ```text
//! expr       := or_expr
//! or_expr    := and_expr ('||' and_expr)*
//! and_expr   := unary ('&&' unary)*
//! unary      := '!' unary | atom
//! atom       := '(' expr ')' | comparison
//! comparison := operand ('==' | '!=' | 'matches') operand
//! operand    := ident ('.' ident)* | string_literal
//! ```
//! Identifiers resolve against a [`Context`] record of `{branch, tag, event,
//! ci, env}`; dotted paths beyond the first segment index into `env`
//! (`env.CI_STAGE`). An identifier with no value in the context resolves to
//! the empty string rather than erroring, so `branch == ""` is a valid way
//! to test "not running in CI" for a missing field.

use std::collections::BTreeMap;

use sykli_glob::single_pattern_matches;
use thiserror::Error;

#[derive(Debug, Clone, Default)]
pub struct Context {
    pub branch: Option<String>,
    pub tag: Option<String>,
    pub event: Option<String>,
    pub ci: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl Context {
    fn resolve(&self, path: &[String]) -> String {
        match path.first().map(String::as_str) {
            Some("branch") => self.branch.clone().unwrap_or_default(),
            Some("tag") => self.tag.clone().unwrap_or_default(),
            Some("event") => self.event.clone().unwrap_or_default(),
            Some("ci") => self.ci.clone().unwrap_or_default(),
            Some("env") => path
                .get(1)
                .and_then(|key| self.env.get(key))
                .cloned()
                .unwrap_or_default(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConditionError {
    #[error("unexpected character '{0}' at position {1}")]
    UnexpectedChar(char, usize),
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),
    #[error("trailing input after expression: '{0}'")]
    TrailingInput(String),
    #[error("invalid glob pattern in 'matches' comparison: {0}")]
    InvalidGlob(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    String(String),
    AndAnd,
    OrOr,
    Bang,
    EqEq,
    NotEq,
    Matches,
    Dot,
    LParen,
    RParen,
}

fn lex(input: &str) -> Result<Vec<Token>, ConditionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '.' => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::NotEq);
                    i += 2;
                } else {
                    tokens.push(Token::Bang);
                    i += 1;
                }
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::EqEq);
                i += 2;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::AndAnd);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::OrOr);
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                let mut closed = false;
                while i < chars.len() {
                    if chars[i] == quote {
                        closed = true;
                        i += 1;
                        break;
                    }
                    s.push(chars[i]);
                    i += 1;
                }
                if !closed {
                    return Err(ConditionError::UnterminatedString);
                }
                tokens.push(Token::String(s));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(if word == "matches" {
                    Token::Matches
                } else {
                    Token::Ident(word)
                });
            }
            other => return Err(ConditionError::UnexpectedChar(other, i)),
        }
    }
    Ok(tokens)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Operand {
    Path(Vec<String>),
    Literal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Matches,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Or(Vec<Expr>),
    And(Vec<Expr>),
    Not(Box<Expr>),
    Comparison {
        left: Operand,
        op: CmpOp,
        right: Operand,
    },
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn parse_expr(&mut self) -> Result<Expr, ConditionError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ConditionError> {
        let mut terms = vec![self.parse_and()?];
        while matches!(self.peek(), Some(Token::OrOr)) {
            self.advance();
            terms.push(self.parse_and()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::Or(terms)
        })
    }

    fn parse_and(&mut self) -> Result<Expr, ConditionError> {
        let mut terms = vec![self.parse_unary()?];
        while matches!(self.peek(), Some(Token::AndAnd)) {
            self.advance();
            terms.push(self.parse_unary()?);
        }
        Ok(if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::And(terms)
        })
    }

    fn parse_unary(&mut self) -> Result<Expr, ConditionError> {
        if matches!(self.peek(), Some(Token::Bang)) {
            self.advance();
            return Ok(Expr::Not(Box::new(self.parse_unary()?)));
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Expr, ConditionError> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.advance();
            let inner = self.parse_expr()?;
            match self.advance() {
                Some(Token::RParen) => Ok(inner),
                Some(other) => Err(ConditionError::UnexpectedToken(format!("{other:?}"))),
                None => Err(ConditionError::UnexpectedEnd),
            }
        } else {
            self.parse_comparison()
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ConditionError> {
        let left = self.parse_operand()?;
        let op = match self.advance() {
            Some(Token::EqEq) => CmpOp::Eq,
            Some(Token::NotEq) => CmpOp::Ne,
            Some(Token::Matches) => CmpOp::Matches,
            Some(other) => return Err(ConditionError::UnexpectedToken(format!("{other:?}"))),
            None => return Err(ConditionError::UnexpectedEnd),
        };
        let right = self.parse_operand()?;
        Ok(Expr::Comparison { left, op, right })
    }

    fn parse_operand(&mut self) -> Result<Operand, ConditionError> {
        match self.advance() {
            Some(Token::String(s)) => Ok(Operand::Literal(s)),
            Some(Token::Ident(first)) => {
                let mut path = vec![first];
                while matches!(self.peek(), Some(Token::Dot)) {
                    self.advance();
                    match self.advance() {
                        Some(Token::Ident(seg)) => path.push(seg),
                        Some(other) => {
                            return Err(ConditionError::UnexpectedToken(format!("{other:?}")))
                        }
                        None => return Err(ConditionError::UnexpectedEnd),
                    }
                }
                Ok(Operand::Path(path))
            }
            Some(other) => Err(ConditionError::UnexpectedToken(format!("{other:?}"))),
            None => Err(ConditionError::UnexpectedEnd),
        }
    }
}

fn resolve(operand: &Operand, ctx: &Context) -> String {
    match operand {
        Operand::Literal(s) => s.clone(),
        Operand::Path(path) => ctx.resolve(path),
    }
}

fn eval(expr: &Expr, ctx: &Context) -> Result<bool, ConditionError> {
    match expr {
        Expr::Or(terms) => {
            for t in terms {
                if eval(t, ctx)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Expr::And(terms) => {
            for t in terms {
                if !eval(t, ctx)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Expr::Not(inner) => Ok(!eval(inner, ctx)?),
        Expr::Comparison { left, op, right } => {
            let lhs = resolve(left, ctx);
            let rhs = resolve(right, ctx);
            match op {
                CmpOp::Eq => Ok(lhs == rhs),
                CmpOp::Ne => Ok(lhs != rhs),
                CmpOp::Matches => single_pattern_matches(&rhs, &lhs)
                    .map_err(|e| ConditionError::InvalidGlob(e.to_string())),
            }
        }
    }
}

/// Evaluate a condition expression string against `ctx`.
pub fn evaluate(expression: &str, ctx: &Context) -> Result<bool, ConditionError> {
    let tokens = lex(expression)?;
    let mut parser = Parser::new(tokens);
    let ast = parser.parse_expr()?;
    match parser.peek() {
        None => eval(&ast, ctx),
        Some(tok) => Err(ConditionError::TrailingInput(format!("{tok:?}"))),
    }
}
