// relay-logic/src/dsl.rs
// ============================================================================
// Module: Requirement DSL
// Description: Small recursive-descent parser turning infix/function-call
// text into a `Requirement<P>` tree via a caller-supplied name resolver.
// Purpose: Let config and authoring surfaces express guard/rule conditions
// as text instead of hand-building `Requirement` trees.
// Dependencies: crate::requirement
// ============================================================================

//! ## Overview
//! Two equivalent surface syntaxes are accepted: function style
//! (`all(a, any(b, not c))`, `at_least(2, a, b, c)`) and infix style
//! (`a && b || not c`), with `&&` binding tighter than `||`. Leaf names are
//! resolved to domain predicates `P` through [`PredicateResolver`]; an
//! unresolved name is a parse error, not a silent false.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::fmt;

use crate::requirement::Requirement;

// ============================================================================
// SECTION: Predicate Resolver
// ============================================================================

/// Resolves a leaf identifier encountered in DSL source into a domain
/// predicate value.
pub trait PredicateResolver<P> {
    /// Looks up `name`, returning `None` when it is not recognized.
    fn resolve(&self, name: &str) -> Option<P>;
}

impl<P: Clone> PredicateResolver<P> for HashMap<String, P> {
    fn resolve(&self, name: &str) -> Option<P> {
        self.get(name).cloned()
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors produced while parsing requirement DSL source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DslError {
    /// Input was empty or contained only whitespace.
    EmptyInput,
    /// A leaf identifier did not resolve through the [`PredicateResolver`].
    UnknownPredicate {
        /// The unresolved identifier.
        name: String,
    },
    /// A function-call identifier was not one of the known combinators.
    UnknownFunction {
        /// The unrecognized function name.
        name: String,
    },
    /// Input remained after a complete expression was parsed.
    TrailingInput {
        /// The unconsumed remainder.
        remainder: String,
    },
    /// A group's declared minimum could not be satisfied structurally.
    Validation(String),
    /// Malformed syntax that does not fit a more specific category.
    Syntax(String),
}

impl fmt::Display for DslError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "empty requirement expression"),
            Self::UnknownPredicate { name } => write!(f, "unknown predicate: {name}"),
            Self::UnknownFunction { name } => write!(f, "unknown function: {name}"),
            Self::TrailingInput { remainder } => write!(f, "trailing input: {remainder}"),
            Self::Validation(msg) => write!(f, "{msg}"),
            Self::Syntax(msg) => write!(f, "syntax error: {msg}"),
        }
    }
}

impl std::error::Error for DslError {}

// ============================================================================
// SECTION: Tokenizer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Number(u64),
    LParen,
    RParen,
    Comma,
    AndOp,
    OrOp,
    NotKw,
}

fn tokenize(input: &str) -> Result<Vec<Token>, DslError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch.is_whitespace() {
            i += 1;
        } else if ch == '(' {
            tokens.push(Token::LParen);
            i += 1;
        } else if ch == ')' {
            tokens.push(Token::RParen);
            i += 1;
        } else if ch == ',' {
            tokens.push(Token::Comma);
            i += 1;
        } else if ch == '&' && chars.get(i + 1) == Some(&'&') {
            tokens.push(Token::AndOp);
            i += 2;
        } else if ch == '|' && chars.get(i + 1) == Some(&'|') {
            tokens.push(Token::OrOp);
            i += 2;
        } else if ch.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<u64>()
                .map_err(|_| DslError::Syntax(format!("invalid number: {text}")))?;
            tokens.push(Token::Number(value));
        } else if ch.is_alphabetic() || ch == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            if word == "not" {
                tokens.push(Token::NotKw);
            } else {
                tokens.push(Token::Ident(word));
            }
        } else {
            return Err(DslError::Syntax(format!("unexpected character: {ch}")));
        }
    }
    Ok(tokens)
}

// ============================================================================
// SECTION: Parser
// ============================================================================

struct Parser<'a, P, R: PredicateResolver<P>> {
    tokens: Vec<Token>,
    pos: usize,
    resolver: &'a R,
    _marker: std::marker::PhantomData<P>,
}

impl<'a, P, R: PredicateResolver<P>> Parser<'a, P, R> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), DslError> {
        match self.advance() {
            Some(ref tok) if tok == expected => Ok(()),
            Some(other) => Err(DslError::Syntax(format!("expected {expected:?}, found {other:?}"))),
            None => Err(DslError::Syntax(format!("expected {expected:?}, found end of input"))),
        }
    }

    fn parse_or(&mut self) -> Result<Requirement<P>, DslError> {
        let mut left = self.parse_and()?;
        while matches!(self.peek(), Some(Token::OrOp)) {
            self.advance();
            let right = self.parse_and()?;
            left = Requirement::or(vec![left, right]);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Requirement<P>, DslError> {
        let mut left = self.parse_unary()?;
        while matches!(self.peek(), Some(Token::AndOp)) {
            self.advance();
            let right = self.parse_unary()?;
            left = Requirement::and(vec![left, right]);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Requirement<P>, DslError> {
        if matches!(self.peek(), Some(Token::NotKw)) {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Requirement::negate(inner));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Requirement<P>, DslError> {
        match self.advance() {
            Some(Token::LParen) => {
                let expr = self.parse_or()?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Some(Token::Ident(name)) => {
                if matches!(self.peek(), Some(Token::LParen)) {
                    self.parse_call(&name)
                } else {
                    self.resolve_leaf(&name)
                }
            }
            Some(other) => Err(DslError::Syntax(format!("unexpected token: {other:?}"))),
            None => Err(DslError::Syntax("unexpected end of input".to_string())),
        }
    }

    fn resolve_leaf(&self, name: &str) -> Result<Requirement<P>, DslError> {
        self.resolver
            .resolve(name)
            .map(Requirement::predicate)
            .ok_or_else(|| DslError::UnknownPredicate { name: name.to_string() })
    }

    fn parse_call(&mut self, name: &str) -> Result<Requirement<P>, DslError> {
        self.expect(&Token::LParen)?;
        match name {
            "all" => {
                let args = self.parse_arg_list()?;
                self.expect(&Token::RParen)?;
                Ok(Requirement::and(args))
            }
            "any" => {
                let args = self.parse_arg_list()?;
                self.expect(&Token::RParen)?;
                Ok(Requirement::or(args))
            }
            "at_least" => {
                let min = match self.advance() {
                    Some(Token::Number(value)) => value,
                    Some(other) => {
                        return Err(DslError::Syntax(format!(
                            "expected a numeric minimum, found {other:?}"
                        )));
                    }
                    None => return Err(DslError::Syntax("expected a numeric minimum".to_string())),
                };
                self.expect(&Token::Comma)?;
                let args = self.parse_arg_list()?;
                self.expect(&Token::RParen)?;
                if min as usize > args.len() {
                    return Err(DslError::Validation(format!(
                        "Invalid group: minimum {min} exceeds {} available requirements",
                        args.len()
                    )));
                }
                let min_u8 = u8::try_from(min)
                    .map_err(|_| DslError::Syntax(format!("minimum too large: {min}")))?;
                Ok(Requirement::require_group(min_u8, args))
            }
            other => Err(DslError::UnknownFunction { name: other.to_string() }),
        }
    }

    fn parse_arg_list(&mut self) -> Result<Vec<Requirement<P>>, DslError> {
        let mut args = vec![self.parse_or()?];
        while matches!(self.peek(), Some(Token::Comma)) {
            self.advance();
            args.push(self.parse_or()?);
        }
        Ok(args)
    }

    fn remaining_source(&self) -> String {
        self.tokens[self.pos..]
            .iter()
            .map(|tok| format!("{tok:?}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Parses a requirement expression, resolving leaves through `resolver`.
///
/// # Errors
///
/// Returns [`DslError`] on empty input, unresolved identifiers, unknown
/// functions, structurally invalid groups, or trailing/malformed syntax.
pub fn parse_requirement<P, R>(input: &str, resolver: &R) -> Result<Requirement<P>, DslError>
where
    R: PredicateResolver<P>,
{
    if input.trim().is_empty() {
        return Err(DslError::EmptyInput);
    }
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        resolver,
        _marker: std::marker::PhantomData,
    };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(DslError::TrailingInput { remainder: parser.remaining_source() });
    }
    Ok(expr)
}
