// SPDX-License-Identifier: MIT

//! Recursive-descent parser for condition expressions
//!
//! Precedence, loosest first: `or`, `and`, `not`, comparisons,
//! `+ -`, `* / %`, unary minus.

use super::ast::{ArithOp, CompareOp, Expression, Literal};
use super::lexer::{tokenize, Spanned, Token};
use crate::runtime::ConditionError;

const KEYWORDS: &[&str] = &[
    "and", "or", "not", "in", "contains", "true", "false", "True", "False", "null", "None",
];

/// Bound on grammar-rule nesting, which also bounds the depth of the AST
const MAX_NESTING_DEPTH: usize = 256;

/// Parse a condition expression string into an AST
pub fn parse(input: &str) -> Result<Expression, ConditionError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };

    if parser.peek() == &Token::Eof {
        return Err(ConditionError::parse(0, "empty expression"));
    }

    let expr = parser.parse_or()?;
    match parser.peek() {
        Token::Eof => Ok(expr),
        other => Err(ConditionError::parse(
            parser.position(),
            format!("unexpected trailing token {:?}", other),
        )),
    }
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn position(&self) -> usize {
        self.tokens[self.pos].position
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.pos].token.clone();
        if token != Token::Eof {
            self.pos += 1;
        }
        token
    }

    fn at_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Token::Ident(word) if word == keyword)
    }

    fn expect(&mut self, expected: Token) -> Result<(), ConditionError> {
        if self.peek() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(ConditionError::parse(
                self.position(),
                format!("expected {:?}, found {:?}", expected, self.peek()),
            ))
        }
    }

    /// Step one level deeper, returning the depth to restore on the way out
    fn enter(&mut self) -> Result<usize, ConditionError> {
        let saved = self.depth;
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ConditionError::parse(
                self.position(),
                "expression nested too deeply",
            ));
        }
        Ok(saved)
    }

    fn parse_or(&mut self) -> Result<Expression, ConditionError> {
        let saved = self.enter()?;
        let mut left = self.parse_and()?;
        while self.at_keyword("or") || self.peek() == &Token::OrOr {
            self.advance();
            // each operator deepens the left-leaning tree
            self.enter()?;
            let right = self.parse_and()?;
            left = Expression::Or(Box::new(left), Box::new(right));
        }
        self.depth = saved;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expression, ConditionError> {
        let saved = self.enter()?;
        let mut left = self.parse_not()?;
        while self.at_keyword("and") || self.peek() == &Token::AndAnd {
            self.advance();
            self.enter()?;
            let right = self.parse_not()?;
            left = Expression::And(Box::new(left), Box::new(right));
        }
        self.depth = saved;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expression, ConditionError> {
        let saved = self.enter()?;
        let expr = if self.at_keyword("not") || self.peek() == &Token::Bang {
            self.advance();
            Expression::Not(Box::new(self.parse_not()?))
        } else {
            self.parse_comparison()?
        };
        self.depth = saved;
        Ok(expr)
    }

    fn parse_comparison(&mut self) -> Result<Expression, ConditionError> {
        let left = self.parse_additive()?;

        let op = match self.peek() {
            Token::EqEq => CompareOp::Eq,
            Token::NotEq => CompareOp::NotEq,
            Token::Lt => CompareOp::Lt,
            Token::Lte => CompareOp::Lte,
            Token::Gt => CompareOp::Gt,
            Token::Gte => CompareOp::Gte,
            Token::Ident(word) if word == "contains" => CompareOp::Contains,
            Token::Ident(word) if word == "in" => CompareOp::In,
            _ => return Ok(left),
        };
        self.advance();

        let right = self.parse_additive()?;
        Ok(Expression::Compare {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn parse_additive(&mut self) -> Result<Expression, ConditionError> {
        let saved = self.enter()?;
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => ArithOp::Add,
                Token::Minus => ArithOp::Sub,
                _ => {
                    self.depth = saved;
                    return Ok(left);
                }
            };
            self.advance();
            self.enter()?;
            let right = self.parse_multiplicative()?;
            left = Expression::Arithmetic {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> Result<Expression, ConditionError> {
        let saved = self.enter()?;
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => ArithOp::Mul,
                Token::Slash => ArithOp::Div,
                Token::Percent => ArithOp::Mod,
                _ => {
                    self.depth = saved;
                    return Ok(left);
                }
            };
            self.advance();
            self.enter()?;
            let right = self.parse_unary()?;
            left = Expression::Arithmetic {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> Result<Expression, ConditionError> {
        let saved = self.enter()?;
        let expr = if self.peek() == &Token::Minus {
            self.advance();
            Expression::Negate(Box::new(self.parse_unary()?))
        } else {
            self.parse_primary()?
        };
        self.depth = saved;
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expression, ConditionError> {
        let position = self.position();
        match self.advance() {
            Token::Number(n) => Ok(Expression::Literal(Literal::Number(n))),
            Token::Str(s) => Ok(Expression::Literal(Literal::String(s))),
            Token::LParen => {
                let inner = self.parse_or()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(word) => match word.as_str() {
                "true" | "True" => Ok(Expression::Literal(Literal::Boolean(true))),
                "false" | "False" => Ok(Expression::Literal(Literal::Boolean(false))),
                "null" | "None" => Ok(Expression::Literal(Literal::Null)),
                w if KEYWORDS.contains(&w) => Err(ConditionError::parse(
                    position,
                    format!("unexpected keyword '{}'", w),
                )),
                _ => self.parse_path(word),
            },
            Token::Eof => Err(ConditionError::parse(position, "unexpected end of expression")),
            other => Err(ConditionError::parse(
                position,
                format!("unexpected token {:?}", other),
            )),
        }
    }

    fn parse_path(&mut self, head: String) -> Result<Expression, ConditionError> {
        let mut segments = vec![head];
        while self.peek() == &Token::Dot {
            self.advance();
            let position = self.position();
            match self.advance() {
                Token::Ident(segment) => segments.push(segment),
                other => {
                    return Err(ConditionError::parse(
                        position,
                        format!("expected field name after '.', found {:?}", other),
                    ))
                }
            }
        }
        Ok(Expression::Path(segments))
    }
}
