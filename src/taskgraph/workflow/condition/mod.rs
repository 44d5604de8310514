// SPDX-License-Identifier: MIT

//! Condition evaluation for graph workflows
//!
//! Edge conditions and loop guards are written in a small expression
//! language that can only read state keys:
//! - `counter < 5`
//! - `passed == True`
//! - `intent == 'bug' and priority > 3`
//! - `quality_score + bonus >= 80 or 'urgent' in tags`

mod ast;
mod evaluator;
mod lexer;
mod parser;

pub use ast::{ArithOp, CompareOp, Expression, Literal};
pub use evaluator::{eval_value, evaluate, is_truthy};
pub use parser::parse;

use crate::runtime::{ConditionError, StateData};

/// A condition compiled once and evaluated many times.
///
/// Parse failures are kept rather than raised: a malformed condition simply
/// never holds, and every evaluation logs why.
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    compiled: Result<Expression, ConditionError>,
}

impl Condition {
    pub fn compile(source: impl Into<String>) -> Self {
        let source = source.into();
        let compiled = parse(&source);
        if let Err(e) = &compiled {
            log::warn!("Condition '{}' does not parse: {}", source, e);
        }
        Self { source, compiled }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn parse_error(&self) -> Option<&ConditionError> {
        self.compiled.as_ref().err()
    }

    /// Evaluate, reporting any parse or evaluation failure
    pub fn try_evaluate(&self, data: &StateData) -> Result<bool, ConditionError> {
        match &self.compiled {
            Ok(expr) => evaluate(expr, data),
            Err(e) => Err(e.clone()),
        }
    }

    /// Evaluate, treating any failure as `false`
    pub fn is_satisfied(&self, data: &StateData) -> bool {
        match self.try_evaluate(data) {
            Ok(result) => result,
            Err(e) => {
                log::error!("Error evaluating condition '{}': {}", self.source, e);
                false
            }
        }
    }
}
