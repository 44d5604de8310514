// SPDX-License-Identifier: MIT

//! Condition expression evaluator
//!
//! Only the state's keys are visible to an expression. Missing keys,
//! mismatched operand types and division by zero are errors; callers that
//! need the "false on failure" policy go through [`super::Condition`].

use super::ast::{ArithOp, CompareOp, Expression, Literal};
use crate::runtime::{ConditionError, StateData};
use serde_json::Value;
use std::cmp::Ordering;

/// Evaluate a condition expression against state data
pub fn evaluate(expr: &Expression, data: &StateData) -> Result<bool, ConditionError> {
    eval_value(expr, data).map(|v| is_truthy(&v))
}

/// Evaluate an expression down to a JSON value
pub fn eval_value(expr: &Expression, data: &StateData) -> Result<Value, ConditionError> {
    match expr {
        Expression::Literal(literal) => Ok(literal_value(literal)),
        Expression::Path(segments) => lookup(segments, data).cloned(),
        Expression::Negate(inner) => match eval_value(inner, data)? {
            Value::Number(n) => Ok(match n.as_i64() {
                Some(i) if i != i64::MIN => Value::from(-i),
                _ => Value::from(-n.as_f64().unwrap_or(0.0)),
            }),
            other => Err(ConditionError::Type(format!(
                "cannot negate {}",
                type_name(&other)
            ))),
        },
        Expression::Not(inner) => Ok(Value::Bool(!evaluate(inner, data)?)),
        Expression::And(left, right) => {
            Ok(Value::Bool(evaluate(left, data)? && evaluate(right, data)?))
        }
        Expression::Or(left, right) => {
            Ok(Value::Bool(evaluate(left, data)? || evaluate(right, data)?))
        }
        Expression::Arithmetic { left, op, right } => {
            let left = eval_value(left, data)?;
            let right = eval_value(right, data)?;
            arithmetic(*op, &left, &right)
        }
        Expression::Compare { left, op, right } => {
            let left = eval_value(left, data)?;
            let right = eval_value(right, data)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
    }
}

/// Truthiness: null, false, 0, "", [] and {} are false
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn lookup<'a>(segments: &[String], data: &'a StateData) -> Result<&'a Value, ConditionError> {
    let missing = || ConditionError::UnknownVariable(segments.join("."));
    let (head, rest) = segments.split_first().ok_or_else(missing)?;

    let mut current = data.get(head).ok_or_else(missing)?;
    for segment in rest {
        current = current.get(segment).ok_or_else(missing)?;
    }
    Ok(current)
}

fn literal_value(literal: &Literal) -> Value {
    match literal {
        Literal::String(s) => Value::String(s.clone()),
        Literal::Number(n) => number_value(*n),
        Literal::Boolean(b) => Value::Bool(*b),
        Literal::Null => Value::Null,
    }
}

/// Whole floats become JSON integers so `5` in an expression equals `5` in state
fn number_value(n: f64) -> Value {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Value::from(n as i64)
    } else {
        Value::from(n)
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_error(op: impl std::fmt::Display, left: &Value, right: &Value) -> ConditionError {
    ConditionError::Type(format!(
        "unsupported operand types for {}: {} and {}",
        op,
        type_name(left),
        type_name(right)
    ))
}

fn arithmetic(op: ArithOp, left: &Value, right: &Value) -> Result<Value, ConditionError> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => {
            if let (Some(a), Some(b)) = (l.as_i64(), r.as_i64()) {
                if let Some(result) = integer_arithmetic(op, a, b)? {
                    return Ok(Value::from(result));
                }
            }
            let (a, b) = (l.as_f64().unwrap_or(0.0), r.as_f64().unwrap_or(0.0));
            float_arithmetic(op, a, b)
        }
        (Value::String(l), Value::String(r)) if op == ArithOp::Add => {
            Ok(Value::String(format!("{}{}", l, r)))
        }
        (Value::Array(l), Value::Array(r)) if op == ArithOp::Add => {
            Ok(Value::Array(l.iter().chain(r.iter()).cloned().collect()))
        }
        _ => Err(type_error(op, left, right)),
    }
}

/// Exact integer math; `Ok(None)` means fall back to floats (division, overflow)
fn integer_arithmetic(op: ArithOp, a: i64, b: i64) -> Result<Option<i64>, ConditionError> {
    Ok(match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div => None,
        ArithOp::Mod => {
            if b == 0 {
                return Err(ConditionError::DivisionByZero);
            }
            a.checked_rem(b).map(|r| if r != 0 && (r < 0) != (b < 0) { r + b } else { r })
        }
    })
}

fn float_arithmetic(op: ArithOp, a: f64, b: f64) -> Result<Value, ConditionError> {
    let result = match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div | ArithOp::Mod if b == 0.0 => return Err(ConditionError::DivisionByZero),
        ArithOp::Div => a / b,
        ArithOp::Mod => a - b * (a / b).floor(),
    };
    Ok(Value::from(result))
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ConditionError> {
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::NotEq => Ok(!values_equal(left, right)),
        CompareOp::Gt => order(op, left, right).map(|o| o == Ordering::Greater),
        CompareOp::Gte => order(op, left, right).map(|o| o != Ordering::Less),
        CompareOp::Lt => order(op, left, right).map(|o| o == Ordering::Less),
        CompareOp::Lte => order(op, left, right).map(|o| o != Ordering::Greater),
        CompareOp::Contains => contains(op, left, right),
        CompareOp::In => contains(op, right, left),
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l.as_f64() == r.as_f64(),
        _ => left == right,
    }
}

fn order(op: CompareOp, left: &Value, right: &Value) -> Result<Ordering, ConditionError> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => l
            .as_f64()
            .zip(r.as_f64())
            .and_then(|(a, b)| a.partial_cmp(&b))
            .ok_or_else(|| type_error(op, left, right)),
        (Value::String(l), Value::String(r)) => Ok(l.cmp(r)),
        _ => Err(type_error(op, left, right)),
    }
}

fn contains(op: CompareOp, container: &Value, item: &Value) -> Result<bool, ConditionError> {
    match (container, item) {
        (Value::String(haystack), Value::String(needle)) => Ok(haystack.contains(needle.as_str())),
        (Value::Array(items), _) => Ok(items.iter().any(|v| values_equal(v, item))),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        _ => Err(type_error(op, container, item)),
    }
}
