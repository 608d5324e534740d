//! # Eval Module - Expression Evaluation over Mixed Environments
//!
//! Expressions reach the engine as postfix (RPN) token streams. This module
//! evaluates them against the three environment layers visible to a running
//! process: its parameter values, the read-only global variables, and its
//! local variables (integers bound by message receipt). Lookup order is
//! locals, then parameters, then globals.
//!
//! Two arithmetic modes exist. The default mode performs integer arithmetic
//! whenever both operands are integers (`1 2 /` is `0`), promoting to real
//! as soon as a real value participates. Rate evaluation uses forced-real
//! mode, where every numeric leaf is widened to real before any operator
//! applies (`1 2 /` is `0.5`).
//!
//! Set expressions describe one dimension of a receive pattern as a
//! disjunction of inclusive integer ranges: `0 10 ..` is the range 0..=10,
//! and `0 4 .. 8 9 .. U` is its union with 8..=9.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::EvalError;
use crate::syntax::Token;


/// A numeric value whose carrier type is tracked explicitly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numerical {
    Int(i64),
    Real(f64),
}

impl Numerical {
    pub fn as_f64(self) -> f64 {
        match self {
            Numerical::Int(i) => i as f64,
            Numerical::Real(r) => r,
        }
    }
}

/// Parameter environment of a process instance.
///
/// A name lives in exactly one sub-map; inserting it as one carrier type
/// removes it from the other. The trace writer relies on that exclusivity
/// to decide integer versus real formatting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterValues {
    #[serde(default)]
    pub int_values: BTreeMap<String, i64>,
    #[serde(default)]
    pub real_values: BTreeMap<String, f64>,
}

impl ParameterValues {
    pub fn set_int(&mut self, name: &str, value: i64) {
        self.real_values.remove(name);
        self.int_values.insert(name.to_string(), value);
    }

    pub fn set_real(&mut self, name: &str, value: f64) {
        self.int_values.remove(name);
        self.real_values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Numerical> {
        if let Some(i) = self.int_values.get(name) {
            return Some(Numerical::Int(*i));
        }
        self.real_values.get(name).map(|r| Numerical::Real(*r))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.int_values.contains_key(name) || self.real_values.contains_key(name)
    }
}

/// Read-only environment shared by every process in a run.
pub type GlobalVariables = ParameterValues;

/// Per-instance integer bindings, written only by binding receives.
pub type LocalVariables = BTreeMap<String, i64>;

/// Result of evaluating a (sub)expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Real(f64),
    Bool(bool),
    /// A disjunction of inclusive integer ranges.
    Set(Vec<(i64, i64)>),
}

/// Evaluates an expression in forced-real precision. Used for rates and for
/// actual parameters that [`cast_to_double`] classifies as real.
pub fn eval_double(
    tokens: &[Token],
    params: &ParameterValues,
    globals: &GlobalVariables,
    locals: &LocalVariables,
) -> Result<f64, EvalError> {
    match evaluate(tokens, params, globals, locals, true)? {
        Value::Int(i) => Ok(i as f64),
        Value::Real(r) => Ok(r),
        other => Err(type_error(tokens, "expected a numeric result", &other)),
    }
}

/// Evaluates an expression in integer arithmetic. A real result with zero
/// fractional part narrows; anything else is a type mismatch.
pub fn eval_int(
    tokens: &[Token],
    params: &ParameterValues,
    globals: &GlobalVariables,
    locals: &LocalVariables,
) -> Result<i64, EvalError> {
    match evaluate(tokens, params, globals, locals, false)? {
        Value::Int(i) => Ok(i),
        Value::Real(r) if r.fract() == 0.0 => Ok(r as i64),
        other => Err(type_error(tokens, "expected an integer result", &other)),
    }
}

/// Evaluates a gate condition.
pub fn eval_condition(
    tokens: &[Token],
    params: &ParameterValues,
    globals: &GlobalVariables,
    locals: &LocalVariables,
) -> Result<bool, EvalError> {
    match evaluate(tokens, params, globals, locals, false)? {
        Value::Bool(b) => Ok(b),
        other => Err(type_error(tokens, "expected a condition", &other)),
    }
}

/// Evaluates one dimension of a receive pattern into inclusive bound pairs.
/// A bare integer is the singleton range containing it.
pub fn eval_set(
    tokens: &[Token],
    params: &ParameterValues,
    globals: &GlobalVariables,
    locals: &LocalVariables,
) -> Result<Vec<(i64, i64)>, EvalError> {
    match evaluate(tokens, params, globals, locals, false)? {
        Value::Set(ranges) => Ok(ranges),
        Value::Int(i) => Ok(vec![(i, i)]),
        other => Err(type_error(tokens, "expected a set of integers", &other)),
    }
}

/// Decides the carrier type of an actual parameter expression: true iff the
/// stream contains a real literal or an identifier currently bound in a
/// real sub-map.
pub fn cast_to_double(
    tokens: &[Token],
    params: &ParameterValues,
    globals: &GlobalVariables,
) -> bool {
    tokens.iter().any(|t| {
        let text = t.text.as_str();
        (text.parse::<i64>().is_err() && text.parse::<f64>().is_ok())
            || params.real_values.contains_key(text)
            || globals.real_values.contains_key(text)
    })
}

fn type_error(tokens: &[Token], message: &str, got: &Value) -> EvalError {
    let (line, column) = tokens
        .last()
        .map(|t| (t.line, t.column))
        .unwrap_or_default();
    EvalError::TypeMismatch {
        message: format!("{message}, got {got:?}"),
        line,
        column,
    }
}

fn malformed(token: &Token, message: &str) -> EvalError {
    EvalError::Malformed {
        message: message.to_string(),
        line: token.line,
        column: token.column,
    }
}

fn lookup(
    name: &str,
    params: &ParameterValues,
    globals: &GlobalVariables,
    locals: &LocalVariables,
) -> Option<Numerical> {
    if let Some(i) = locals.get(name) {
        return Some(Numerical::Int(*i));
    }
    params.get(name).or_else(|| globals.get(name))
}

fn as_real(value: Value, token: &Token) -> Result<f64, EvalError> {
    match value {
        Value::Int(i) => Ok(i as f64),
        Value::Real(r) => Ok(r),
        other => Err(EvalError::TypeMismatch {
            message: format!("operator '{}' needs numeric operands, got {other:?}", token.text),
            line: token.line,
            column: token.column,
        }),
    }
}

fn as_ranges(value: Value, token: &Token) -> Result<Vec<(i64, i64)>, EvalError> {
    match value {
        Value::Set(ranges) => Ok(ranges),
        Value::Int(i) => Ok(vec![(i, i)]),
        other => Err(EvalError::TypeMismatch {
            message: format!("operator '{}' needs set operands, got {other:?}", token.text),
            line: token.line,
            column: token.column,
        }),
    }
}

fn arith(op: &str, a: Value, b: Value, token: &Token, force_real: bool) -> Result<Value, EvalError> {
    if let (Value::Int(x), Value::Int(y)) = (&a, &b) {
        if !force_real {
            let (x, y) = (*x, *y);
            return match op {
                "+" => Ok(Value::Int(x + y)),
                "-" => Ok(Value::Int(x - y)),
                "*" => Ok(Value::Int(x * y)),
                "/" => {
                    if y == 0 {
                        Err(EvalError::DivisionByZero {
                            line: token.line,
                            column: token.column,
                        })
                    } else {
                        Ok(Value::Int(x / y))
                    }
                }
                "%" => {
                    if y == 0 {
                        Err(EvalError::DivisionByZero {
                            line: token.line,
                            column: token.column,
                        })
                    } else {
                        Ok(Value::Int(x % y))
                    }
                }
                "^" => {
                    if y >= 0 {
                        Ok(Value::Int(x.pow(y.min(u32::MAX as i64) as u32)))
                    } else {
                        Ok(Value::Real((x as f64).powi(y as i32)))
                    }
                }
                "min" => Ok(Value::Int(x.min(y))),
                "max" => Ok(Value::Int(x.max(y))),
                _ => Err(malformed(token, "unknown operator")),
            };
        }
    }
    let x = as_real(a, token)?;
    let y = as_real(b, token)?;
    match op {
        "+" => Ok(Value::Real(x + y)),
        "-" => Ok(Value::Real(x - y)),
        "*" => Ok(Value::Real(x * y)),
        "/" => {
            if y == 0.0 {
                Err(EvalError::DivisionByZero {
                    line: token.line,
                    column: token.column,
                })
            } else {
                Ok(Value::Real(x / y))
            }
        }
        "%" => {
            if y == 0.0 {
                Err(EvalError::DivisionByZero {
                    line: token.line,
                    column: token.column,
                })
            } else {
                Ok(Value::Real(x % y))
            }
        }
        "^" => Ok(Value::Real(x.powf(y))),
        "min" => Ok(Value::Real(x.min(y))),
        "max" => Ok(Value::Real(x.max(y))),
        _ => Err(malformed(token, "unknown operator")),
    }
}

fn compare(op: &str, a: Value, b: Value, token: &Token) -> Result<Value, EvalError> {
    let x = as_real(a, token)?;
    let y = as_real(b, token)?;
    let result = match op {
        "<" => x < y,
        "<=" => x <= y,
        ">" => x > y,
        ">=" => x >= y,
        "==" => x == y,
        "!=" => x != y,
        _ => return Err(malformed(token, "unknown comparison")),
    };
    Ok(Value::Bool(result))
}

/// The stack machine. `force_real` widens every numeric leaf to real before
/// operators apply; it is what makes rate arithmetic real-valued.
fn evaluate(
    tokens: &[Token],
    params: &ParameterValues,
    globals: &GlobalVariables,
    locals: &LocalVariables,
    force_real: bool,
) -> Result<Value, EvalError> {
    let end = Token::new("", 0, 0);
    let last = tokens.last().unwrap_or(&end);
    let mut stack: Vec<Value> = Vec::new();

    let pop = |stack: &mut Vec<Value>, token: &Token| -> Result<Value, EvalError> {
        stack
            .pop()
            .ok_or_else(|| malformed(token, "operator is missing an operand"))
    };

    for token in tokens {
        let text = token.text.as_str();
        match text {
            "+" | "-" | "*" | "/" | "%" | "^" | "min" | "max" => {
                let b = pop(&mut stack, token)?;
                let a = pop(&mut stack, token)?;
                stack.push(arith(text, a, b, token, force_real)?);
            }
            "<" | "<=" | ">" | ">=" | "==" | "!=" => {
                let b = pop(&mut stack, token)?;
                let a = pop(&mut stack, token)?;
                stack.push(compare(text, a, b, token)?);
            }
            "&" | "&&" => {
                let b = pop(&mut stack, token)?;
                let a = pop(&mut stack, token)?;
                match (a, b) {
                    (Value::Bool(x), Value::Bool(y)) => stack.push(Value::Bool(x && y)),
                    _ => return Err(malformed(token, "conjunction needs boolean operands")),
                }
            }
            "|" | "||" => {
                let b = pop(&mut stack, token)?;
                let a = pop(&mut stack, token)?;
                match (a, b) {
                    (Value::Bool(x), Value::Bool(y)) => stack.push(Value::Bool(x || y)),
                    (a, b) => {
                        let mut ranges = as_ranges(a, token)?;
                        ranges.extend(as_ranges(b, token)?);
                        stack.push(Value::Set(ranges));
                    }
                }
            }
            "!" => {
                let a = pop(&mut stack, token)?;
                match a {
                    Value::Bool(x) => stack.push(Value::Bool(!x)),
                    _ => return Err(malformed(token, "negation needs a boolean operand")),
                }
            }
            ".." => {
                let b = pop(&mut stack, token)?;
                let a = pop(&mut stack, token)?;
                match (a, b) {
                    (Value::Int(lo), Value::Int(hi)) => stack.push(Value::Set(vec![(lo, hi)])),
                    _ => return Err(malformed(token, "range bounds must be integers")),
                }
            }
            "U" => {
                let b = pop(&mut stack, token)?;
                let a = pop(&mut stack, token)?;
                let mut ranges = as_ranges(a, token)?;
                ranges.extend(as_ranges(b, token)?);
                stack.push(Value::Set(ranges));
            }
            "abs" => {
                let a = pop(&mut stack, token)?;
                match a {
                    Value::Int(i) if !force_real => stack.push(Value::Int(i.abs())),
                    other => stack.push(Value::Real(as_real(other, token)?.abs())),
                }
            }
            "sqrt" => {
                let a = pop(&mut stack, token)?;
                stack.push(Value::Real(as_real(a, token)?.sqrt()));
            }
            "neg" => {
                let a = pop(&mut stack, token)?;
                match a {
                    Value::Int(i) if !force_real => stack.push(Value::Int(-i)),
                    other => stack.push(Value::Real(-as_real(other, token)?)),
                }
            }
            "true" => stack.push(Value::Bool(true)),
            "false" => stack.push(Value::Bool(false)),
            _ => {
                if let Ok(i) = text.parse::<i64>() {
                    if force_real {
                        stack.push(Value::Real(i as f64));
                    } else {
                        stack.push(Value::Int(i));
                    }
                } else if let Ok(r) = text.parse::<f64>() {
                    stack.push(Value::Real(r));
                } else {
                    match lookup(text, params, globals, locals) {
                        Some(Numerical::Int(i)) => {
                            if force_real {
                                stack.push(Value::Real(i as f64));
                            } else {
                                stack.push(Value::Int(i));
                            }
                        }
                        Some(Numerical::Real(r)) => stack.push(Value::Real(r)),
                        None => {
                            return Err(EvalError::UndefinedVariable {
                                name: text.to_string(),
                                line: token.line,
                                column: token.column,
                            });
                        }
                    }
                }
            }
        }
    }

    let result = stack
        .pop()
        .ok_or_else(|| malformed(last, "empty expression"))?;
    if !stack.is_empty() {
        return Err(malformed(last, "expression leaves extra operands"));
    }
    Ok(result)
}
