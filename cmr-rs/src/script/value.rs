//! Script values.
//!
//! Variables hold arbitrary JSON ([`serde_json::Value`]).  Arithmetic works
//! on [`Num`], which keeps integers exact until a float enters the
//! computation, and follows floor semantics for `//` and `%`.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{EvalError, RunError};

// ── Num ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Num {
    Int(i64),
    Float(f64),
}

impl fmt::Display for Num {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Num::Int(n) => write!(f, "{n}"),
            Num::Float(x) => {
                if x.fract() == 0.0 && x.abs() < 1e15 {
                    write!(f, "{x:.1}")
                } else {
                    write!(f, "{x}")
                }
            }
        }
    }
}

impl From<i64> for Num {
    fn from(n: i64) -> Self {
        Num::Int(n)
    }
}

impl From<f64> for Num {
    fn from(x: f64) -> Self {
        Num::Float(x)
    }
}

impl PartialEq<f64> for Num {
    fn eq(&self, other: &f64) -> bool {
        self.as_f64() == *other
    }
}

impl Num {
    /// Numbers and booleans are numeric; everything else is not.
    pub fn from_json(v: &Value) -> Option<Num> {
        match v {
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Number(n) => n
                .as_i64()
                .map(Num::Int)
                .or_else(|| n.as_f64().map(Num::Float)),
            _ => None,
        }
    }

    /// Non-finite floats have no JSON form and become `null`.
    pub fn to_json(self) -> Value {
        match self {
            Num::Int(n) => Value::from(n),
            Num::Float(x) => serde_json::Number::from_f64(x).map_or(Value::Null, Value::Number),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(x) => x,
        }
    }

    fn both_int(self, rhs: Num) -> Option<(i64, i64)> {
        match (self, rhs) {
            (Num::Int(a), Num::Int(b)) => Some((a, b)),
            _ => None,
        }
    }

    fn int_or_float(
        self,
        rhs: Num,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Num {
        self.both_int(rhs)
            .and_then(|(a, b)| int_op(a, b))
            .map(Num::Int)
            .unwrap_or_else(|| Num::Float(float_op(self.as_f64(), rhs.as_f64())))
    }

    pub fn add(self, rhs: Num) -> Num {
        self.int_or_float(rhs, i64::checked_add, |a, b| a + b)
    }

    pub fn sub(self, rhs: Num) -> Num {
        self.int_or_float(rhs, i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(self, rhs: Num) -> Num {
        self.int_or_float(rhs, i64::checked_mul, |a, b| a * b)
    }

    /// True division; always a float.
    pub fn div(self, rhs: Num) -> Result<Num, EvalError> {
        if rhs.as_f64() == 0.0 {
            return Err(EvalError::DivisionByZero);
        }
        Ok(Num::Float(self.as_f64() / rhs.as_f64()))
    }

    /// Floor division: rounds toward negative infinity.
    pub fn floor_div(self, rhs: Num) -> Result<Num, EvalError> {
        if rhs.as_f64() == 0.0 {
            return Err(EvalError::DivisionByZero);
        }
        Ok(self.int_or_float(
            rhs,
            |a, b| {
                let q = a.checked_div(b)?;
                Some(if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q })
            },
            |a, b| (a / b).floor(),
        ))
    }

    /// Remainder with the sign of the divisor.
    pub fn rem(self, rhs: Num) -> Result<Num, EvalError> {
        if rhs.as_f64() == 0.0 {
            return Err(EvalError::DivisionByZero);
        }
        Ok(self.int_or_float(
            rhs,
            |a, b| {
                let r = a.checked_rem(b)?;
                Some(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r })
            },
            |a, b| {
                let r = a % b;
                if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                    r + b
                } else {
                    r
                }
            },
        ))
    }

    /// Integer powers stay integral when the exponent is non-negative.
    pub fn pow(self, rhs: Num) -> Result<Num, EvalError> {
        if let Some((a, b)) = self.both_int(rhs) {
            if let Some(p) = u32::try_from(b).ok().and_then(|e| a.checked_pow(e)) {
                return Ok(Num::Int(p));
            }
        }
        let (a, b) = (self.as_f64(), rhs.as_f64());
        if a == 0.0 && b < 0.0 {
            return Err(EvalError::DivisionByZero);
        }
        Ok(Num::Float(a.powf(b)))
    }

    pub fn neg(self) -> Num {
        match self {
            Num::Int(n) => n.checked_neg().map_or(Num::Float(-(n as f64)), Num::Int),
            Num::Float(x) => Num::Float(-x),
        }
    }
}

// ── JSON helpers ──────────────────────────────────────────────────────────────

pub fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "map",
    }
}

/// Human-facing rendering: strings without quotes, everything else as JSON.
pub fn display(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(_) => Num::from_json(v).is_some_and(|n| n.as_f64() != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

/// Equality where `1` and `1.0` are the same number.
pub fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => match (Num::from_json(a), Num::from_json(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x == y,
            (Some(x), Some(y)) => x.as_f64() == y.as_f64(),
            _ => false,
        },
        _ => a == b,
    }
}

/// Numeric accumulation used by `add`.
pub fn add(current: &Value, delta: &Value) -> Result<Value, RunError> {
    match (Num::from_json(current), Num::from_json(delta)) {
        (Some(a), Some(b)) => Ok(a.add(b).to_json()),
        _ => Err(RunError::type_error(format!(
            "cannot add {} to {}",
            type_name(delta),
            type_name(current)
        ))),
    }
}

// ── Comparison ────────────────────────────────────────────────────────────────

/// Comparison operator of `if` and `while`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompareOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }

    /// Ordering needs two numbers or two strings.
    pub fn apply(self, left: &Value, right: &Value) -> Result<bool, RunError> {
        let ordering = |l: &Value, r: &Value| -> Result<Ordering, RunError> {
            match (l, r) {
                (Value::String(a), Value::String(b)) => Ok(a.cmp(b)),
                _ => match (Num::from_json(l), Num::from_json(r)) {
                    (Some(a), Some(b)) => a.as_f64().partial_cmp(&b.as_f64()).ok_or_else(|| {
                        RunError::type_error("cannot order NaN")
                    }),
                    _ => Err(RunError::type_error(format!(
                        "cannot compare {} {} {}",
                        type_name(l),
                        self.symbol(),
                        type_name(r)
                    ))),
                },
            }
        };
        Ok(match self {
            CompareOp::Eq => loose_eq(left, right),
            CompareOp::Ne => !loose_eq(left, right),
            CompareOp::Lt => ordering(left, right)? == Ordering::Less,
            CompareOp::Le => ordering(left, right)? != Ordering::Greater,
            CompareOp::Gt => ordering(left, right)? == Ordering::Greater,
            CompareOp::Ge => ordering(left, right)? != Ordering::Less,
        })
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
