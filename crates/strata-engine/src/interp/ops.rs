//! Operator semantics shared by both tiers
//!
//! Arithmetic and comparison are total except integer division and modulo
//! by zero: operands of kinds an operator does not support yield `nil`.
//! Integer arithmetic wraps; division floors, and the remainder takes the
//! sign of the divisor.

use std::cmp::Ordering;
use std::sync::Arc;

use super::value::{ExceptionKind, Raise, Value};
use crate::ir::BinOpKind;

/// Evaluate `lhs op rhs`
pub fn binop(op: BinOpKind, lhs: &Value, rhs: &Value) -> Result<Value, Raise> {
    use BinOpKind::*;
    let value = match op {
        Add => match (lhs, rhs) {
            (Value::Str(a), Value::Str(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Value::Str(Arc::from(s))
            }
            _ => arith(lhs, rhs, i64::wrapping_add, |a, b| a + b),
        },
        Sub => arith(lhs, rhs, i64::wrapping_sub, |a, b| a - b),
        Mul => arith(lhs, rhs, i64::wrapping_mul, |a, b| a * b),
        Div => match (lhs, rhs) {
            (Value::Int(_), Value::Int(0)) => return Err(zero_division()),
            (Value::Int(a), Value::Int(b)) => Value::Int(floor_div(*a, *b)),
            _ => arith(lhs, rhs, |_, _| 0, |a, b| a / b),
        },
        Mod => match (lhs, rhs) {
            (Value::Int(_), Value::Int(0)) => return Err(zero_division()),
            (Value::Int(a), Value::Int(b)) => Value::Int(floor_mod(*a, *b)),
            _ => arith(lhs, rhs, |_, _| 0, |a, b| a - b * (a / b).floor()),
        },
        Lt => compare(lhs, rhs, Ordering::is_lt),
        Le => compare(lhs, rhs, Ordering::is_le),
        Gt => compare(lhs, rhs, Ordering::is_gt),
        Ge => compare(lhs, rhs, Ordering::is_ge),
        Eq => Value::Bool(lhs == rhs),
        Ne => Value::Bool(lhs != rhs),
    };
    Ok(value)
}

fn zero_division() -> Raise {
    Raise::new(ExceptionKind::ZeroDivisionError, "divided by 0")
}

fn floor_div(a: i64, b: i64) -> i64 {
    let q = a.wrapping_div(b);
    if a.wrapping_rem(b) != 0 && ((a < 0) != (b < 0)) {
        q.wrapping_sub(1)
    } else {
        q
    }
}

fn floor_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && ((r < 0) != (b < 0)) {
        r.wrapping_add(b)
    } else {
        r
    }
}

fn arith(lhs: &Value, rhs: &Value, int: fn(i64, i64) -> i64, float: fn(f64, f64) -> f64) -> Value {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Value::Int(int(*a, *b)),
        (Value::Int(a), Value::Float(b)) => Value::Float(float(*a as f64, *b)),
        (Value::Float(a), Value::Int(b)) => Value::Float(float(*a, *b as f64)),
        (Value::Float(a), Value::Float(b)) => Value::Float(float(*a, *b)),
        _ => Value::Nil,
    }
}

fn compare(lhs: &Value, rhs: &Value, test: fn(Ordering) -> bool) -> Value {
    let ordering = match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => None,
    };
    ordering.map_or(Value::Nil, |o| Value::Bool(test(o)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(op: BinOpKind, a: i64, b: i64) -> Value {
        binop(op, &Value::Int(a), &Value::Int(b)).unwrap()
    }

    #[test]
    fn test_integer_arithmetic() {
        assert_eq!(int(BinOpKind::Mul, 6, 7), Value::Int(42));
        assert_eq!(int(BinOpKind::Sub, 1, 3), Value::Int(-2));
        assert_eq!(int(BinOpKind::Add, i64::MAX, 1), Value::Int(i64::MIN));
    }

    #[test]
    fn test_floor_division() {
        assert_eq!(int(BinOpKind::Div, 7, 2), Value::Int(3));
        assert_eq!(int(BinOpKind::Div, -7, 2), Value::Int(-4));
        assert_eq!(int(BinOpKind::Mod, -7, 2), Value::Int(1));
        assert_eq!(int(BinOpKind::Mod, 7, -2), Value::Int(-1));
    }

    #[test]
    fn test_division_by_zero_raises() {
        let err = binop(BinOpKind::Div, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.kind(), Some(ExceptionKind::ZeroDivisionError));
        let err = binop(BinOpKind::Mod, &Value::Int(1), &Value::Int(0)).unwrap_err();
        assert_eq!(err.kind(), Some(ExceptionKind::ZeroDivisionError));
        // Float division follows IEEE
        let v = binop(BinOpKind::Div, &Value::Float(1.0), &Value::Int(0)).unwrap();
        assert_eq!(v, Value::Float(f64::INFINITY));
    }

    #[test]
    fn test_mixed_and_mismatched() {
        let v = binop(BinOpKind::Add, &Value::Int(1), &Value::Float(0.5)).unwrap();
        assert_eq!(v, Value::Float(1.5));
        let v = binop(BinOpKind::Add, &Value::from("a"), &Value::from("b")).unwrap();
        assert_eq!(v, Value::from("ab"));
        let v = binop(BinOpKind::Mul, &Value::from("a"), &Value::Int(2)).unwrap();
        assert_eq!(v, Value::Nil);
        let v = binop(BinOpKind::Lt, &Value::Nil, &Value::Int(2)).unwrap();
        assert_eq!(v, Value::Nil);
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(int(BinOpKind::Lt, 1, 2), Value::Bool(true));
        assert_eq!(int(BinOpKind::Ge, 1, 2), Value::Bool(false));
        assert_eq!(int(BinOpKind::Ne, 1, 2), Value::Bool(true));
        let v = binop(BinOpKind::Le, &Value::from("a"), &Value::from("b")).unwrap();
        assert_eq!(v, Value::Bool(true));
    }
}
