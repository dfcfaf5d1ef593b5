//! Argument binding
//!
//! Turns the values a caller passed into the argument vector a scope's
//! `ReceiveArg` instructions read, enforcing the scope's signature.

use super::value::{ExceptionKind, Raise, Value};
use crate::ir::Signature;

/// Binds call arguments to a signature
pub trait ArgumentBinder: Send + Sync {
    /// Produce the bound argument vector or raise `ArgumentError`
    fn bind(&self, signature: &Signature, args: &[Value]) -> Result<Vec<Value>, Raise>;
}

/// Positional binding: required arguments, then optional ones defaulting to
/// `nil`. Lenient signatures (closures) pad and truncate instead of raising.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalBinder;

impl ArgumentBinder for PositionalBinder {
    fn bind(&self, signature: &Signature, args: &[Value]) -> Result<Vec<Value>, Raise> {
        let (required, max) = (signature.required as usize, signature.max_args() as usize);
        if !signature.lenient && (args.len() < required || args.len() > max) {
            let expected = if required == max {
                required.to_string()
            } else {
                format!("{}..{}", required, max)
            };
            return Err(Raise::new(
                ExceptionKind::ArgumentError,
                format!(
                    "wrong number of arguments (given {}, expected {})",
                    args.len(),
                    expected
                ),
            ));
        }
        let mut bound: Vec<Value> = args.iter().take(max).cloned().collect();
        bound.resize(max, Value::Nil);
        Ok(bound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_arity() {
        let sig = Signature::new(2, 0);
        let bound = PositionalBinder
            .bind(&sig, &[Value::Int(1), Value::Int(2)])
            .unwrap();
        assert_eq!(bound, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_optional_padding() {
        let sig = Signature::new(1, 2);
        let bound = PositionalBinder.bind(&sig, &[Value::Int(1)]).unwrap();
        assert_eq!(bound, vec![Value::Int(1), Value::Nil, Value::Nil]);
    }

    #[test]
    fn test_arity_errors() {
        let sig = Signature::new(1, 1);
        let err = PositionalBinder.bind(&sig, &[]).unwrap_err();
        assert_eq!(err.kind(), Some(ExceptionKind::ArgumentError));
        assert_eq!(
            err.message(),
            Some("wrong number of arguments (given 0, expected 1..2)")
        );
        let err = PositionalBinder
            .bind(&Signature::new(0, 0), &[Value::Nil])
            .unwrap_err();
        assert_eq!(
            err.message(),
            Some("wrong number of arguments (given 1, expected 0)")
        );
    }

    #[test]
    fn test_lenient_pads_and_drops() {
        let sig = Signature {
            required: 1,
            optional: 0,
            lenient: true,
        };
        assert_eq!(PositionalBinder.bind(&sig, &[]).unwrap(), vec![Value::Nil]);
        assert_eq!(
            PositionalBinder
                .bind(&sig, &[Value::Int(1), Value::Int(2)])
                .unwrap(),
            vec![Value::Int(1)]
        );
    }
}
