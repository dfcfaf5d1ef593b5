//! Runtime values and raised exceptions

use std::fmt;
use std::sync::Arc;

use super::scope::DynamicScope;
use super::ScopeCode;

/// A runtime value
#[derive(Clone, Default)]
pub enum Value {
    /// `nil`
    #[default]
    Nil,
    /// `true` / `false`
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// 64-bit float
    Float(f64),
    /// Immutable string
    Str(Arc<str>),
    /// A closure over a dynamic scope
    Closure(Arc<ClosureValue>),
    /// An exception object
    Exception(Arc<ExceptionValue>),
}

impl Value {
    /// Everything except `nil` and `false` is truthy
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Whether this is `nil`
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Integer payload
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// String payload
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Closure payload
    pub fn as_closure(&self) -> Option<&Arc<ClosureValue>> {
        match self {
            Value::Closure(c) => Some(c),
            _ => None,
        }
    }

    /// Exception payload
    pub fn as_exception(&self) -> Option<&ExceptionValue> {
        match self {
            Value::Exception(e) => Some(e),
            _ => None,
        }
    }

    /// Name of the value's type, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Closure(_) => "closure",
            Value::Exception(_) => "exception",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => *a as f64 == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => a == b,
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => f.write_str("nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Closure(c) => write!(f, "#<closure {}>", c.code.snapshot().name),
            Value::Exception(e) => write!(f, "#<{}: {}>", e.kind, e.message),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => Ok(()),
            Value::Str(s) => f.write_str(s),
            Value::Exception(e) => f.write_str(&e.message),
            other => write!(f, "{:?}", other),
        }
    }
}

/// A closure: executable body plus the dynamic scope it was created in
pub struct ClosureValue {
    /// Body, interpreted or compiled
    pub code: Arc<dyn ScopeCode>,
    /// Scope of the creating activation; `None` if it had none
    pub captured: Option<Arc<DynamicScope>>,
}

/// Classes of exception the engine itself raises
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// Integer division or modulo by zero
    ZeroDivisionError,
    /// Operand of the wrong type
    TypeError,
    /// Unknown method, native, or a non-callable callee
    NoMethodError,
    /// Arity mismatch
    ArgumentError,
    /// Call nesting exceeded `max_call_depth`
    SystemStackError,
    /// Raised explicitly, or an internal invariant failed at run time
    RuntimeError,
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Exception payload
#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionValue {
    /// Exception class
    pub kind: ExceptionKind,
    /// Human-readable message
    pub message: String,
}

/// A raised exception unwinding through Rust frames.
///
/// Any value can be thrown; engine-raised errors carry an
/// [`ExceptionValue`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{exception:?}")]
pub struct Raise {
    /// The thrown value
    pub exception: Value,
}

impl Raise {
    /// Raise an engine exception
    pub fn new(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Raise {
            exception: Value::Exception(Arc::new(ExceptionValue {
                kind,
                message: message.into(),
            })),
        }
    }

    /// Raise an arbitrary value
    pub fn value(exception: Value) -> Self {
        Raise { exception }
    }

    /// Exception class, if the thrown value is an engine exception
    pub fn kind(&self) -> Option<ExceptionKind> {
        self.exception.as_exception().map(|e| e.kind)
    }

    /// Message, if the thrown value is an engine exception
    pub fn message(&self) -> Option<&str> {
        self.exception.as_exception().map(|e| e.message.as_str())
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Raise::new(ExceptionKind::RuntimeError, message)
    }
}
