//! Interpreter tier
//!
//! Executes scope snapshots directly. Compiled code implements the same
//! [`ScopeCode`] interface and enters through the same call protocol, so the
//! two tiers are interchangeable at any call.

pub mod binder;
pub mod context;
pub(crate) mod exec;
mod interpreter;
pub mod natives;
pub mod ops;
pub mod scope;
pub mod value;

pub use binder::{ArgumentBinder, PositionalBinder};
pub use context::{call_scope, Activation, Frame, ThreadContext};
pub use natives::{NativeFn, NativeRegistry};
pub use scope::DynamicScope;
pub use value::{ClosureValue, ExceptionKind, ExceptionValue, Raise, Value};

use crate::ir::ScopeSnapshot;

/// Executable body of a scope
pub trait ScopeCode: Send + Sync {
    /// The snapshot this code was produced from
    fn snapshot(&self) -> &ScopeSnapshot;

    /// Run the body inside an activation the call protocol has already set
    /// up: frame pushed, arguments bound, implicit dynamic scope allocated
    fn execute(
        &self,
        ctx: &mut ThreadContext,
        args: &[Value],
        block: Option<&Value>,
    ) -> Result<Value, Raise>;
}

impl ScopeCode for ScopeSnapshot {
    fn snapshot(&self) -> &ScopeSnapshot {
        self
    }

    fn execute(
        &self,
        ctx: &mut ThreadContext,
        args: &[Value],
        block: Option<&Value>,
    ) -> Result<Value, Raise> {
        interpreter::interpret(ctx, self, args, block)
    }
}
