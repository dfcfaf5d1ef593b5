//! Backend-agnostic compilation traits
//!
//! A backend turns an immutable [`ScopeSnapshot`] into a
//! [`CompiledArtifact`]. Artifacts run under the same call protocol as the
//! interpreter, so raises and frame bookkeeping behave identically.

use std::sync::Arc;

use crate::error::CompileError;
use crate::interp::{call_scope, Activation, Raise, ScopeCode, ThreadContext, Value};
use crate::ir::ScopeSnapshot;

/// The pluggable compilation trait
pub trait CompilerBackend: Send + Sync {
    /// Backend name (for diagnostics)
    fn name(&self) -> &str;

    /// Compile a snapshot and its nested closures
    fn compile(&self, snapshot: &Arc<ScopeSnapshot>) -> Result<Arc<dyn CompiledArtifact>, CompileError>;
}

/// Executable code produced by a backend
pub trait CompiledArtifact: Send + Sync {
    /// Name of the backend that produced this artifact
    fn backend(&self) -> &str;

    /// Entry point, entered through the call protocol
    fn entry(&self) -> &dyn ScopeCode;

    /// Call with an argument slice
    fn invoke(
        &self,
        ctx: &mut ThreadContext,
        activation: Activation,
        args: &[Value],
        block: Option<&Value>,
    ) -> Result<Value, Raise> {
        call_scope(ctx, self.entry(), activation, args, block)
    }

    /// Call with no arguments
    fn invoke0(&self, ctx: &mut ThreadContext, block: Option<&Value>) -> Result<Value, Raise> {
        self.invoke(ctx, Activation::default(), &[], block)
    }

    /// Call with one argument
    fn invoke1(&self, ctx: &mut ThreadContext, a: Value, block: Option<&Value>) -> Result<Value, Raise> {
        self.invoke(ctx, Activation::default(), &[a], block)
    }

    /// Call with two arguments
    fn invoke2(
        &self,
        ctx: &mut ThreadContext,
        a: Value,
        b: Value,
        block: Option<&Value>,
    ) -> Result<Value, Raise> {
        self.invoke(ctx, Activation::default(), &[a, b], block)
    }

    /// Call with three arguments
    fn invoke3(
        &self,
        ctx: &mut ThreadContext,
        a: Value,
        b: Value,
        c: Value,
        block: Option<&Value>,
    ) -> Result<Value, Raise> {
        self.invoke(ctx, Activation::default(), &[a, b, c], block)
    }
}
