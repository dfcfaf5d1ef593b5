//! Intermediate representation
//!
//! Scopes hold a flat instruction list produced by an IR front-end. Passes
//! build a CFG over it, optimize it in place, and finally linearize it into an
//! immutable [`ScopeSnapshot`] for execution.

pub mod builder;
pub mod display;
pub mod instr;
pub mod operand;
pub mod scope;
pub mod snapshot;

pub use builder::ScopeBuilder;
pub use instr::{BinOpKind, CallTarget, Instr};
pub use operand::{Label, LocalVar, Operand, TempVar, Variable};
pub use scope::{
    BindingLayout, BindingSlot, CachedResult, IrScope, ScopeFlags, ScopeId, ScopeKind,
    ScopeStats, Signature,
};
pub use snapshot::ScopeSnapshot;
