//! Strata Execution Core
//!
//! This crate turns a scope's IR into progressively better execution
//! strategies and decides, per call, whether to interpret or run compiled code:
//! - **IR**: operands, instructions, scopes and their snapshots (`ir` module)
//! - **CFG**: basic blocks, control-flow graph construction, linearization (`cfg` module)
//! - **Dataflow**: generic fixed-point solver plus liveness and closure-binding analyses (`dataflow` module)
//! - **Passes**: dependency-resolving pass pipeline, DCE, binding insertion (`passes` module)
//! - **Interpreter**: call protocol, dynamic scopes, instruction loop (`interp` module)
//! - **Tiered dispatch**: call counting, background compilation, compiled-entry swap (`tiered` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use strata_engine::{EngineConfig, Runtime, ScopeBuilder, Instr, BinOpKind, Value};
//!
//! let mut b = ScopeBuilder::method("mul");
//! let (a, c, r) = (b.temp(), b.temp(), b.temp());
//! b.emit(Instr::ReceiveArg { dest: a.into(), index: 0 });
//! b.emit(Instr::ReceiveArg { dest: c.into(), index: 1 });
//! b.emit(Instr::BinOp { dest: r.into(), op: BinOpKind::Mul, lhs: a.into(), rhs: c.into() });
//! b.emit(Instr::Return(r.into()));
//!
//! let runtime = Runtime::new(EngineConfig::default());
//! runtime.define_method(b.signature(2, 0).finish()).unwrap();
//! let mut ctx = runtime.new_context();
//! let result = runtime.call(&mut ctx, "mul", &[Value::Int(6), Value::Int(7)], None);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![allow(clippy::new_without_default)]

// ============================================================================
// Core Modules
// ============================================================================

/// IR model: operands, instructions, scopes and snapshots
pub mod ir;

/// Control-flow graph construction and linearization
pub mod cfg;

/// Fixed-point dataflow engine and the analyses built on it
pub mod dataflow;

/// Compiler passes and the dependency-resolving pipeline
pub mod passes;

/// Interpreter: values, dynamic scopes, call protocol
pub mod interp;

/// Tiered dispatch: profiling, promotion, compiled-entry installation
pub mod tiered;

/// Engine configuration
pub mod config;

/// Error types
pub mod error;

mod runtime;

// ============================================================================
// Re-exports
// ============================================================================

pub use config::{CompileMode, DispatchConfig, EngineConfig, PassConfig};
pub use error::{CompileError, ConfigError, DataflowError, IrError, PassError};
pub use interp::{ExceptionKind, Raise, ThreadContext, Value};
pub use ir::{
    BinOpKind, CallTarget, Instr, IrScope, Label, LocalVar, Operand, ScopeBuilder, ScopeId,
    ScopeKind, ScopeSnapshot, Signature, TempVar, Variable,
};
pub use passes::{PassKind, PassPipeline, PassRegistry};
pub use runtime::Runtime;
pub use tiered::{TierState, TieredEngine, TieredMethod};
