//! Error types for the build-time side of the engine.
//!
//! Runtime failures of executing code are not errors in this sense: they are
//! exception values carried by [`crate::interp::Raise`].

use crate::ir::{Label, LocalVar, ScopeId};
use crate::passes::PassKind;

/// Structural defects in a scope's IR.
///
/// These are bugs in the IR producer. A scope that fails with one of these is
/// never executed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum IrError {
    /// A jump or branch names a label that no instruction defines
    #[error("scope {scope}: branch target {label} has no matching label")]
    UnresolvedLabel { scope: ScopeId, label: Label },

    /// The same label is defined twice
    #[error("scope {scope}: label {label} defined more than once")]
    DuplicateLabel { scope: ScopeId, label: Label },

    /// An exception region end marker without a start, or a start never closed
    #[error("scope {scope}: unbalanced exception region markers")]
    UnbalancedExceptionRegion { scope: ScopeId },

    /// A rescue label that does not start any block
    #[error("scope {scope}: rescue label {label} does not exist")]
    MissingRescueBlock { scope: ScopeId, label: Label },

    /// `BuildClosure` refers to a closure index the scope does not own
    #[error("scope {scope}: closure index {index} out of range ({count} closures)")]
    UnknownClosure { scope: ScopeId, index: u32, count: usize },

    /// A local variable refers to an enclosing scope deeper than the nesting
    #[error("scope {scope}: variable {var} reaches past the outermost scope (nesting depth {nesting})")]
    UnboundOuterVariable { scope: ScopeId, var: LocalVar, nesting: u32 },

    /// An operation that needs a CFG ran before one was built
    #[error("scope {scope}: no control-flow graph has been built")]
    MissingCfg { scope: ScopeId },
}

/// Internal-consistency failures of the fixed-point solver.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DataflowError {
    /// The solver exceeded the lattice-height bound, which only happens with a
    /// non-monotone transfer function
    #[error("{analysis}: no fixed point within {bound} fact changes (non-monotone transfer?)")]
    NonTermination { analysis: &'static str, bound: u64 },
}

/// Errors from running compiler passes
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PassError {
    #[error("IR error: {0}")]
    Ir(#[from] IrError),
    #[error("Dataflow error: {0}")]
    Dataflow(#[from] DataflowError),
    /// The registry's dependency graph contains a cycle through this pass
    #[error("pass dependency cycle through {0}")]
    DependencyCycle(PassKind),
    /// A pass (or a dependency) was requested that is not registered
    #[error("pass {0} is not registered")]
    UnregisteredPass(PassKind),
    /// A dependency produced a result of the wrong shape
    #[error("pass {pass} expected a {expected} result from its dependency")]
    UnexpectedResult { pass: PassKind, expected: &'static str },
}

/// Error during compilation of a scope snapshot by a backend.
///
/// Recoverable: the method keeps running interpreted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("Backend error: {0}")]
    BackendError(String),
    #[error("Unsupported instruction: {0}")]
    UnsupportedInstruction(String),
}

/// Errors loading an [`crate::EngineConfig`]
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid engine configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid engine configuration: {0}")]
    Invalid(String),
}
