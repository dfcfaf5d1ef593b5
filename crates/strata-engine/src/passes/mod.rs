//! Compiler passes
//!
//! Every pass is named by a [`PassKind`] that carries its dependency list as
//! data. A [`PassRegistry`] maps kinds to implementations and checks the
//! dependency graph once; a [`PassPipeline`] runs passes on demand, resolving
//! dependencies, caching results per scope generation, and invalidating
//! dependents when a pass rewrites the IR.

pub mod analyses;
pub mod binding;
pub mod build_cfg;
pub mod dce;
pub mod linearize;
pub mod pipeline;
pub mod registry;

use std::fmt;
use std::sync::Arc;

pub use pipeline::PassPipeline;
pub use registry::PassRegistry;

use crate::dataflow::liveness::LivenessSolution;
use crate::dataflow::load_placement::LoadPlan;
use crate::dataflow::store_placement::StorePlan;
use crate::error::PassError;
use crate::ir::{IrScope, ScopeSnapshot};

/// Every pass the engine knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassKind {
    /// Build the control-flow graph
    BuildCfg,
    /// Live-variable analysis
    Liveness,
    /// Remove instructions whose results are never used
    DeadCodeElimination,
    /// Where closure-visible variables must be written back
    StorePlacement,
    /// Where closure-visible variables must be reloaded
    LoadPlacement,
    /// Rewrite locals into temporaries with explicit binding loads and stores
    BindingInsertion,
    /// Flatten the CFG into an executable snapshot
    Linearize,
}

impl PassKind {
    /// All kinds, in standard pipeline order
    pub const ALL: [PassKind; 7] = [
        PassKind::BuildCfg,
        PassKind::Liveness,
        PassKind::DeadCodeElimination,
        PassKind::StorePlacement,
        PassKind::LoadPlacement,
        PassKind::BindingInsertion,
        PassKind::Linearize,
    ];

    /// Short name used in logs and dumps
    pub fn label(self) -> &'static str {
        match self {
            PassKind::BuildCfg => "build-cfg",
            PassKind::Liveness => "liveness",
            PassKind::DeadCodeElimination => "dead-code-elimination",
            PassKind::StorePlacement => "binding-store-placement",
            PassKind::LoadPlacement => "binding-load-placement",
            PassKind::BindingInsertion => "binding-insertion",
            PassKind::Linearize => "linearize",
        }
    }

    /// Passes that must have run on the scope first
    pub fn dependencies(self) -> &'static [PassKind] {
        match self {
            PassKind::BuildCfg => &[],
            PassKind::Liveness => &[PassKind::BuildCfg],
            PassKind::DeadCodeElimination => &[PassKind::Liveness],
            PassKind::StorePlacement => &[PassKind::BuildCfg],
            PassKind::LoadPlacement => &[PassKind::StorePlacement],
            PassKind::BindingInsertion => &[PassKind::StorePlacement],
            PassKind::Linearize => &[PassKind::BuildCfg],
        }
    }

    /// Cached results a change by this pass makes stale
    pub fn invalidates(self) -> &'static [PassKind] {
        match self {
            PassKind::DeadCodeElimination => &[
                PassKind::Liveness,
                PassKind::StorePlacement,
                PassKind::LoadPlacement,
                PassKind::Linearize,
            ],
            PassKind::BindingInsertion => &[
                PassKind::Liveness,
                PassKind::DeadCodeElimination,
                PassKind::StorePlacement,
                PassKind::LoadPlacement,
                PassKind::Linearize,
            ],
            _ => &[],
        }
    }
}

impl fmt::Display for PassKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Whether a pass recurses into nested closures by itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOrder {
    /// The pipeline runs the pass on the scope, then on each nested closure
    PreOrder,
    /// The pass touches only the scope it is given (or recurses explicitly)
    PostOrder,
}

/// Outcome of dead-code elimination on one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DceSummary {
    /// Instructions removed from this scope
    pub removed: usize,
    /// Rounds of liveness solved until nothing more was removed
    pub rounds: usize,
    /// The scope's binding had escaped, so nothing was touched
    pub skipped: bool,
}

/// Outcome of binding insertion on one scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BindingSummary {
    /// Binding-backed variables given a heap slot
    pub slots: usize,
    /// `StoreBinding` instructions inserted
    pub stores: usize,
    /// `LoadBinding` instructions inserted
    pub loads: usize,
    /// Locals renamed to temporaries
    pub renamed: usize,
    /// The scope's binding had escaped, or insertion already happened
    pub skipped: bool,
}

/// What a pass produced
#[derive(Debug, Clone)]
pub enum PassResult {
    /// The CFG exists with this many blocks
    Cfg {
        /// Live blocks including entry and exit
        blocks: usize,
    },
    /// Liveness facts
    Liveness(Arc<LivenessSolution>),
    /// Dead-code elimination summary
    DeadCode(DceSummary),
    /// Store placement plan
    StorePlacement(Arc<StorePlan>),
    /// Load placement plan
    LoadPlacement(Arc<LoadPlan>),
    /// Binding insertion summary
    Bindings(BindingSummary),
    /// The executable snapshot
    Linearized(Arc<ScopeSnapshot>),
}

impl PassResult {
    /// Whether producing this result rewrote the scope's instructions
    pub fn changed_ir(&self) -> bool {
        match self {
            PassResult::DeadCode(s) => s.removed > 0,
            PassResult::Bindings(s) => s.renamed + s.stores + s.loads > 0,
            _ => false,
        }
    }

    /// Liveness facts, if this is a liveness result
    pub fn as_liveness(&self) -> Option<&Arc<LivenessSolution>> {
        match self {
            PassResult::Liveness(l) => Some(l),
            _ => None,
        }
    }

    /// Store plan, if this is a store placement result
    pub fn as_store_plan(&self) -> Option<&Arc<StorePlan>> {
        match self {
            PassResult::StorePlacement(p) => Some(p),
            _ => None,
        }
    }

    /// Load plan, if this is a load placement result
    pub fn as_load_plan(&self) -> Option<&Arc<LoadPlan>> {
        match self {
            PassResult::LoadPlacement(p) => Some(p),
            _ => None,
        }
    }

    /// Snapshot, if this is a linearize result
    pub fn as_snapshot(&self) -> Option<&Arc<ScopeSnapshot>> {
        match self {
            PassResult::Linearized(s) => Some(s),
            _ => None,
        }
    }
}

/// A compiler pass
pub trait CompilerPass: Send + Sync {
    /// Which pass this is
    fn kind(&self) -> PassKind;

    /// Name for diagnostics
    fn label(&self) -> &str {
        self.kind().label()
    }

    /// Whether the pipeline recurses into nested closures after this pass
    fn order(&self) -> PassOrder {
        PassOrder::PostOrder
    }

    /// Passes whose results `execute` receives, in this order
    fn dependencies(&self) -> &[PassKind] {
        self.kind().dependencies()
    }

    /// Cached results to drop when this pass rewrites the IR
    fn invalidates(&self) -> &[PassKind] {
        self.kind().invalidates()
    }

    /// Whether a result for the scope's current generation is cached
    fn previously_run(&self, scope: &IrScope) -> bool {
        scope.cached(self.kind()).is_some()
    }

    /// Run on one scope
    fn execute(
        &self,
        pipeline: &PassPipeline,
        scope: &mut IrScope,
        deps: &[PassResult],
    ) -> Result<PassResult, PassError>;

    /// Drop this pass's own cached result
    fn invalidate(&self, scope: &mut IrScope) {
        scope.invalidate(self.kind());
    }
}

/// Pull the dependency result at `i`, checking its shape
pub(crate) fn dep<'a, T>(
    pass: PassKind,
    deps: &'a [PassResult],
    i: usize,
    expected: &'static str,
    pick: impl Fn(&'a PassResult) -> Option<&'a T>,
) -> Result<&'a T, PassError> {
    deps.get(i)
        .and_then(pick)
        .ok_or(PassError::UnexpectedResult { pass, expected })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_are_declared_kinds() {
        for kind in PassKind::ALL {
            for d in kind.dependencies() {
                assert!(PassKind::ALL.contains(d));
                assert_ne!(*d, kind);
            }
        }
    }

    #[test]
    fn test_labels_unique() {
        let mut labels: Vec<_> = PassKind::ALL.iter().map(|k| k.label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), PassKind::ALL.len());
        assert_eq!(PassKind::Linearize.to_string(), "linearize");
    }
}
