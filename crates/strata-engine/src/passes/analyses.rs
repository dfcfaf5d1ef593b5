//! Analysis passes: liveness and binding store/load placement
//!
//! Each solves one dataflow problem over the current CFG, records the
//! solver's block visits on the scope, and hands back a solution stamped with
//! the generation it describes.

use std::sync::Arc;

use super::{dep, CompilerPass, PassKind, PassPipeline, PassResult};
use crate::dataflow::store_placement::binding_candidates;
use crate::dataflow::{liveness, load_placement, store_placement};
use crate::error::PassError;
use crate::ir::IrScope;

/// Live-variable analysis
pub struct LivenessPass;

impl CompilerPass for LivenessPass {
    fn kind(&self) -> PassKind {
        PassKind::Liveness
    }

    fn execute(
        &self,
        _pipeline: &PassPipeline,
        scope: &mut IrScope,
        _deps: &[PassResult],
    ) -> Result<PassResult, PassError> {
        let mut live = liveness::compute(scope.require_cfg()?)?;
        live.stamp(scope.generation());
        scope.stats_mut().dataflow_visits += live.solution().visits;
        Ok(PassResult::Liveness(Arc::new(live)))
    }
}

/// Where binding-backed variables must be written back to their slots
pub struct StorePlacementPass;

impl CompilerPass for StorePlacementPass {
    fn kind(&self) -> PassKind {
        PassKind::StorePlacement
    }

    fn execute(
        &self,
        _pipeline: &PassPipeline,
        scope: &mut IrScope,
        _deps: &[PassResult],
    ) -> Result<PassResult, PassError> {
        let vars = binding_candidates(scope);
        let mut plan = store_placement::compute(scope.require_cfg()?, vars)?;
        plan.stamp(scope.generation());
        scope.stats_mut().dataflow_visits += plan.solution().visits;
        Ok(PassResult::StorePlacement(Arc::new(plan)))
    }
}

/// Where binding-backed variables must be reloaded from their slots
pub struct LoadPlacementPass;

impl CompilerPass for LoadPlacementPass {
    fn kind(&self) -> PassKind {
        PassKind::LoadPlacement
    }

    fn execute(
        &self,
        _pipeline: &PassPipeline,
        scope: &mut IrScope,
        deps: &[PassResult],
    ) -> Result<PassResult, PassError> {
        let stores = dep(
            PassKind::LoadPlacement,
            deps,
            0,
            "store placement",
            PassResult::as_store_plan,
        )?;
        let vars = stores.vars().to_vec();
        let mut plan = load_placement::compute(scope.require_cfg()?, vars, stores)?;
        plan.stamp(scope.generation());
        scope.stats_mut().dataflow_visits += plan.solution().visits;
        Ok(PassResult::LoadPlacement(Arc::new(plan)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{CallTarget, Instr, Operand, ScopeBuilder};

    fn captured_scope() -> IrScope {
        let mut inner = ScopeBuilder::closure("blk");
        let t = inner.temp();
        let mut outer = ScopeBuilder::method("m");
        let x = outer.local("x");
        inner.emit(Instr::Copy {
            dest: t.into(),
            src: x.outer().into(),
        });
        inner.emit(Instr::Return(t.into()));
        let idx = outer.add_closure(inner.finish());
        let c = outer.temp();
        outer.emit(Instr::Copy {
            dest: x.clone().into(),
            src: Operand::Int(5),
        });
        outer.emit(Instr::BuildClosure {
            dest: c.into(),
            closure: idx,
        });
        outer.emit(Instr::Call {
            dest: None,
            target: CallTarget::Closure(c.into()),
            args: vec![],
            block: None,
        });
        outer.emit(Instr::Return(x.into()));
        outer.finish()
    }

    #[test]
    fn test_store_plan_covers_captured_local() {
        let pipeline = PassPipeline::default();
        let mut scope = captured_scope();
        let result = pipeline.run(PassKind::StorePlacement, &mut scope).unwrap();
        let plan = result.as_store_plan().unwrap();
        assert_eq!(plan.vars().len(), 1);
        assert_eq!(plan.store_count(), 1);
        assert_eq!(plan.generation(), scope.generation());
    }

    #[test]
    fn test_load_plan_after_closure_call() {
        let pipeline = PassPipeline::default();
        let mut scope = captured_scope();
        let result = pipeline.run(PassKind::LoadPlacement, &mut scope).unwrap();
        let plan = result.as_load_plan().unwrap();
        // x is read by the return after the closure may have written it
        assert_eq!(plan.load_count(), 1);
        assert!(scope.cached(PassKind::StorePlacement).is_some());
    }

    #[test]
    fn test_visits_are_recorded() {
        let pipeline = PassPipeline::default();
        let mut scope = captured_scope();
        pipeline.run(PassKind::Liveness, &mut scope).unwrap();
        let live = scope
            .cached(PassKind::Liveness)
            .and_then(PassResult::as_liveness)
            .unwrap();
        assert_eq!(scope.stats().dataflow_visits, live.solution().visits);
    }
}
