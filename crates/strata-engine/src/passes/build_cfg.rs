//! CFG construction pass

use super::{CompilerPass, PassKind, PassOrder, PassPipeline, PassResult};
use crate::cfg::build_cfg;
use crate::error::PassError;
use crate::ir::IrScope;

/// Builds the scope's CFG from its flat instruction list.
///
/// Once a graph exists it is the source of truth: later runs (after a
/// structural pass moved the generation on) only report it.
pub struct BuildCfgPass;

impl CompilerPass for BuildCfgPass {
    fn kind(&self) -> PassKind {
        PassKind::BuildCfg
    }

    fn order(&self) -> PassOrder {
        PassOrder::PreOrder
    }

    fn execute(
        &self,
        _pipeline: &PassPipeline,
        scope: &mut IrScope,
        _deps: &[PassResult],
    ) -> Result<PassResult, PassError> {
        if let Some(cfg) = scope.cfg() {
            return Ok(PassResult::Cfg {
                blocks: cfg.block_count(),
            });
        }
        scope.validate()?;
        let cfg = build_cfg(scope.id(), scope.instrs())?;
        let blocks = cfg.block_count();
        scope.set_cfg(cfg);
        scope.compute_flags();
        Ok(PassResult::Cfg { blocks })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IrError;
    use crate::ir::{Instr, Label, Operand, ScopeBuilder};

    #[test]
    fn test_builds_nested_closures() {
        let mut inner = ScopeBuilder::closure("blk");
        inner.emit(Instr::Return(Operand::Int(1)));
        let mut outer = ScopeBuilder::method("m");
        let idx = outer.add_closure(inner.finish());
        let t = outer.temp();
        outer.emit(Instr::BuildClosure {
            dest: t.into(),
            closure: idx,
        });
        outer.emit(Instr::Return(t.into()));
        let mut scope = outer.finish();

        let pipeline = PassPipeline::default();
        pipeline.run(PassKind::BuildCfg, &mut scope).unwrap();
        assert!(scope.cfg().is_some());
        assert!(scope.closures()[0].cfg().is_some());
    }

    #[test]
    fn test_unresolved_label_is_fatal() {
        let mut b = ScopeBuilder::method("bad");
        b.emit(Instr::Jump(Label::new("nowhere")));
        let mut scope = b.finish();
        let err = PassPipeline::default()
            .run(PassKind::BuildCfg, &mut scope)
            .unwrap_err();
        assert!(matches!(err, PassError::Ir(IrError::UnresolvedLabel { .. })));
        assert!(scope.cfg().is_none());
    }
}
