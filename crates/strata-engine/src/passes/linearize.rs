//! Linearization pass: the CFG becomes an immutable [`ScopeSnapshot`]

use std::sync::Arc;

use tracing::debug;

use super::{CompilerPass, PassKind, PassPipeline, PassResult};
use crate::cfg::linearize;
use crate::error::PassError;
use crate::ir::{IrScope, ScopeSnapshot};

/// Flattens a scope, after flattening each of its closures
pub struct LinearizePass;

impl CompilerPass for LinearizePass {
    fn kind(&self) -> PassKind {
        PassKind::Linearize
    }

    fn execute(
        &self,
        pipeline: &PassPipeline,
        scope: &mut IrScope,
        _deps: &[PassResult],
    ) -> Result<PassResult, PassError> {
        let mut closures = Vec::with_capacity(scope.closures().len());
        for closure in scope.closures_mut() {
            let result = pipeline.run(PassKind::Linearize, closure)?;
            let snapshot = result
                .as_snapshot()
                .cloned()
                .ok_or(PassError::UnexpectedResult {
                    pass: PassKind::Linearize,
                    expected: "snapshot",
                })?;
            closures.push(snapshot);
        }

        let flat = linearize(scope.require_cfg()?)?;
        let snapshot = ScopeSnapshot {
            scope_id: scope.id(),
            name: Arc::clone(scope.name()),
            kind: scope.kind(),
            generation: scope.generation(),
            instrs: flat.instrs,
            jump_targets: flat.jump_targets,
            rescue_pcs: flat.rescue_pcs,
            temp_count: scope.temp_count() as usize,
            local_count: scope.locals().len(),
            signature: scope.signature(),
            flags: scope.flags(),
            closures,
        };
        debug!(
            scope = %snapshot.scope_id,
            generation = snapshot.generation,
            instrs = snapshot.len(),
            "linearized"
        );
        Ok(PassResult::Linearized(Arc::new(snapshot)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOpKind, Instr, Operand, ScopeBuilder};

    #[test]
    fn test_loop_snapshot_has_back_edge() {
        let mut b = ScopeBuilder::method("count");
        let (i, cond) = (b.temp(), b.temp());
        let (head, done) = (b.label(), b.label());
        b.emit(Instr::Copy {
            dest: i.into(),
            src: Operand::Int(0),
        });
        b.emit(Instr::Label(head.clone()));
        b.emit(Instr::BinOp {
            dest: cond.into(),
            op: BinOpKind::Lt,
            lhs: i.into(),
            rhs: Operand::Int(3),
        });
        b.emit(Instr::Branch {
            cond: cond.into(),
            when: false,
            target: done.clone(),
        });
        b.emit(Instr::BinOp {
            dest: i.into(),
            op: BinOpKind::Add,
            lhs: i.into(),
            rhs: Operand::Int(1),
        });
        b.emit(Instr::Jump(head));
        b.emit(Instr::Label(done));
        b.emit(Instr::Return(i.into()));
        let mut scope = b.finish();

        let snapshot = PassPipeline::default().prepare(&mut scope).unwrap();
        assert!(scope.flags().has_loops);
        assert!(snapshot.flags.has_loops);
        assert!((0..snapshot.len()).any(|pc| snapshot.is_back_edge(pc)));
        assert_eq!(snapshot.jump_targets.len(), snapshot.len());
    }

    #[test]
    fn test_closure_snapshots_nested() {
        let mut inner = ScopeBuilder::closure("blk");
        inner.emit(Instr::Return(Operand::Int(1)));
        let mut outer = ScopeBuilder::method("m");
        let idx = outer.add_closure(inner.finish());
        let c = outer.temp();
        outer.emit(Instr::BuildClosure {
            dest: c.into(),
            closure: idx,
        });
        outer.emit(Instr::Return(c.into()));
        let mut scope = outer.finish();

        let snapshot = PassPipeline::default().prepare(&mut scope).unwrap();
        assert_eq!(snapshot.closures.len(), 1);
        assert_eq!(snapshot.closures[0].name.as_ref(), "blk");
        assert!(snapshot.total_len() > snapshot.len());
    }
}
