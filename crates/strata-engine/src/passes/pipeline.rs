//! On-demand pass scheduling
//!
//! `run` resolves dependencies depth-first, reuses anything cached for the
//! scope's current generation, and after a structural pass bumps the
//! generation and drops the results that pass declares stale. A rewrite
//! inside a nested closure counts as a rewrite of the enclosing scope.

use std::sync::Arc;

use tracing::debug;

use super::registry::PassRegistry;
use super::{PassKind, PassOrder, PassResult};
use crate::config::PassConfig;
use crate::error::PassError;
use crate::ir::{IrScope, ScopeSnapshot};

/// Runs passes from a registry
#[derive(Clone)]
pub struct PassPipeline {
    registry: Arc<PassRegistry>,
    config: PassConfig,
}

impl PassPipeline {
    /// Pipeline over `registry`
    pub fn new(registry: Arc<PassRegistry>, config: PassConfig) -> Self {
        PassPipeline { registry, config }
    }

    /// Pipeline over the built-in passes
    pub fn standard(config: PassConfig) -> Self {
        Self::new(Arc::new(PassRegistry::standard()), config)
    }

    /// The registry passes are looked up in
    pub fn registry(&self) -> &PassRegistry {
        &self.registry
    }

    /// Optional pass selection
    pub fn config(&self) -> &PassConfig {
        &self.config
    }

    /// Run `kind` on `scope`, after its dependencies
    pub fn run(&self, kind: PassKind, scope: &mut IrScope) -> Result<PassResult, PassError> {
        let pass = Arc::clone(self.registry.get(kind)?);
        if pass.previously_run(scope) {
            if let Some(cached) = scope.cached(kind) {
                return Ok(cached.clone());
            }
        }

        let mut deps = Vec::with_capacity(pass.dependencies().len());
        for &dep in pass.dependencies() {
            deps.push(self.run(dep, scope)?);
        }

        let before = closure_generations(scope);
        let result = pass.execute(self, scope, &deps)?;
        *scope.stats_mut().pass_runs.entry(kind).or_insert(0) += 1;

        if pass.order() == PassOrder::PreOrder {
            for closure in scope.closures_mut() {
                self.run(kind, closure)?;
            }
        }

        // A rewritten closure changes what this scope's results embed
        let nested_changed = closure_generations(scope) != before;
        let changed = result.changed_ir() || nested_changed;
        if changed {
            scope.bump_generation();
            for &stale in pass.invalidates() {
                match self.registry.get(stale) {
                    Ok(p) => p.invalidate(scope),
                    Err(_) => scope.invalidate(stale),
                }
            }
            scope.compute_flags();
        }
        debug!(
            scope = %scope.id(),
            pass = pass.label(),
            generation = scope.generation(),
            changed,
            nested_changed,
            "pass executed"
        );
        scope.cache(kind, result.clone());
        Ok(result)
    }

    /// Run each of `kinds` in turn, returning their results
    pub fn run_pipeline(
        &self,
        scope: &mut IrScope,
        kinds: &[PassKind],
    ) -> Result<Vec<PassResult>, PassError> {
        kinds.iter().map(|&kind| self.run(kind, scope)).collect()
    }

    /// Run the standard sequence and return the executable snapshot.
    ///
    /// A snapshot already produced for the current generation is returned
    /// as is.
    pub fn prepare(&self, scope: &mut IrScope) -> Result<Arc<ScopeSnapshot>, PassError> {
        if let Some(snapshot) = scope.cached(PassKind::Linearize).and_then(PassResult::as_snapshot) {
            return Ok(Arc::clone(snapshot));
        }

        self.run(PassKind::BuildCfg, scope)?;
        if self.config.dead_code_elimination {
            self.run(PassKind::DeadCodeElimination, scope)?;
        }
        if self.config.binding_insertion {
            self.run(PassKind::BindingInsertion, scope)?;
        }
        let result = self.run(PassKind::Linearize, scope)?;
        result
            .as_snapshot()
            .cloned()
            .ok_or(PassError::UnexpectedResult {
                pass: PassKind::Linearize,
                expected: "snapshot",
            })
    }
}

fn closure_generations(scope: &IrScope) -> Vec<u64> {
    scope.closures().iter().map(IrScope::generation).collect()
}

impl Default for PassPipeline {
    fn default() -> Self {
        Self::standard(PassConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOpKind, Instr, Operand, ScopeBuilder};

    fn dead_temp_scope() -> IrScope {
        let mut b = ScopeBuilder::method("m").signature(1, 0);
        let (a, dead, sum) = (b.temp(), b.temp(), b.temp());
        b.emit(Instr::ReceiveArg {
            dest: a.into(),
            index: 0,
        });
        b.emit(Instr::Copy {
            dest: dead.into(),
            src: Operand::Int(9),
        });
        b.emit(Instr::BinOp {
            dest: sum.into(),
            op: BinOpKind::Add,
            lhs: a.into(),
            rhs: Operand::Int(1),
        });
        b.emit(Instr::Return(sum.into()));
        b.finish()
    }

    #[test]
    fn test_second_run_is_cached() {
        let pipeline = PassPipeline::default();
        let mut scope = dead_temp_scope();
        pipeline.run(PassKind::Liveness, &mut scope).unwrap();
        let visits = scope.total_dataflow_visits();
        assert!(visits > 0);
        pipeline.run(PassKind::Liveness, &mut scope).unwrap();
        assert_eq!(scope.total_dataflow_visits(), visits);
        assert_eq!(scope.stats().runs_of(PassKind::Liveness), 1);
        assert_eq!(scope.stats().runs_of(PassKind::BuildCfg), 1);
    }

    #[test]
    fn test_structural_pass_bumps_generation() {
        let pipeline = PassPipeline::default();
        let mut scope = dead_temp_scope();
        let before = scope.generation();
        let result = pipeline
            .run(PassKind::DeadCodeElimination, &mut scope)
            .unwrap();
        assert!(matches!(result, PassResult::DeadCode(s) if s.removed == 1));
        assert_eq!(scope.generation(), before + 1);
        assert!(scope.cached(PassKind::Liveness).is_none());
        assert!(scope.cached(PassKind::DeadCodeElimination).is_some());
    }

    #[test]
    fn test_prepare_twice_reuses_snapshot() {
        let pipeline = PassPipeline::default();
        let mut scope = dead_temp_scope();
        let first = pipeline.prepare(&mut scope).unwrap();
        let visits = scope.total_dataflow_visits();
        let second = pipeline.prepare(&mut scope).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(scope.total_dataflow_visits(), visits);
        assert_eq!(first.generation, scope.generation());
    }

    /// A parent that only builds and returns a closure with a dead temp
    fn dead_temp_in_closure() -> IrScope {
        let mut inner = ScopeBuilder::closure("blk");
        let dead = inner.temp();
        inner.emit(Instr::Copy {
            dest: dead.into(),
            src: Operand::Int(9),
        });
        inner.emit(Instr::Return(Operand::Int(1)));
        let mut outer = ScopeBuilder::method("m");
        let idx = outer.add_closure(inner.finish());
        let t = outer.temp();
        outer.emit(Instr::BuildClosure {
            dest: t.into(),
            closure: idx,
        });
        outer.emit(Instr::Return(t.into()));
        outer.finish()
    }

    #[test]
    fn test_closure_rewrite_moves_parent_generation() {
        let pipeline = PassPipeline::default();
        let mut scope = dead_temp_in_closure();
        pipeline.run(PassKind::Linearize, &mut scope).unwrap();
        let before = scope.generation();

        let result = pipeline
            .run(PassKind::DeadCodeElimination, &mut scope)
            .unwrap();
        assert!(matches!(result, PassResult::DeadCode(s) if s.removed == 0));
        assert_eq!(scope.closures()[0].generation(), 1);
        assert_eq!(scope.generation(), before + 1);
        assert!(scope.cached(PassKind::Linearize).is_none());
        assert!(scope.cached(PassKind::DeadCodeElimination).is_some());
    }

    #[test]
    fn test_run_pipeline_in_order() {
        let pipeline = PassPipeline::default();
        let mut scope = dead_temp_scope();
        let results = pipeline
            .run_pipeline(&mut scope, &[PassKind::BuildCfg, PassKind::Liveness])
            .unwrap();
        assert!(matches!(results[0], PassResult::Cfg { .. }));
        assert!(results[1].as_liveness().is_some());
    }
}
