//! Dead-code elimination
//!
//! Removes instructions whose result is never read and whose evaluation is
//! not observable. Removing one instruction can make the instructions
//! feeding it dead too, so liveness is re-solved until a round removes
//! nothing.

use rustc_hash::FxHashSet;
use tracing::debug;

use super::{dep, CompilerPass, DceSummary, PassKind, PassPipeline, PassResult};
use crate::cfg::{BlockId, Cfg};
use crate::dataflow::liveness::{self, LivenessSolution};
use crate::dataflow::BitSet;
use crate::error::{IrError, PassError};
use crate::ir::{Instr, IrScope, LocalVar, Variable};

/// Dead-code elimination over one scope, then each nested closure
pub struct DeadCodeEliminationPass;

impl CompilerPass for DeadCodeEliminationPass {
    fn kind(&self) -> PassKind {
        PassKind::DeadCodeElimination
    }

    fn execute(
        &self,
        pipeline: &PassPipeline,
        scope: &mut IrScope,
        deps: &[PassResult],
    ) -> Result<PassResult, PassError> {
        let mut summary = DceSummary::default();
        if scope.flags().binding_has_escaped {
            summary.skipped = true;
        } else {
            let live = dep(
                PassKind::DeadCodeElimination,
                deps,
                0,
                "liveness",
                PassResult::as_liveness,
            )?;
            summary = eliminate(scope, live)?;
        }

        for closure in scope.closures_mut() {
            pipeline.run(PassKind::DeadCodeElimination, closure)?;
        }

        debug!(
            scope = %scope.id(),
            removed = summary.removed,
            rounds = summary.rounds,
            skipped = summary.skipped,
            "dead code elimination"
        );
        Ok(PassResult::DeadCode(summary))
    }
}

fn eliminate(scope: &mut IrScope, first: &LivenessSolution) -> Result<DceSummary, PassError> {
    let id = scope.id();
    let captured = scope.captured_locals();
    let mut summary = DceSummary::default();

    let mut dead = find_dead(scope.require_cfg()?, first, &captured);
    loop {
        summary.rounds += 1;
        if dead.is_empty() {
            break;
        }
        let cfg = scope.cfg_mut().ok_or(IrError::MissingCfg { scope: id })?;
        for (block, indices) in &dead {
            if let Some(bb) = cfg.block_mut(*block) {
                let instrs = bb.instrs_mut();
                // Indices are ascending; remove from the back
                for &i in indices.iter().rev() {
                    instrs.remove(i);
                    summary.removed += 1;
                }
            }
        }

        let live = liveness::compute(scope.require_cfg()?)?;
        scope.stats_mut().dataflow_visits += live.solution().visits;
        dead = find_dead(scope.require_cfg()?, &live, &captured);
    }
    Ok(summary)
}

/// Per block, ascending indices of removable instructions
fn find_dead(
    cfg: &Cfg,
    live: &LivenessSolution,
    captured: &FxHashSet<LocalVar>,
) -> Vec<(BlockId, Vec<usize>)> {
    let mut dead = Vec::new();
    for block in cfg.block_ids() {
        let Some(bb) = cfg.block(block) else {
            continue;
        };
        let after = live.live_after_each(cfg, block);
        let indices: Vec<usize> = bb
            .instrs()
            .iter()
            .enumerate()
            .filter(|(i, instr)| is_dead(instr, &after[*i], live, captured))
            .map(|(i, _)| i)
            .collect();
        if !indices.is_empty() {
            dead.push((block, indices));
        }
    }
    dead
}

fn is_dead(
    instr: &Instr,
    live_after: &BitSet,
    live: &LivenessSolution,
    captured: &FxHashSet<LocalVar>,
) -> bool {
    if instr.has_side_effects() {
        return false;
    }
    let Some(def) = instr.def() else {
        return false;
    };
    if let Variable::Local(l) = def {
        if captured.contains(l) {
            return false;
        }
    }
    live.index()
        .get(def)
        .is_some_and(|bit| !live_after.contains(bit))
}
