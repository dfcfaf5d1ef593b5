//! Binding-load placement
//!
//! Forward over the same binding-backed variables as store placement. A
//! variable is *stale* when its heap slot may be newer than its fast copy:
//! everything is stale on entry and after any call, since a closure may have
//! written it. A use of a stale variable needs a load just before it.
//!
//! Where one path into a block leaves a variable dirty and another leaves it
//! stale, loading at the join would clobber the dirty value, so the stale
//! predecessor reloads at its end instead.

use rustc_hash::FxHashMap;

use super::store_placement::{BindingVar, StorePlan};
use super::{solve, BitSet, DataflowProblem, Direction, Solution, VarIndex};
use crate::cfg::{BlockId, Cfg, EdgeKind};
use crate::error::DataflowError;
use crate::ir::Instr;

/// The load-placement problem for one CFG
#[derive(Debug, Clone)]
pub struct LoadPlacementProblem {
    index: VarIndex,
    /// Per block: variables to reload at its end
    reload_at_end: Vec<BitSet>,
}

impl LoadPlacementProblem {
    /// Problem over `vars`, which must be in the same order as the store
    /// plan's variables
    pub fn new(cfg: &Cfg, vars: &[BindingVar], stores: &StorePlan) -> Self {
        let mut index = VarIndex::new();
        for v in vars {
            index.insert(v.var.clone());
        }
        let universe = index.len();
        let mut reload_at_end = vec![BitSet::new(universe); cfg.capacity()];
        for block in cfg.block_ids() {
            for &(succ, kind) in cfg.successors(block) {
                if kind == EdgeKind::Exception || !cfg.contains(succ) {
                    continue;
                }
                let dirty = stores.dirty_in(succ);
                for bit in dirty.iter().filter(|&b| b < universe) {
                    reload_at_end[block.index()].insert(bit);
                }
            }
        }
        LoadPlacementProblem {
            index,
            reload_at_end,
        }
    }

    /// The variable numbering
    pub fn index(&self) -> &VarIndex {
        &self.index
    }
}

impl DataflowProblem for LoadPlacementProblem {
    fn name(&self) -> &'static str {
        "binding-load placement"
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn universe(&self) -> usize {
        self.index.len()
    }

    fn boundary(&self) -> BitSet {
        BitSet::full(self.index.len())
    }

    fn transfer(&self, instr: &Instr, state: &mut BitSet) {
        for var in instr.uses() {
            if let Some(bit) = self.index.get(var) {
                state.remove(bit);
            }
        }
        if instr.may_run_closures() {
            state.fill();
        }
        if let Some(bit) = instr.def().and_then(|d| self.index.get(d)) {
            state.remove(bit);
        }
    }

    fn transfer_exceptional(&self, instr: &Instr, state: &BitSet) -> BitSet {
        if instr.may_run_closures() {
            BitSet::full(self.index.len())
        } else {
            state.clone()
        }
    }

    fn block_exit(&self, block: BlockId, state: &mut BitSet) {
        if let Some(reload) = self.reload_at_end.get(block.index()) {
            state.subtract(reload);
        }
    }
}

/// Where loads go
#[derive(Debug, Clone)]
pub struct LoadPlan {
    vars: Vec<BindingVar>,
    solution: Solution,
    /// Per block: instruction index and the variables to load before it
    pub loads: FxHashMap<BlockId, Vec<(usize, Vec<BindingVar>)>>,
    /// Per block: variables to reload at its end, before any terminator
    pub reloads: FxHashMap<BlockId, Vec<BindingVar>>,
}

impl LoadPlan {
    /// Binding-backed variables, in bit order
    pub fn vars(&self) -> &[BindingVar] {
        &self.vars
    }

    /// The underlying fixed point
    pub fn solution(&self) -> &Solution {
        &self.solution
    }

    /// Scope generation the facts were computed for
    pub fn generation(&self) -> u64 {
        self.solution.generation
    }

    pub(crate) fn stamp(&mut self, generation: u64) {
        self.solution.generation = generation;
    }

    /// Total number of loads the plan inserts
    pub fn load_count(&self) -> usize {
        let before: usize = self
            .loads
            .values()
            .flat_map(|sites| sites.iter().map(|(_, vars)| vars.len()))
            .sum();
        before + self.reloads.values().map(Vec::len).sum::<usize>()
    }
}

/// Solve load placement over `vars`, given the store plan for the same
/// variables
pub fn compute(
    cfg: &Cfg,
    vars: Vec<BindingVar>,
    stores: &StorePlan,
) -> Result<LoadPlan, DataflowError> {
    let problem = LoadPlacementProblem::new(cfg, &vars, stores);
    let solution = solve(cfg, &problem)?;
    let pick = |bits: Vec<usize>| -> Vec<BindingVar> { bits.into_iter().map(|b| vars[b].clone()).collect() };

    let mut loads = FxHashMap::default();
    let mut reloads = FxHashMap::default();
    for block in cfg.block_ids() {
        let mut sites = Vec::new();
        solution.replay(cfg, &problem, block, |i, instr, stale| {
            let mut needed: Vec<usize> = instr
                .uses()
                .into_iter()
                .filter_map(|v| problem.index.get(v))
                .filter(|&bit| stale.contains(bit))
                .collect();
            needed.dedup();
            if !needed.is_empty() {
                sites.push((i, pick(needed)));
            }
        });
        if !sites.is_empty() {
            loads.insert(block, sites);
        }

        let mut state = solution.block_in(block).clone();
        if let Some(bb) = cfg.block(block) {
            for instr in bb.instrs() {
                problem.transfer(instr, &mut state);
            }
        }
        let end: Vec<usize> = problem.reload_at_end[block.index()]
            .iter()
            .filter(|&bit| state.contains(bit))
            .collect();
        if !end.is_empty() {
            reloads.insert(block, pick(end));
        }
    }

    Ok(LoadPlan {
        vars,
        solution,
        loads,
        reloads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::dataflow::store_placement;
    use crate::ir::{BinOpKind, CallTarget, Label, LocalVar, Operand, ScopeId, TempVar, Variable};

    fn call() -> Instr {
        Instr::Call {
            dest: None,
            target: CallTarget::Native("puts".into()),
            args: vec![],
            block: None,
        }
    }

    fn var(x: &LocalVar) -> Vec<BindingVar> {
        vec![BindingVar {
            var: x.clone().into(),
            slot: x.clone(),
        }]
    }

    #[test]
    fn test_load_after_call() {
        let x = LocalVar::new("x", 1, 0);
        let t = Variable::Temp(TempVar(0));
        let instrs = vec![
            Instr::Copy {
                dest: t.clone(),
                src: x.clone().into(),
            },
            call(),
            Instr::BinOp {
                dest: t.clone(),
                op: BinOpKind::Add,
                lhs: x.clone().into(),
                rhs: t.clone().into(),
            },
            Instr::Return(t.into()),
        ];
        let cfg = build_cfg(ScopeId(0), &instrs).unwrap();
        let stores = store_placement::compute(&cfg, var(&x)).unwrap();
        let plan = compute(&cfg, var(&x), &stores).unwrap();
        let body = cfg.fall_through_successor(cfg.entry()).unwrap();
        let sites: Vec<usize> = plan.loads[&body].iter().map(|(i, _)| *i).collect();
        assert_eq!(sites, vec![0, 2]);
    }

    #[test]
    fn test_no_load_after_own_def() {
        let x = LocalVar::new("x", 0, 0);
        let instrs = vec![
            Instr::Copy {
                dest: x.clone().into(),
                src: Operand::Int(3),
            },
            Instr::Return(x.clone().into()),
        ];
        let cfg = build_cfg(ScopeId(0), &instrs).unwrap();
        let stores = store_placement::compute(&cfg, var(&x)).unwrap();
        let plan = compute(&cfg, var(&x), &stores).unwrap();
        assert_eq!(plan.load_count(), 0);
    }

    #[test]
    fn test_stale_predecessor_reloads_before_dirty_join() {
        // x is written in the loop body and read in the header; the entry path
        // is stale, the back edge dirty
        let x = LocalVar::new("x", 0, 0);
        let (head, done) = (Label::new("head"), Label::new("done"));
        let t0 = Variable::Temp(TempVar(0));
        let instrs = vec![
            Instr::Label(head.clone()),
            Instr::BinOp {
                dest: t0.clone(),
                op: BinOpKind::Lt,
                lhs: x.clone().into(),
                rhs: Operand::Int(3),
            },
            Instr::Branch {
                cond: t0.into(),
                when: false,
                target: done.clone(),
            },
            Instr::BinOp {
                dest: x.clone().into(),
                op: BinOpKind::Add,
                lhs: x.clone().into(),
                rhs: Operand::Int(1),
            },
            Instr::Jump(head.clone()),
            Instr::Label(done),
            Instr::Return(x.clone().into()),
        ];
        let cfg = build_cfg(ScopeId(0), &instrs).unwrap();
        let stores = store_placement::compute(&cfg, var(&x)).unwrap();
        let plan = compute(&cfg, var(&x), &stores).unwrap();
        let head_block = cfg.block_for_label(&head).unwrap();
        assert!(!plan.loads.contains_key(&head_block));
        assert!(plan.reloads.contains_key(&cfg.entry()));
    }
}
