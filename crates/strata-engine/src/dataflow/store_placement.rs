//! Binding-store placement
//!
//! Forward over binding-backed variables: depth-0 locals that a nested
//! closure captures, and outer locals this scope references. A variable is
//! *dirty* when its fast copy is newer than its heap slot. Every store point
//! (a call, anything that can raise, a return) needs the dirty variables
//! written back first.

use rustc_hash::{FxHashMap, FxHashSet};

use super::{solve, BitSet, DataflowProblem, Direction, Solution, VarIndex};
use crate::cfg::{BlockId, Cfg, EdgeKind};
use crate::error::DataflowError;
use crate::ir::{Instr, IrScope, LocalVar, Operand, Variable};

/// A variable that lives in a heap slot, paired with that slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingVar {
    /// The variable instructions read and write
    pub var: Variable,
    /// The heap slot backing it
    pub slot: LocalVar,
}

/// Binding-backed variables of a scope, in analysis order.
///
/// After binding insertion these are the temporaries recorded in the layout;
/// before it, the captured depth-0 locals (by offset) followed by the outer
/// locals the scope references.
pub fn binding_candidates(scope: &IrScope) -> Vec<BindingVar> {
    if let Some(layout) = scope.binding_layout() {
        return layout
            .slots
            .iter()
            .map(|s| BindingVar {
                var: Variable::Temp(s.temp),
                slot: s.local.clone(),
            })
            .collect();
    }
    let mut captured: Vec<LocalVar> = scope.captured_locals().into_iter().collect();
    captured.sort_by_key(|l| l.offset);
    captured
        .into_iter()
        .chain(scope.outer_references())
        .map(|l| BindingVar {
            var: Variable::Local(l.clone()),
            slot: l,
        })
        .collect()
}

/// The store-placement problem for one CFG
#[derive(Debug, Clone)]
pub struct StorePlacementProblem {
    index: VarIndex,
    /// Blocks that flow normally into a rescue block; everything dirty is
    /// written back at their end so rescue blocks start clean
    flush_blocks: FxHashSet<BlockId>,
}

impl StorePlacementProblem {
    /// Problem over `vars` (bit order follows the slice)
    pub fn new(cfg: &Cfg, vars: &[BindingVar]) -> Self {
        let mut index = VarIndex::new();
        for v in vars {
            index.insert(v.var.clone());
        }
        let flush_blocks = cfg
            .block_ids()
            .filter(|&b| {
                cfg.successors(b)
                    .iter()
                    .any(|(s, kind)| *kind != EdgeKind::Exception && cfg.is_rescue_block(*s))
            })
            .collect();
        StorePlacementProblem {
            index,
            flush_blocks,
        }
    }

    /// The variable numbering
    pub fn index(&self) -> &VarIndex {
        &self.index
    }
}

impl DataflowProblem for StorePlacementProblem {
    fn name(&self) -> &'static str {
        "binding-store placement"
    }

    fn direction(&self) -> Direction {
        Direction::Forward
    }

    fn universe(&self) -> usize {
        self.index.len()
    }

    fn transfer(&self, instr: &Instr, state: &mut BitSet) {
        if let Instr::StoreBinding {
            value: Operand::Var(v),
            ..
        } = instr
        {
            if let Some(bit) = self.index.get(v) {
                state.remove(bit);
            }
        }
        if instr.is_store_point() {
            state.clear();
        }
        if let Some(bit) = instr.def().and_then(|d| self.index.get(d)) {
            if matches!(instr, Instr::LoadBinding { .. }) {
                state.remove(bit);
            } else {
                state.insert(bit);
            }
        }
    }

    fn transfer_exceptional(&self, _instr: &Instr, _state: &BitSet) -> BitSet {
        // Everything dirty was stored before the raising instruction
        BitSet::new(self.index.len())
    }

    fn block_exit(&self, block: BlockId, state: &mut BitSet) {
        if self.flush_blocks.contains(&block) {
            state.clear();
        }
    }
}

/// Where stores go
#[derive(Debug, Clone)]
pub struct StorePlan {
    vars: Vec<BindingVar>,
    solution: Solution,
    /// Per block: instruction index and the variables to store before it
    pub stores: FxHashMap<BlockId, Vec<(usize, Vec<BindingVar>)>>,
    /// Per block: variables to store at its end, before any terminator
    pub flushes: FxHashMap<BlockId, Vec<BindingVar>>,
}

impl StorePlan {
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

    /// Variables possibly dirty on entry to `block`, as bits in `vars()` order
    pub fn dirty_in(&self, block: BlockId) -> &BitSet {
        self.solution.block_in(block)
    }

    /// Total number of stores the plan inserts
    pub fn store_count(&self) -> usize {
        let before: usize = self
            .stores
            .values()
            .flat_map(|sites| sites.iter().map(|(_, vars)| vars.len()))
            .sum();
        before + self.flushes.values().map(Vec::len).sum::<usize>()
    }
}

/// Solve store placement over `vars`
pub fn compute(cfg: &Cfg, vars: Vec<BindingVar>) -> Result<StorePlan, DataflowError> {
    let problem = StorePlacementProblem::new(cfg, &vars);
    let solution = solve(cfg, &problem)?;
    let pick = |set: &BitSet| -> Vec<BindingVar> { set.iter().map(|bit| vars[bit].clone()).collect() };

    let mut stores = FxHashMap::default();
    let mut flushes = FxHashMap::default();
    for block in cfg.block_ids() {
        let mut sites = Vec::new();
        solution.replay(cfg, &problem, block, |i, instr, dirty| {
            if instr.is_store_point() && !dirty.is_clear() {
                sites.push((i, pick(dirty)));
            }
        });
        if !sites.is_empty() {
            stores.insert(block, sites);
        }
        if problem.flush_blocks.contains(&block) {
            let mut state = solution.block_in(block).clone();
            if let Some(bb) = cfg.block(block) {
                for instr in bb.instrs() {
                    problem.transfer(instr, &mut state);
                }
            }
            if !state.is_clear() {
                flushes.insert(block, pick(&state));
            }
        }
    }

    Ok(StorePlan {
        vars,
        solution,
        stores,
        flushes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::ir::{CallTarget, ScopeId};

    fn local(name: &str, offset: u32) -> LocalVar {
        LocalVar::new(name, 0, offset)
    }

    fn call() -> Instr {
        Instr::Call {
            dest: None,
            target: CallTarget::Native("puts".into()),
            args: vec![],
            block: None,
        }
    }

    #[test]
    fn test_store_before_call_only_when_dirty() {
        let x = local("x", 0);
        let instrs = vec![
            call(),
            Instr::Copy {
                dest: x.clone().into(),
                src: Operand::Int(1),
            },
            call(),
            call(),
            Instr::Return(Operand::Nil),
        ];
        let cfg = build_cfg(ScopeId(0), &instrs).unwrap();
        let vars = vec![BindingVar {
            var: x.clone().into(),
            slot: x.clone(),
        }];
        let plan = compute(&cfg, vars).unwrap();
        assert_eq!(plan.store_count(), 1);
        let body = cfg.fall_through_successor(cfg.entry()).unwrap();
        assert_eq!(plan.stores[&body][0].0, 2);
    }

    #[test]
    fn test_existing_store_is_respected() {
        let x = local("x", 0);
        let instrs = vec![
            Instr::Copy {
                dest: x.clone().into(),
                src: Operand::Int(1),
            },
            Instr::StoreBinding {
                slot: x.clone(),
                value: x.clone().into(),
            },
            call(),
            Instr::Return(Operand::Nil),
        ];
        let cfg = build_cfg(ScopeId(0), &instrs).unwrap();
        let vars = vec![BindingVar {
            var: x.clone().into(),
            slot: x,
        }];
        let plan = compute(&cfg, vars).unwrap();
        assert_eq!(plan.store_count(), 0);
    }

    #[test]
    fn test_dirty_reaches_join() {
        let x = local("x", 0);
        let join = crate::ir::Label::new("join");
        let instrs = vec![
            Instr::ReceiveArg {
                dest: Variable::Temp(crate::ir::TempVar(0)),
                index: 0,
            },
            Instr::Branch {
                cond: Variable::Temp(crate::ir::TempVar(0)).into(),
                when: true,
                target: join.clone(),
            },
            Instr::Copy {
                dest: x.clone().into(),
                src: Operand::Int(1),
            },
            Instr::Label(join.clone()),
            Instr::Return(x.clone().into()),
        ];
        let cfg = build_cfg(ScopeId(0), &instrs).unwrap();
        let vars = vec![BindingVar {
            var: x.clone().into(),
            slot: x,
        }];
        let plan = compute(&cfg, vars).unwrap();
        let join_block = cfg.block_for_label(&join).unwrap();
        assert!(plan.dirty_in(join_block).contains(0));
        assert_eq!(plan.stores[&join_block][0].0, 0);
    }
}
