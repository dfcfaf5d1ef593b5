//! Fixed-point dataflow engine
//!
//! A [`DataflowProblem`] describes facts as bit sets over a variable universe
//! together with a direction, boundary facts and per-instruction transfer.
//! [`solve`] runs a worklist over the CFG to a fixed point and returns an
//! immutable [`Solution`].
//!
//! Exception edges get special treatment. Forward: a rescue block receives
//! the state before each raising instruction of its protected blocks (passed
//! through [`DataflowProblem::transfer_exceptional`]), not the protected
//! block's OUT. Backward: the rescue block's IN is joined into the state
//! before every raising instruction.

pub mod bitset;
pub mod liveness;
pub mod load_placement;
pub mod store_placement;

use std::collections::VecDeque;

use rustc_hash::FxHashMap;
use tracing::trace;

pub use bitset::BitSet;

use crate::cfg::{BlockId, Cfg, EdgeKind};
use crate::error::DataflowError;
use crate::ir::{Instr, Variable};

/// Direction facts flow in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From the entry along edges
    Forward,
    /// From the exit against edges
    Backward,
}

/// A dataflow problem over bit-set facts with union as the meet
pub trait DataflowProblem {
    /// Name used in logs and errors
    fn name(&self) -> &'static str;

    /// Direction of the analysis
    fn direction(&self) -> Direction;

    /// Number of bits in each fact
    fn universe(&self) -> usize;

    /// Fact at the boundary: IN of the entry (forward) or OUT of the exit
    /// (backward)
    fn boundary(&self) -> BitSet {
        BitSet::new(self.universe())
    }

    /// Fact every other block starts from
    fn initial(&self) -> BitSet {
        BitSet::new(self.universe())
    }

    /// Join `incoming` into `acc`; returns whether `acc` changed
    fn meet_into(&self, acc: &mut BitSet, incoming: &BitSet) -> bool {
        acc.union_with(incoming)
    }

    /// Apply one instruction to `state`
    fn transfer(&self, instr: &Instr, state: &mut BitSet);

    /// State a rescue block observes when `instr` raises, given the state
    /// just before it (forward problems only)
    fn transfer_exceptional(&self, _instr: &Instr, state: &BitSet) -> BitSet {
        state.clone()
    }

    /// Adjust the state at a block's exit boundary: after its last
    /// instruction (forward) or before processing it (backward)
    fn block_exit(&self, _block: BlockId, _state: &mut BitSet) {}
}

/// Per-block facts at a fixed point
#[derive(Debug, Clone)]
pub struct Solution {
    direction: Direction,
    in_facts: Vec<BitSet>,
    out_facts: Vec<BitSet>,
    exceptional: Vec<BitSet>,
    /// Number of block visits the solver made
    pub visits: u64,
    /// Scope generation the solution was computed for
    pub generation: u64,
}

impl Solution {
    /// Fact at the start of `block`
    pub fn block_in(&self, block: BlockId) -> &BitSet {
        &self.in_facts[block.index()]
    }

    /// Fact at the end of `block`
    pub fn block_out(&self, block: BlockId) -> &BitSet {
        &self.out_facts[block.index()]
    }

    /// Joined exceptional state of `block` (forward problems)
    pub fn block_exceptional(&self, block: BlockId) -> &BitSet {
        &self.exceptional[block.index()]
    }

    /// Direction the solution was computed in
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Stamp the solution with a scope generation
    pub fn at_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Walk `block` again with the fixed-point facts.
    ///
    /// Forward problems see the state before each instruction, backward
    /// problems the state after it; instructions are visited in the
    /// problem's direction.
    pub fn replay<P: DataflowProblem + ?Sized>(
        &self,
        cfg: &Cfg,
        problem: &P,
        block: BlockId,
        mut visit: impl FnMut(usize, &Instr, &BitSet),
    ) {
        let Some(bb) = cfg.block(block) else {
            return;
        };
        match self.direction {
            Direction::Forward => {
                let mut state = self.block_in(block).clone();
                for (i, instr) in bb.instrs().iter().enumerate() {
                    visit(i, instr, &state);
                    problem.transfer(instr, &mut state);
                }
            }
            Direction::Backward => {
                let rescuer = cfg.rescuer_of(block).filter(|r| cfg.contains(*r));
                let mut state = self.block_out(block).clone();
                problem.block_exit(block, &mut state);
                for (i, instr) in bb.instrs().iter().enumerate().rev() {
                    visit(i, instr, &state);
                    problem.transfer(instr, &mut state);
                    if let (Some(r), true) = (rescuer, instr.can_raise()) {
                        problem.meet_into(&mut state, self.block_in(r));
                    }
                }
            }
        }
    }
}

/// Dense numbering of the variables an analysis tracks
#[derive(Debug, Clone, Default)]
pub struct VarIndex {
    vars: Vec<Variable>,
    index: FxHashMap<Variable, usize>,
}

impl VarIndex {
    /// Empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable if absent; returns its bit
    pub fn insert(&mut self, var: Variable) -> usize {
        if let Some(&i) = self.index.get(&var) {
            return i;
        }
        let i = self.vars.len();
        self.index.insert(var.clone(), i);
        self.vars.push(var);
        i
    }

    /// Bit of a tracked variable
    pub fn get(&self, var: &Variable) -> Option<usize> {
        self.index.get(var).copied()
    }

    /// Variable at a bit
    pub fn var(&self, bit: usize) -> &Variable {
        &self.vars[bit]
    }

    /// Number of tracked variables
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Tracked variables in bit order
    pub fn vars(&self) -> &[Variable] {
        &self.vars
    }
}

/// Run `problem` over `cfg` to a fixed point
pub fn solve<P: DataflowProblem + ?Sized>(cfg: &Cfg, problem: &P) -> Result<Solution, DataflowError> {
    let n = cfg.capacity();
    let universe = problem.universe();
    let mut solution = Solution {
        direction: problem.direction(),
        in_facts: vec![problem.initial(); n],
        out_facts: vec![problem.initial(); n],
        exceptional: vec![BitSet::new(universe); n],
        visits: 0,
        generation: 0,
    };

    let order = match problem.direction() {
        Direction::Forward => cfg.reverse_post_order(),
        Direction::Backward => cfg.post_order(),
    };
    let bound = (universe as u64 + 1) * (order.len() as u64) * 2 + order.len() as u64;

    let mut queued = vec![false; n];
    let mut worklist: VecDeque<BlockId> = VecDeque::with_capacity(order.len());
    for &b in &order {
        queued[b.index()] = true;
        worklist.push_back(b);
    }

    let mut changes: u64 = 0;
    while let Some(block) = worklist.pop_front() {
        queued[block.index()] = false;
        solution.visits += 1;

        let changed = match problem.direction() {
            Direction::Forward => step_forward(cfg, problem, &mut solution, block),
            Direction::Backward => step_backward(cfg, problem, &mut solution, block),
        };
        if !changed {
            continue;
        }
        changes += 1;
        if changes > bound {
            return Err(DataflowError::NonTermination {
                analysis: problem.name(),
                bound,
            });
        }

        let next: Vec<BlockId> = match problem.direction() {
            Direction::Forward => cfg.successors(block).iter().map(|(b, _)| *b).collect(),
            Direction::Backward => cfg.predecessors(block).iter().map(|(b, _)| *b).collect(),
        };
        for b in next {
            if !queued[b.index()] {
                queued[b.index()] = true;
                worklist.push_back(b);
            }
        }
    }

    trace!(
        analysis = problem.name(),
        visits = solution.visits,
        changes,
        "dataflow fixed point"
    );
    Ok(solution)
}

fn step_forward<P: DataflowProblem + ?Sized>(
    cfg: &Cfg,
    problem: &P,
    solution: &mut Solution,
    block: BlockId,
) -> bool {
    let mut state = if block == cfg.entry() {
        problem.boundary()
    } else {
        problem.initial()
    };
    for &(pred, kind) in cfg.predecessors(block) {
        let incoming = if kind == EdgeKind::Exception {
            &solution.exceptional[pred.index()]
        } else {
            &solution.out_facts[pred.index()]
        };
        problem.meet_into(&mut state, incoming);
    }
    solution.in_facts[block.index()] = state.clone();

    let protected = cfg.rescuer_of(block).is_some();
    let mut exceptional = BitSet::new(problem.universe());
    if let Some(bb) = cfg.block(block) {
        for instr in bb.instrs() {
            if protected && instr.can_raise() {
                exceptional.union_with(&problem.transfer_exceptional(instr, &state));
            }
            problem.transfer(instr, &mut state);
        }
    }
    problem.block_exit(block, &mut state);

    let mut changed = false;
    if solution.out_facts[block.index()] != state {
        solution.out_facts[block.index()] = state;
        changed = true;
    }
    if solution.exceptional[block.index()] != exceptional {
        solution.exceptional[block.index()] = exceptional;
        changed = true;
    }
    changed
}

fn step_backward<P: DataflowProblem + ?Sized>(
    cfg: &Cfg,
    problem: &P,
    solution: &mut Solution,
    block: BlockId,
) -> bool {
    let mut state = if block == cfg.exit() {
        problem.boundary()
    } else {
        problem.initial()
    };
    for &(succ, kind) in cfg.successors(block) {
        if kind != EdgeKind::Exception {
            problem.meet_into(&mut state, &solution.in_facts[succ.index()]);
        }
    }
    solution.out_facts[block.index()] = state.clone();

    problem.block_exit(block, &mut state);
    let rescuer = cfg.rescuer_of(block).filter(|r| cfg.contains(*r));
    if let Some(bb) = cfg.block(block) {
        for instr in bb.instrs().iter().rev() {
            problem.transfer(instr, &mut state);
            if let (Some(r), true) = (rescuer, instr.can_raise()) {
                problem.meet_into(&mut state, &solution.in_facts[r.index()]);
            }
        }
    }

    if solution.in_facts[block.index()] != state {
        solution.in_facts[block.index()] = state;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::ir::{Label, Operand, ScopeId, TempVar};

    /// Non-monotone: the meet flips its input
    struct Flipper;

    impl DataflowProblem for Flipper {
        fn name(&self) -> &'static str {
            "flipper"
        }
        fn direction(&self) -> Direction {
            Direction::Forward
        }
        fn universe(&self) -> usize {
            1
        }
        fn meet_into(&self, acc: &mut BitSet, incoming: &BitSet) -> bool {
            let mut flipped = incoming.clone();
            if !flipped.remove(0) {
                flipped.insert(0);
            }
            *acc = flipped;
            true
        }
        fn transfer(&self, _instr: &Instr, _state: &mut BitSet) {}
    }

    #[test]
    fn test_non_monotone_problem_is_rejected() {
        let head = Label::new("head");
        let instrs = vec![
            Instr::Label(head.clone()),
            Instr::Copy {
                dest: Variable::Temp(TempVar(0)),
                src: Operand::Nil,
            },
            Instr::Jump(head),
        ];
        let cfg = build_cfg(ScopeId(0), &instrs).unwrap();
        let err = solve(&cfg, &Flipper).unwrap_err();
        assert!(matches!(
            err,
            DataflowError::NonTermination {
                analysis: "flipper",
                ..
            }
        ));
    }

    #[test]
    fn test_var_index() {
        let mut idx = VarIndex::new();
        let a = Variable::Temp(TempVar(3));
        assert_eq!(idx.insert(a.clone()), 0);
        assert_eq!(idx.insert(a.clone()), 0);
        assert_eq!(idx.get(&a), Some(0));
        assert_eq!(idx.len(), 1);
    }
}
