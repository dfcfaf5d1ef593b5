//! Live-variable analysis
//!
//! Backward over temporaries and depth-0 locals. A variable is live at a
//! point if some path from there reads it before writing it.

use std::fmt::Write as _;

use super::{solve, BitSet, DataflowProblem, Direction, Solution, VarIndex};
use crate::cfg::{BlockId, Cfg};
use crate::error::DataflowError;
use crate::ir::{Instr, Variable};

fn tracked(var: &Variable) -> bool {
    match var {
        Variable::Temp(_) => true,
        Variable::Local(l) => !l.is_outer(),
    }
}

/// The liveness problem for one CFG
#[derive(Debug, Clone)]
pub struct LivenessProblem {
    index: VarIndex,
}

impl LivenessProblem {
    /// Index every tracked variable the graph mentions
    pub fn new(cfg: &Cfg) -> Self {
        let mut index = VarIndex::new();
        for block in cfg.blocks() {
            for instr in block.instrs() {
                for var in instr.def().into_iter().chain(instr.uses()) {
                    if tracked(var) {
                        index.insert(var.clone());
                    }
                }
            }
        }
        LivenessProblem { index }
    }

    /// The variable numbering
    pub fn index(&self) -> &VarIndex {
        &self.index
    }
}

impl DataflowProblem for LivenessProblem {
    fn name(&self) -> &'static str {
        "liveness"
    }

    fn direction(&self) -> Direction {
        Direction::Backward
    }

    fn universe(&self) -> usize {
        self.index.len()
    }

    fn transfer(&self, instr: &Instr, state: &mut BitSet) {
        if let Some(bit) = instr.def().and_then(|d| self.index.get(d)) {
            state.remove(bit);
        }
        for var in instr.uses() {
            if let Some(bit) = self.index.get(var) {
                state.insert(bit);
            }
        }
    }
}

/// Liveness facts at a fixed point
#[derive(Debug, Clone)]
pub struct LivenessSolution {
    problem: LivenessProblem,
    solution: Solution,
}

impl LivenessSolution {
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

    /// The variable numbering
    pub fn index(&self) -> &VarIndex {
        &self.problem.index
    }

    fn vars(&self, set: &BitSet) -> Vec<Variable> {
        set.iter().map(|bit| self.problem.index.var(bit).clone()).collect()
    }

    /// Variables live on entry to `block`
    pub fn live_in(&self, block: BlockId) -> Vec<Variable> {
        self.vars(self.solution.block_in(block))
    }

    /// Variables live on exit from `block`
    pub fn live_out(&self, block: BlockId) -> Vec<Variable> {
        self.vars(self.solution.block_out(block))
    }

    /// Whether `var` is live on entry to `block`
    pub fn is_live_in(&self, block: BlockId, var: &Variable) -> bool {
        self.problem
            .index
            .get(var)
            .is_some_and(|bit| self.solution.block_in(block).contains(bit))
    }

    /// Whether `var` is live on exit from `block`
    pub fn is_live_out(&self, block: BlockId, var: &Variable) -> bool {
        self.problem
            .index
            .get(var)
            .is_some_and(|bit| self.solution.block_out(block).contains(bit))
    }

    /// The live set just after each instruction of `block`, in instruction
    /// order
    pub fn live_after_each(&self, cfg: &Cfg, block: BlockId) -> Vec<BitSet> {
        let len = cfg.block(block).map_or(0, |b| b.instrs().len());
        let mut out = vec![BitSet::new(self.problem.index.len()); len];
        self.solution
            .replay(cfg, &self.problem, block, |i, _, state| out[i] = state.clone());
        out
    }

    /// Whether `var` is live just after instruction `i` of `block`
    pub fn is_live_after(&self, cfg: &Cfg, block: BlockId, i: usize, var: &Variable) -> bool {
        let Some(bit) = self.problem.index.get(var) else {
            return false;
        };
        self.live_after_each(cfg, block)
            .get(i)
            .is_some_and(|s| s.contains(bit))
    }
}

/// Solve liveness for a graph
pub fn compute(cfg: &Cfg) -> Result<LivenessSolution, DataflowError> {
    let problem = LivenessProblem::new(cfg);
    let solution = solve(cfg, &problem)?;
    Ok(LivenessSolution { problem, solution })
}

/// Per-block live-in and live-out sets, one block per line
pub fn dump(cfg: &Cfg, liveness: &LivenessSolution) -> String {
    let names = |vars: Vec<Variable>| {
        vars.iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let mut out = String::new();
    for id in cfg.block_ids() {
        let _ = writeln!(
            out,
            "{}: in [{}] out [{}]",
            id,
            names(liveness.live_in(id)),
            names(liveness.live_out(id))
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::ir::{BinOpKind, Label, LocalVar, Operand, ScopeId, TempVar};

    fn t(n: u32) -> Variable {
        Variable::Temp(TempVar(n))
    }

    #[test]
    fn test_diamond_liveness() {
        // t0 = arg; if t0 { t1 = 1 } else { t2 = 5 }; return t1
        let (l_else, l_join) = (Label::new("else"), Label::new("join"));
        let instrs = vec![
            Instr::ReceiveArg { dest: t(0), index: 0 },
            Instr::Branch {
                cond: t(0).into(),
                when: false,
                target: l_else.clone(),
            },
            Instr::Copy {
                dest: t(1),
                src: Operand::Int(1),
            },
            Instr::Jump(l_join.clone()),
            Instr::Label(l_else.clone()),
            Instr::Copy {
                dest: t(2),
                src: Operand::Int(5),
            },
            Instr::Label(l_join.clone()),
            Instr::Return(t(1).into()),
        ];
        let cfg = build_cfg(ScopeId(0), &instrs).unwrap();
        let live = compute(&cfg).unwrap();

        let join = cfg.block_for_label(&l_join).unwrap();
        let else_block = cfg.block_for_label(&l_else).unwrap();
        let head = cfg.fall_through_successor(cfg.entry()).unwrap();
        let then_block = cfg.fall_through_successor(head).unwrap();

        assert_eq!(live.live_in(join), vec![t(1)]);
        // t1 flows through the else branch undefined, so it is live there
        assert!(live.is_live_in(else_block, &t(1)));
        assert!(!live.is_live_in(then_block, &t(1)));
        assert!(!live.is_live_out(else_block, &t(2)));
        assert!(live.is_live_out(head, &t(1)));
        assert!(live.live_out(join).is_empty());
    }

    #[test]
    fn test_loop_carries_liveness() {
        let (head, done) = (Label::new("head"), Label::new("done"));
        let i = Variable::Local(LocalVar::new("i", 0, 0));
        let instrs = vec![
            Instr::Copy {
                dest: i.clone(),
                src: Operand::Int(0),
            },
            Instr::Label(head.clone()),
            Instr::BinOp {
                dest: t(0),
                op: BinOpKind::Lt,
                lhs: i.clone().into(),
                rhs: Operand::Int(10),
            },
            Instr::Branch {
                cond: t(0).into(),
                when: false,
                target: done.clone(),
            },
            Instr::BinOp {
                dest: i.clone(),
                op: BinOpKind::Add,
                lhs: i.clone().into(),
                rhs: Operand::Int(1),
            },
            Instr::Jump(head.clone()),
            Instr::Label(done),
            Instr::Return(Operand::Nil),
        ];
        let cfg = build_cfg(ScopeId(0), &instrs).unwrap();
        let live = compute(&cfg).unwrap();
        let head_block = cfg.block_for_label(&head).unwrap();
        assert!(live.is_live_in(head_block, &i));
        let body = cfg.fall_through_successor(head_block).unwrap();
        assert!(live.is_live_out(body, &i));
        let dump = dump(&cfg, &live);
        assert!(dump.contains("in [i]"));
    }

    #[test]
    fn test_rescue_keeps_value_live() {
        // t1 is only read by the rescue block, reached when the call raises
        let (rescue, done) = (Label::new("rescue"), Label::new("done"));
        let instrs = vec![
            Instr::Copy {
                dest: t(1),
                src: Operand::Int(7),
            },
            Instr::ExceptionRegionStart {
                rescue: rescue.clone(),
            },
            Instr::Call {
                dest: Some(t(1)),
                target: crate::ir::CallTarget::Native("raise".into()),
                args: vec![],
                block: None,
            },
            Instr::ExceptionRegionEnd,
            Instr::Jump(done.clone()),
            Instr::Label(rescue),
            Instr::Return(t(1).into()),
            Instr::Label(done),
            Instr::Return(Operand::Nil),
        ];
        let cfg = build_cfg(ScopeId(0), &instrs).unwrap();
        let live = compute(&cfg).unwrap();
        let first = cfg.fall_through_successor(cfg.entry()).unwrap();
        let after = live.live_after_each(&cfg, first);
        let bit = live.index().get(&t(1)).unwrap();
        assert!(after[0].contains(bit));
    }
}
