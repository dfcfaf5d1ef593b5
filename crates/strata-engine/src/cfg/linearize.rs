//! CFG linearization
//!
//! Lays blocks out in a deterministic order, inserts jumps where a
//! fall-through successor is not placed next, and resolves jump targets and
//! rescue blocks to instruction indices.

use rustc_hash::{FxHashMap, FxHashSet};

use super::block::BlockId;
use super::graph::Cfg;
use crate::error::IrError;
use crate::ir::Instr;

/// A CFG flattened into an instruction array
#[derive(Debug, Clone, Default)]
pub struct Linearized {
    /// Instructions in execution layout
    pub instrs: Vec<Instr>,
    /// Target PC of each jump or branch
    pub jump_targets: Vec<Option<usize>>,
    /// Rescue PC for a raise at each instruction
    pub rescue_pcs: Vec<Option<usize>>,
    /// Blocks in layout order
    pub order: Vec<BlockId>,
}

/// Block layout order: the entry first, fall-through chains kept together,
/// remaining blocks by ascending id, the exit last
pub fn layout_order(cfg: &Cfg) -> Vec<BlockId> {
    let exit = cfg.exit();
    let mut placed = FxHashSet::default();
    let mut order = Vec::with_capacity(cfg.block_count());
    let mut next = Some(cfg.entry());
    while let Some(block) = next {
        placed.insert(block);
        order.push(block);
        next = cfg
            .fall_through_successor(block)
            .filter(|succ| *succ != exit && !placed.contains(succ))
            .or_else(|| cfg.block_ids().find(|b| *b != exit && !placed.contains(b)));
    }
    order.push(exit);
    order
}

/// Flatten the graph
pub fn linearize(cfg: &Cfg) -> Result<Linearized, IrError> {
    let order = layout_order(cfg);
    let mut out = Linearized {
        order: order.clone(),
        ..Linearized::default()
    };
    let mut block_of_pc = Vec::new();
    let mut start_pc: FxHashMap<BlockId, usize> = FxHashMap::default();

    for (i, &id) in order.iter().enumerate() {
        let Some(block) = cfg.block(id) else {
            continue;
        };
        start_pc.insert(id, out.instrs.len());
        for instr in block.instrs() {
            out.instrs.push(instr.clone());
            block_of_pc.push(id);
        }
        if let Some(succ) = cfg.fall_through_successor(id) {
            if order.get(i + 1) != Some(&succ) {
                let label = cfg
                    .block(succ)
                    .map(|b| b.label.clone())
                    .ok_or(IrError::MissingCfg { scope: cfg.scope() })?;
                out.instrs.push(Instr::Jump(label));
                block_of_pc.push(id);
            }
        }
    }

    for (pc, instr) in out.instrs.iter().enumerate() {
        let target = match instr.jump_target() {
            Some(label) => {
                let block = cfg
                    .block_for_label(label)
                    .ok_or_else(|| IrError::UnresolvedLabel {
                        scope: cfg.scope(),
                        label: label.clone(),
                    })?;
                start_pc.get(&block).copied()
            }
            None => None,
        };
        out.jump_targets.push(target);
        let rescue = cfg
            .rescuer_of(block_of_pc[pc])
            .and_then(|r| start_pc.get(&r).copied());
        out.rescue_pcs.push(rescue);
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::ir::{BinOpKind, Label, Operand, ScopeId, TempVar, Variable};

    fn t(n: u32) -> Variable {
        Variable::Temp(TempVar(n))
    }

    #[test]
    fn test_loop_layout() {
        let (head, done) = (Label::new("head"), Label::new("done"));
        let instrs = vec![
            Instr::Copy {
                dest: t(0),
                src: Operand::Int(0),
            },
            Instr::Label(head.clone()),
            Instr::BinOp {
                dest: t(1),
                op: BinOpKind::Lt,
                lhs: t(0).into(),
                rhs: Operand::Int(3),
            },
            Instr::Branch {
                cond: t(1).into(),
                when: false,
                target: done.clone(),
            },
            Instr::BinOp {
                dest: t(0),
                op: BinOpKind::Add,
                lhs: t(0).into(),
                rhs: Operand::Int(1),
            },
            Instr::Jump(head),
            Instr::Label(done),
            Instr::Return(t(0).into()),
        ];
        let cfg = build_cfg(ScopeId(0), &instrs).unwrap();
        let lin = linearize(&cfg).unwrap();
        assert_eq!(lin.order.first(), Some(&cfg.entry()));
        assert_eq!(lin.order.last(), Some(&cfg.exit()));
        assert_eq!(lin.instrs.len(), lin.jump_targets.len());

        // The back jump targets the compare
        let jump_pc = lin
            .instrs
            .iter()
            .position(|i| matches!(i, Instr::Jump(_)))
            .unwrap();
        let target = lin.jump_targets[jump_pc].unwrap();
        assert!(target <= jump_pc);
        assert!(matches!(lin.instrs[target], Instr::BinOp { op: BinOpKind::Lt, .. }));

        // The exit branch lands on the return
        let branch_pc = lin
            .instrs
            .iter()
            .position(|i| matches!(i, Instr::Branch { .. }))
            .unwrap();
        let exit_target = lin.jump_targets[branch_pc].unwrap();
        assert!(matches!(lin.instrs[exit_target], Instr::Return(_)));
    }

    #[test]
    fn test_rescue_pcs() {
        let (rescue, done) = (Label::new("rescue"), Label::new("done"));
        let instrs = vec![
            Instr::ExceptionRegionStart {
                rescue: rescue.clone(),
            },
            Instr::BinOp {
                dest: t(0),
                op: BinOpKind::Div,
                lhs: Operand::Int(1),
                rhs: Operand::Int(0),
            },
            Instr::ExceptionRegionEnd,
            Instr::Jump(done.clone()),
            Instr::Label(rescue),
            Instr::ReceiveException { dest: t(0) },
            Instr::Label(done),
            Instr::Return(t(0).into()),
        ];
        let cfg = build_cfg(ScopeId(0), &instrs).unwrap();
        let lin = linearize(&cfg).unwrap();
        let div_pc = lin
            .instrs
            .iter()
            .position(|i| matches!(i, Instr::BinOp { .. }))
            .unwrap();
        let rescue_pc = lin.rescue_pcs[div_pc].unwrap();
        assert!(matches!(
            lin.instrs[rescue_pc],
            Instr::ReceiveException { .. }
        ));
        let ret_pc = lin
            .instrs
            .iter()
            .position(|i| matches!(i, Instr::Return(_)))
            .unwrap();
        assert_eq!(lin.rescue_pcs[ret_pc], None);
    }
}
