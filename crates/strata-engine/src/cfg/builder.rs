//! CFG construction from a scope's flat instruction list
//!
//! Splits instructions into basic blocks at labels, block-ending instructions
//! and exception region markers, connects them with typed edges, then cleans
//! the graph up: orphaned blocks are deleted and straight-line block pairs are
//! merged.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::block::BlockId;
use super::graph::{Cfg, EdgeKind};
use crate::error::IrError;
use crate::ir::{Instr, Label, Operand, ScopeId};

/// Builds a [`Cfg`] for one scope
pub struct CfgBuilder {
    scope: ScopeId,
    cfg: Cfg,
    current: BlockId,
    /// Rescue labels of the open exception regions, innermost last
    regions: Vec<Label>,
    /// Innermost rescue label in force when each block was created
    block_regions: FxHashMap<BlockId, Label>,
    /// Jumps and branches awaiting their label
    pending: Vec<(BlockId, Label)>,
    /// Blocks that carry a label taken from the IR
    named: FxHashSet<BlockId>,
}

impl CfgBuilder {
    /// Create a builder for the given scope
    pub fn new(scope: ScopeId) -> Self {
        let cfg = Cfg::new(scope);
        let entry = cfg.entry();
        CfgBuilder {
            scope,
            cfg,
            current: entry,
            regions: Vec::new(),
            block_regions: FxHashMap::default(),
            pending: Vec::new(),
            named: FxHashSet::default(),
        }
    }

    /// Build the graph for `instrs`
    pub fn build(mut self, instrs: &[Instr]) -> Result<Cfg, IrError> {
        // Step 1: Partition into blocks and record control transfers
        self.start_block(None);
        for instr in instrs {
            match instr {
                Instr::Label(label) => self.place_label(label)?,
                Instr::ExceptionRegionStart { rescue } => {
                    self.regions.push(rescue.clone());
                    self.start_block(None);
                }
                Instr::ExceptionRegionEnd => {
                    if self.regions.pop().is_none() {
                        return Err(IrError::UnbalancedExceptionRegion { scope: self.scope });
                    }
                    self.start_block(None);
                }
                _ => self.append(instr.clone()),
            }
        }
        if !self.regions.is_empty() {
            return Err(IrError::UnbalancedExceptionRegion { scope: self.scope });
        }
        self.finish_last_block();

        // Step 2: Resolve jump and branch targets
        for (from, label) in std::mem::take(&mut self.pending) {
            let to = self
                .cfg
                .block_for_label(&label)
                .ok_or(IrError::UnresolvedLabel {
                    scope: self.scope,
                    label,
                })?;
            self.cfg.add_edge(from, to, EdgeKind::Regular);
        }

        // Step 3: Rescuer map and exception edges
        let mut regions: Vec<_> = std::mem::take(&mut self.block_regions).into_iter().collect();
        regions.sort_by_key(|(b, _)| *b);
        for (block, label) in regions {
            let rescuer = self
                .cfg
                .block_for_label(&label)
                .ok_or(IrError::MissingRescueBlock {
                    scope: self.scope,
                    label,
                })?;
            self.cfg.set_rescuer(block, rescuer);
            if self.cfg.block(block).is_some_and(|b| b.can_raise()) {
                self.cfg.add_edge(block, rescuer, EdgeKind::Exception);
            }
        }

        // Step 4: Clean up
        let mut cfg = self.cfg;
        let removed = remove_orphans(&mut cfg);
        let merged = collapse_straight_line(&mut cfg);
        debug!(
            scope = %cfg.scope(),
            blocks = cfg.block_count(),
            removed,
            merged,
            "built CFG"
        );
        Ok(cfg)
    }

    fn start_block(&mut self, label: Option<Label>) -> BlockId {
        let named = label.is_some();
        let prev = self.current;
        let id = self.cfg.add_block(label);
        if self.cfg.block(prev).is_some_and(|b| b.falls_through()) {
            self.cfg.add_edge(prev, id, EdgeKind::FallThrough);
        }
        if let Some(rescue) = self.regions.last() {
            self.block_regions.insert(id, rescue.clone());
        }
        if named {
            self.named.insert(id);
        }
        self.current = id;
        id
    }

    fn place_label(&mut self, label: &Label) -> Result<(), IrError> {
        if self.cfg.block_for_label(label).is_some() {
            return Err(IrError::DuplicateLabel {
                scope: self.scope,
                label: label.clone(),
            });
        }
        let current = self.current;
        let reusable = current != self.cfg.entry()
            && !self.named.contains(&current)
            && self.cfg.block(current).is_some_and(|b| b.is_empty());
        if reusable {
            self.cfg.relabel(current, label.clone());
            self.named.insert(current);
        } else {
            self.start_block(Some(label.clone()));
        }
        Ok(())
    }

    fn append(&mut self, instr: Instr) {
        let current = self.current;
        let ends_block = instr.ends_block();
        let target = instr.jump_target().cloned();
        let exits = instr.exits_scope();
        if let Some(block) = self.cfg.block_mut(current) {
            block.instrs_mut().push(instr);
        }
        if let Some(label) = target {
            self.pending.push((current, label));
        }
        if exits {
            let exit = self.cfg.exit();
            self.cfg.add_edge(current, exit, EdgeKind::Exit);
        }
        if ends_block {
            self.start_block(None);
        }
    }

    fn finish_last_block(&mut self) {
        let current = self.current;
        let unreachable_tail = self.cfg.predecessors(current).is_empty()
            && self.cfg.block(current).is_some_and(|b| b.is_empty());
        if !unreachable_tail && self.cfg.block(current).is_some_and(|b| b.falls_through()) {
            self.append(Instr::Return(Operand::Nil));
        }
    }
}

/// Delete blocks nothing transfers to, repeatedly; returns how many went
fn remove_orphans(cfg: &mut Cfg) -> usize {
    let mut removed = 0;
    loop {
        let orphans: Vec<BlockId> = cfg
            .block_ids()
            .filter(|&b| b != cfg.entry() && b != cfg.exit())
            .filter(|&b| cfg.predecessors(b).is_empty())
            .collect();
        if orphans.is_empty() {
            return removed;
        }
        for b in orphans {
            cfg.remove_block(b);
            removed += 1;
        }
    }
}

/// Merge `a -> b` when it is the only way out of `a` and the only way into
/// `b`; returns the number of merges
fn collapse_straight_line(cfg: &mut Cfg) -> usize {
    let mut merged = 0;
    loop {
        let candidate = cfg.block_ids().find_map(|a| {
            mergeable_successor(cfg, a).map(|b| (a, b))
        });
        let Some((a, b)) = candidate else {
            return merged;
        };
        merge_blocks(cfg, a, b);
        merged += 1;
    }
}

fn mergeable_successor(cfg: &Cfg, a: BlockId) -> Option<BlockId> {
    if a == cfg.entry() || a == cfg.exit() {
        return None;
    }
    let [(b, kind)] = cfg.successors(a) else {
        return None;
    };
    let b = *b;
    if !matches!(kind, EdgeKind::Regular | EdgeKind::FallThrough) {
        return None;
    }
    if b == a || b == cfg.entry() || b == cfg.exit() || cfg.predecessors(b).len() != 1 {
        return None;
    }
    let (block_a, block_b) = (cfg.block(a)?, cfg.block(b)?);
    if matches!(block_a.last(), Some(Instr::Branch { .. })) {
        return None;
    }
    let same_region = cfg.rescuer_of(a) == cfg.rescuer_of(b);
    if !same_region && !block_a.is_empty() && !block_b.is_empty() {
        return None;
    }
    // A rescue block keeps its identity so its rescuer entries stay valid
    if cfg.rescuers().values().any(|r| *r == b) {
        return None;
    }
    Some(b)
}

fn merge_blocks(cfg: &mut Cfg, a: BlockId, b: BlockId) {
    let tail = match cfg.block(b) {
        Some(block) => block.instrs().to_vec(),
        None => return,
    };
    let a_empty = cfg.block(a).is_some_and(|blk| blk.is_empty());
    if a_empty {
        match cfg.rescuer_of(b) {
            Some(r) => cfg.set_rescuer(a, r),
            None => cfg.clear_rescuer(a),
        }
    }
    if let Some(block) = cfg.block_mut(a) {
        let instrs = block.instrs_mut();
        if matches!(instrs.last(), Some(Instr::Jump(_))) {
            instrs.pop();
        }
        instrs.extend(tail);
    }
    cfg.remove_edge(a, b);
    cfg.move_successors(b, a);
    cfg.remove_block(b);
}

/// Build the CFG for a scope's flat instruction list
pub fn build_cfg(scope: ScopeId, instrs: &[Instr]) -> Result<Cfg, IrError> {
    CfgBuilder::new(scope).build(instrs)
}
