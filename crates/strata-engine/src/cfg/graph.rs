//! The control-flow graph

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};

use super::block::{BasicBlock, BlockId};
use crate::ir::{Label, ScopeId};

/// Kind of control transfer an edge represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// Explicit jump or taken branch
    Regular,
    /// Control continues into the next block
    FallThrough,
    /// A raise inside the block transfers to its rescuer
    Exception,
    /// Control leaves the scope
    Exit,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeKind::Regular => write!(f, "regular"),
            EdgeKind::FallThrough => write!(f, "fall-through"),
            EdgeKind::Exception => write!(f, "exception"),
            EdgeKind::Exit => write!(f, "exit"),
        }
    }
}

/// Control-flow graph of one scope.
///
/// Blocks are addressed by [`BlockId`]; removed blocks leave a hole so ids
/// stay stable. Entry and exit are dummy blocks that are never removed or
/// merged.
#[derive(Debug, Clone)]
pub struct Cfg {
    scope: ScopeId,
    blocks: Vec<Option<BasicBlock>>,
    succs: Vec<Vec<(BlockId, EdgeKind)>>,
    preds: Vec<Vec<(BlockId, EdgeKind)>>,
    entry: BlockId,
    exit: BlockId,
    rescuers: FxHashMap<BlockId, BlockId>,
    labels: FxHashMap<Label, BlockId>,
}

impl Cfg {
    /// Graph with just the dummy entry and exit blocks
    pub(crate) fn new(scope: ScopeId) -> Self {
        let mut cfg = Cfg {
            scope,
            blocks: Vec::new(),
            succs: Vec::new(),
            preds: Vec::new(),
            entry: BlockId(0),
            exit: BlockId(0),
            rescuers: FxHashMap::default(),
            labels: FxHashMap::default(),
        };
        cfg.entry = cfg.add_block(None);
        cfg.exit = cfg.add_block(None);
        cfg
    }

    /// Scope this graph belongs to
    pub fn scope(&self) -> ScopeId {
        self.scope
    }

    /// Dummy entry block
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    /// Dummy exit block
    pub fn exit(&self) -> BlockId {
        self.exit
    }

    /// Upper bound on block ids, for sizing per-block tables
    pub fn capacity(&self) -> usize {
        self.blocks.len()
    }

    /// Number of live blocks, including entry and exit
    pub fn block_count(&self) -> usize {
        self.blocks.iter().filter(|b| b.is_some()).count()
    }

    /// Live blocks in id order
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().flatten()
    }

    /// Live block ids in id order
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.blocks().map(|b| b.id)
    }

    /// Whether `id` names a live block
    pub fn contains(&self, id: BlockId) -> bool {
        self.block(id).is_some()
    }

    /// Look up a block
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.get(id.index()).and_then(Option::as_ref)
    }

    /// Look up a block mutably
    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Outgoing edges
    pub fn successors(&self, id: BlockId) -> &[(BlockId, EdgeKind)] {
        self.succs.get(id.index()).map_or(&[], Vec::as_slice)
    }

    /// Incoming edges
    pub fn predecessors(&self, id: BlockId) -> &[(BlockId, EdgeKind)] {
        self.preds.get(id.index()).map_or(&[], Vec::as_slice)
    }

    /// The fall-through successor, if the block has one
    pub fn fall_through_successor(&self, id: BlockId) -> Option<BlockId> {
        self.successors(id)
            .iter()
            .find(|(_, kind)| *kind == EdgeKind::FallThrough)
            .map(|(to, _)| *to)
    }

    /// Block raises in `id` transfer to, if `id` is protected
    pub fn rescuer_of(&self, id: BlockId) -> Option<BlockId> {
        self.rescuers.get(&id).copied()
    }

    /// The rescuer map, protected block to rescue block
    pub fn rescuers(&self) -> &FxHashMap<BlockId, BlockId> {
        &self.rescuers
    }

    /// Whether some raise in the scope lands in `id`
    pub fn is_rescue_block(&self, id: BlockId) -> bool {
        self.predecessors(id)
            .iter()
            .any(|(_, kind)| *kind == EdgeKind::Exception)
    }

    /// Block a label starts
    pub fn block_for_label(&self, label: &Label) -> Option<BlockId> {
        self.labels.get(label).copied()
    }

    pub(crate) fn add_block(&mut self, label: Option<Label>) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        let label = label.unwrap_or_else(|| Label::synthetic(id.0));
        self.labels.insert(label.clone(), id);
        self.blocks.push(Some(BasicBlock::new(id, label)));
        self.succs.push(Vec::new());
        self.preds.push(Vec::new());
        id
    }

    /// Give a block a new label, dropping its old one
    pub(crate) fn relabel(&mut self, id: BlockId, label: Label) {
        if let Some(block) = self.blocks.get_mut(id.index()).and_then(Option::as_mut) {
            self.labels.remove(&block.label);
            block.label = label.clone();
            self.labels.insert(label, id);
        }
    }

    /// Add an edge unless the same pair is already connected
    pub(crate) fn add_edge(&mut self, from: BlockId, to: BlockId, kind: EdgeKind) {
        if self.succs[from.index()].iter().any(|(t, _)| *t == to) {
            return;
        }
        self.succs[from.index()].push((to, kind));
        self.preds[to.index()].push((from, kind));
    }

    pub(crate) fn remove_edge(&mut self, from: BlockId, to: BlockId) {
        self.succs[from.index()].retain(|(t, _)| *t != to);
        self.preds[to.index()].retain(|(f, _)| *f != from);
    }

    pub(crate) fn set_rescuer(&mut self, block: BlockId, rescuer: BlockId) {
        self.rescuers.insert(block, rescuer);
    }

    pub(crate) fn clear_rescuer(&mut self, block: BlockId) {
        self.rescuers.remove(&block);
    }

    /// Delete a block with all its edges and rescuer entries
    pub(crate) fn remove_block(&mut self, id: BlockId) {
        for (to, _) in std::mem::take(&mut self.succs[id.index()]) {
            self.preds[to.index()].retain(|(f, _)| *f != id);
        }
        for (from, _) in std::mem::take(&mut self.preds[id.index()]) {
            self.succs[from.index()].retain(|(t, _)| *t != id);
        }
        self.rescuers.remove(&id);
        self.rescuers.retain(|_, rescuer| *rescuer != id);
        if let Some(block) = self.blocks[id.index()].take() {
            self.labels.remove(&block.label);
        }
    }

    /// Move every outgoing edge of `from` to start at `to` instead
    pub(crate) fn move_successors(&mut self, from: BlockId, to: BlockId) {
        for (succ, kind) in std::mem::take(&mut self.succs[from.index()]) {
            self.preds[succ.index()].retain(|(f, _)| *f != from);
            self.add_edge(to, succ, kind);
        }
    }

    /// Depth-first post-order from the entry; blocks unreachable from the entry
    /// follow, each unreached region in id order
    pub fn post_order(&self) -> Vec<BlockId> {
        let mut visited = FxHashSet::default();
        let mut order = Vec::with_capacity(self.blocks.len());
        let roots = std::iter::once(self.entry).chain(self.block_ids());
        for root in roots {
            if visited.contains(&root) {
                continue;
            }
            visited.insert(root);
            let mut stack = vec![(root, 0usize)];
            while let Some((block, next)) = stack.pop() {
                let succs = self.successors(block);
                if next < succs.len() {
                    stack.push((block, next + 1));
                    let (succ, _) = succs[next];
                    if visited.insert(succ) {
                        stack.push((succ, 0));
                    }
                } else {
                    order.push(block);
                }
            }
        }
        order
    }

    /// Reverse of [`Cfg::post_order`]
    pub fn reverse_post_order(&self) -> Vec<BlockId> {
        let mut order = self.post_order();
        order.reverse();
        order
    }

    /// Whether some edge closes a cycle (targets a block still on the DFS stack)
    pub fn has_back_edges(&self) -> bool {
        let mut state: FxHashMap<BlockId, bool> = FxHashMap::default();
        let roots = std::iter::once(self.entry).chain(self.block_ids());
        for root in roots {
            if state.contains_key(&root) {
                continue;
            }
            state.insert(root, true);
            let mut stack = vec![(root, 0usize)];
            while let Some((block, next)) = stack.pop() {
                let succs = self.successors(block);
                if next < succs.len() {
                    stack.push((block, next + 1));
                    let (succ, _) = succs[next];
                    match state.get(&succ) {
                        Some(true) => return true,
                        Some(false) => {}
                        None => {
                            state.insert(succ, true);
                            stack.push((succ, 0));
                        }
                    }
                } else {
                    state.insert(block, false);
                }
            }
        }
        false
    }

    /// Render blocks, edges and the rescuer map
    pub fn dump(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for block in self.blocks() {
            write!(f, "{}", block)?;
            let succs = self.successors(block.id);
            if !succs.is_empty() {
                write!(f, "    ; succs:")?;
                for (to, kind) in succs {
                    write!(f, " {}({})", to, kind)?;
                }
                writeln!(f)?;
            }
        }
        let mut rescued: Vec<_> = self.rescuers.iter().collect();
        rescued.sort();
        for (block, rescuer) in rescued {
            writeln!(f, "  ; rescue {} -> {}", block, rescuer)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(n: usize) -> Cfg {
        let mut cfg = Cfg::new(ScopeId(0));
        let mut prev = cfg.entry();
        for _ in 0..n {
            let b = cfg.add_block(None);
            cfg.add_edge(prev, b, EdgeKind::FallThrough);
            prev = b;
        }
        let exit = cfg.exit();
        cfg.add_edge(prev, exit, EdgeKind::Exit);
        cfg
    }

    #[test]
    fn test_post_order_chain() {
        let cfg = chain(2);
        let po = cfg.post_order();
        assert_eq!(po, vec![BlockId(1), BlockId(3), BlockId(2), BlockId(0)]);
        assert_eq!(cfg.reverse_post_order()[0], cfg.entry());
        assert!(!cfg.has_back_edges());
    }

    #[test]
    fn test_back_edge_detection() {
        let mut cfg = chain(2);
        cfg.add_edge(BlockId(3), BlockId(2), EdgeKind::Regular);
        assert!(cfg.has_back_edges());
    }

    #[test]
    fn test_duplicate_edges_ignored() {
        let mut cfg = chain(1);
        cfg.add_edge(BlockId(0), BlockId(2), EdgeKind::Regular);
        assert_eq!(cfg.successors(BlockId(0)).len(), 1);
    }

    #[test]
    fn test_remove_block_cleans_rescuers() {
        let mut cfg = chain(2);
        let rescue = cfg.add_block(Some(Label::new("R")));
        cfg.set_rescuer(BlockId(2), rescue);
        cfg.add_edge(BlockId(2), rescue, EdgeKind::Exception);
        assert!(cfg.is_rescue_block(rescue));
        cfg.remove_block(rescue);
        assert_eq!(cfg.rescuer_of(BlockId(2)), None);
        assert_eq!(cfg.block_for_label(&Label::new("R")), None);
        assert_eq!(cfg.successors(BlockId(2)).len(), 1);
    }
}
