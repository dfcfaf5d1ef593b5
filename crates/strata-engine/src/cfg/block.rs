//! Basic blocks

use std::fmt;
use std::sync::Arc;

use crate::ir::{Instr, Label};

/// Unique identifier for a basic block within one CFG
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    /// Index into per-block tables
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A straight-line run of instructions.
///
/// The instruction list is shared copy-on-write so cloning a CFG for a
/// snapshot or a test comparison does not copy instructions.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    /// Block identifier
    pub id: BlockId,
    /// Label control transfers to; synthetic if the IR had none
    pub label: Label,
    instrs: Arc<Vec<Instr>>,
}

impl BasicBlock {
    /// Create an empty block
    pub fn new(id: BlockId, label: Label) -> Self {
        BasicBlock {
            id,
            label,
            instrs: Arc::new(Vec::new()),
        }
    }

    /// Instructions in execution order
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// Mutable instruction list; copies it first if it is shared
    pub fn instrs_mut(&mut self) -> &mut Vec<Instr> {
        Arc::make_mut(&mut self.instrs)
    }

    /// Replace the instruction list wholesale
    pub fn set_instrs(&mut self, instrs: Vec<Instr>) {
        self.instrs = Arc::new(instrs);
    }

    /// Whether the block holds no instructions
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// Last instruction, if any
    pub fn last(&self) -> Option<&Instr> {
        self.instrs.last()
    }

    /// Whether any instruction in the block can raise
    pub fn can_raise(&self) -> bool {
        self.instrs.iter().any(Instr::can_raise)
    }

    /// Whether control can continue to the textually next block
    pub fn falls_through(&self) -> bool {
        !self.last().is_some_and(Instr::is_unconditional_exit)
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "  {} ({}):", self.id, self.label)?;
        for instr in self.instrs.iter() {
            writeln!(f, "    {}", instr)?;
        }
        Ok(())
    }
}
