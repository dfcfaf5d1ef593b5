//! Immutable linearized scopes
//!
//! A snapshot is what executes: the interpreter walks it and backends compile
//! it. It never changes after creation, so it can be shared freely across
//! threads.

use std::sync::Arc;

use super::instr::Instr;
use super::scope::{ScopeFlags, ScopeId, ScopeKind, Signature};

/// A linearized scope, stamped with the generation it was produced from
#[derive(Debug, Clone)]
pub struct ScopeSnapshot {
    /// Scope the snapshot was produced from
    pub scope_id: ScopeId,
    /// Scope name
    pub name: Arc<str>,
    /// Method or closure
    pub kind: ScopeKind,
    /// Scope generation at linearization time
    pub generation: u64,
    /// Linear instruction array
    pub instrs: Vec<Instr>,
    /// Resolved target PC of each jump or branch
    pub jump_targets: Vec<Option<usize>>,
    /// Rescue PC for a raise at each instruction
    pub rescue_pcs: Vec<Option<usize>>,
    /// Size of the temporary array
    pub temp_count: usize,
    /// Size of the dynamic scope
    pub local_count: usize,
    /// Argument arity
    pub signature: Signature,
    /// Scope flags at linearization time
    pub flags: ScopeFlags,
    /// Snapshots of nested closures, indexed by `BuildClosure`
    pub closures: Vec<Arc<ScopeSnapshot>>,
}

impl ScopeSnapshot {
    /// Number of instructions
    pub fn len(&self) -> usize {
        self.instrs.len()
    }

    /// Whether there are no instructions
    pub fn is_empty(&self) -> bool {
        self.instrs.is_empty()
    }

    /// The call protocol must allocate a dynamic scope for this snapshot
    pub fn needs_implicit_scope(&self) -> bool {
        self.flags.needs_dynamic_scope && !self.flags.has_explicit_call_protocol
    }

    /// Whether the jump at `pc` goes backwards
    pub fn is_back_edge(&self, pc: usize) -> bool {
        self.jump_targets
            .get(pc)
            .copied()
            .flatten()
            .is_some_and(|target| target <= pc)
    }

    /// Instructions in this snapshot and all nested closures
    pub fn total_len(&self) -> usize {
        self.len() + self.closures.iter().map(|c| c.total_len()).sum::<usize>()
    }
}
