//! IR scopes: methods and closures with their instruction lists, CFG and
//! cached analyses

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use rustc_hash::{FxHashMap, FxHashSet};

use super::instr::Instr;
use super::operand::{LocalVar, TempVar, Variable};
use crate::cfg::Cfg;
use crate::error::IrError;
use crate::passes::{PassKind, PassResult};
use crate::tiered::TieredMethod;

static NEXT_SCOPE_ID: AtomicU32 = AtomicU32::new(1);

/// Process-unique scope identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub(crate) fn fresh() -> Self {
        ScopeId(NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scope#{}", self.0)
    }
}

/// Kind of scope
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Top-level method body
    Method,
    /// Closure nested inside another scope
    Closure,
}

/// Argument arity of a scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Signature {
    /// Arguments that must be supplied
    pub required: u32,
    /// Arguments that may be supplied (default `nil`)
    pub optional: u32,
    /// Pad missing and drop extra arguments instead of raising
    pub lenient: bool,
}

impl Signature {
    /// Strict signature with the given counts
    pub fn new(required: u32, optional: u32) -> Self {
        Signature {
            required,
            optional,
            lenient: false,
        }
    }

    /// Maximum number of accepted arguments
    pub fn max_args(&self) -> u32 {
        self.required + self.optional
    }
}

/// Properties of a scope derived from its IR
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScopeFlags {
    /// The CFG contains a back edge
    pub has_loops: bool,
    /// The scope pushes and pops its own dynamic scope
    pub has_explicit_call_protocol: bool,
    /// Executing the scope requires a heap-allocated dynamic scope
    pub needs_dynamic_scope: bool,
    /// The binding may be captured reflectively; only safe passes run
    pub binding_has_escaped: bool,
    /// The scope reads its block argument
    pub receives_block: bool,
}

/// A binding-backed variable and the temporary that holds its fast copy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingSlot {
    /// Heap location (depth and offset relative to this scope)
    pub local: LocalVar,
    /// Temporary the variable was renamed to
    pub temp: TempVar,
}

/// Result of binding insertion: which variables live in heap slots and how
/// locals were renamed to temporaries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindingLayout {
    /// Binding-backed variables in analysis order
    pub slots: Vec<BindingSlot>,
    /// Every local of the scope and the temporary it became
    pub renames: FxHashMap<Variable, Variable>,
}

/// Per-scope instrumentation
#[derive(Debug, Clone, Default)]
pub struct ScopeStats {
    /// Block visits performed by the dataflow solver on this scope
    pub dataflow_visits: u64,
    /// Number of times each pass actually executed on this scope
    pub pass_runs: FxHashMap<PassKind, u32>,
}

impl ScopeStats {
    /// Executions of `kind` on this scope
    pub fn runs_of(&self, kind: PassKind) -> u32 {
        self.pass_runs.get(&kind).copied().unwrap_or(0)
    }
}

/// A cached pass result, valid for one generation
#[derive(Debug, Clone)]
pub struct CachedResult {
    /// Generation the result was computed for
    pub generation: u64,
    /// The result
    pub result: PassResult,
}

/// A method or closure body with everything the optimizer knows about it
pub struct IrScope {
    id: ScopeId,
    name: Arc<str>,
    kind: ScopeKind,
    nesting_depth: u32,
    instrs: Vec<Instr>,
    cfg: Option<Cfg>,
    generation: u64,
    analyses: FxHashMap<PassKind, CachedResult>,
    closures: Vec<IrScope>,
    locals: Vec<Arc<str>>,
    temp_count: u32,
    signature: Signature,
    flags: ScopeFlags,
    binding_layout: Option<BindingLayout>,
    stats: ScopeStats,
    owner: OnceCell<Weak<TieredMethod>>,
}

impl IrScope {
    /// Assemble a scope from builder output
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        name: Arc<str>,
        kind: ScopeKind,
        instrs: Vec<Instr>,
        closures: Vec<IrScope>,
        locals: Vec<Arc<str>>,
        temp_count: u32,
        signature: Signature,
        binding_has_escaped: bool,
    ) -> Self {
        let mut scope = IrScope {
            id: ScopeId::fresh(),
            name,
            kind,
            nesting_depth: 0,
            instrs,
            cfg: None,
            generation: 0,
            analyses: FxHashMap::default(),
            closures,
            locals,
            temp_count,
            signature,
            flags: ScopeFlags {
                binding_has_escaped,
                ..ScopeFlags::default()
            },
            binding_layout: None,
            stats: ScopeStats::default(),
            owner: OnceCell::new(),
        };
        scope.set_nesting_depth(0);
        scope.compute_flags();
        scope
    }

    fn set_nesting_depth(&mut self, depth: u32) {
        self.nesting_depth = depth;
        for closure in &mut self.closures {
            closure.set_nesting_depth(depth + 1);
        }
    }

    /// Scope identifier
    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// Scope name
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// Method or closure
    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Number of scopes enclosing this one
    pub fn nesting_depth(&self) -> u32 {
        self.nesting_depth
    }

    /// The flat instruction list the scope was built from
    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// The control-flow graph, once built
    pub fn cfg(&self) -> Option<&Cfg> {
        self.cfg.as_ref()
    }

    pub(crate) fn cfg_mut(&mut self) -> Option<&mut Cfg> {
        self.cfg.as_mut()
    }

    pub(crate) fn require_cfg(&self) -> Result<&Cfg, IrError> {
        self.cfg.as_ref().ok_or(IrError::MissingCfg { scope: self.id })
    }

    pub(crate) fn set_cfg(&mut self, cfg: Cfg) {
        self.cfg = Some(cfg);
    }

    /// Current generation; bumped by every structural pass
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn bump_generation(&mut self) {
        self.generation += 1;
    }

    /// Cached result of `kind` if it was computed for the current generation
    pub fn cached(&self, kind: PassKind) -> Option<&PassResult> {
        self.analyses
            .get(&kind)
            .filter(|c| c.generation == self.generation)
            .map(|c| &c.result)
    }

    pub(crate) fn cache(&mut self, kind: PassKind, result: PassResult) {
        let generation = self.generation;
        self.analyses
            .insert(kind, CachedResult { generation, result });
    }

    /// Drop the cached result of `kind`
    pub fn invalidate(&mut self, kind: PassKind) {
        self.analyses.remove(&kind);
    }

    /// Nested closures, indexed by `BuildClosure`
    pub fn closures(&self) -> &[IrScope] {
        &self.closures
    }

    pub(crate) fn closures_mut(&mut self) -> &mut [IrScope] {
        &mut self.closures
    }

    /// Static local table
    pub fn locals(&self) -> &[Arc<str>] {
        &self.locals
    }

    /// Number of temporaries allocated so far
    pub fn temp_count(&self) -> u32 {
        self.temp_count
    }

    /// Allocate a fresh temporary
    pub fn new_temp(&mut self) -> TempVar {
        let t = TempVar(self.temp_count);
        self.temp_count += 1;
        t
    }

    /// Argument arity
    pub fn signature(&self) -> Signature {
        self.signature
    }

    /// Derived scope flags
    pub fn flags(&self) -> ScopeFlags {
        self.flags
    }

    /// Binding layout recorded by binding insertion
    pub fn binding_layout(&self) -> Option<&BindingLayout> {
        self.binding_layout.as_ref()
    }

    pub(crate) fn set_binding_layout(&mut self, layout: BindingLayout) {
        self.binding_layout = Some(layout);
    }

    /// Instrumentation counters
    pub fn stats(&self) -> &ScopeStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut ScopeStats {
        &mut self.stats
    }

    /// Total dataflow block visits on this scope and its closures
    pub fn total_dataflow_visits(&self) -> u64 {
        self.stats.dataflow_visits
            + self
                .closures
                .iter()
                .map(IrScope::total_dataflow_visits)
                .sum::<u64>()
    }

    /// The dispatch record that owns this scope, if it is still alive
    pub fn owner(&self) -> Option<Arc<TieredMethod>> {
        self.owner.get().and_then(Weak::upgrade)
    }

    /// Record the owning dispatch record; returns false if already set
    pub(crate) fn set_owner(&self, owner: Weak<TieredMethod>) -> bool {
        self.owner.set(owner).is_ok()
    }

    /// Visit every instruction: block by block once a CFG exists, otherwise
    /// the flat list
    pub fn for_each_instr(&self, mut f: impl FnMut(&Instr)) {
        match &self.cfg {
            Some(cfg) => {
                for block in cfg.blocks() {
                    block.instrs().iter().for_each(&mut f);
                }
            }
            None => self.instrs.iter().for_each(f),
        }
    }

    /// Locals of a nested scope at `level` closure boundaries below this one
    /// that refer back to this scope
    fn collect_captured(&self, level: u32, out: &mut FxHashSet<LocalVar>) {
        let mut note = |var: &LocalVar| {
            if var.depth == level {
                out.insert(LocalVar::new(var.name.clone(), 0, var.offset));
            }
        };
        self.for_each_instr(|instr| {
            for var in instr.uses().into_iter().chain(instr.def()) {
                if let Variable::Local(l) = var {
                    note(l);
                }
            }
            match instr {
                Instr::LoadBinding { slot, .. } | Instr::StoreBinding { slot, .. } => note(slot),
                _ => {}
            }
        });
        for closure in &self.closures {
            closure.collect_captured(level + 1, out);
        }
    }

    /// Depth-0 locals that some nested closure reads or writes
    pub fn captured_locals(&self) -> FxHashSet<LocalVar> {
        let mut out = FxHashSet::default();
        for closure in &self.closures {
            closure.collect_captured(1, &mut out);
        }
        out
    }

    /// Locals of enclosing scopes referenced directly by this scope, sorted
    pub fn outer_references(&self) -> Vec<LocalVar> {
        let mut seen = FxHashSet::default();
        self.for_each_instr(|instr| {
            for var in instr.uses().into_iter().chain(instr.def()) {
                if let Variable::Local(l) = var {
                    if l.is_outer() {
                        seen.insert(l.clone());
                    }
                }
            }
        });
        let mut refs: Vec<LocalVar> = seen.into_iter().collect();
        refs.sort();
        refs
    }

    /// Recompute the derived flags from the current IR
    pub fn compute_flags(&mut self) {
        let mut touches_heap = false;
        let mut explicit = false;
        let mut receives_block = false;
        self.for_each_instr(|instr| {
            match instr {
                Instr::LoadBinding { .. } | Instr::StoreBinding { .. } => touches_heap = true,
                Instr::PushBinding | Instr::PopBinding => explicit = true,
                Instr::ReceiveBlock { .. } => receives_block = true,
                _ => {}
            }
            if instr
                .uses()
                .into_iter()
                .chain(instr.def())
                .any(|v| v.as_local().is_some())
            {
                touches_heap = true;
            }
        });
        self.flags.has_loops = self.cfg.as_ref().is_some_and(Cfg::has_back_edges);
        self.flags.has_explicit_call_protocol = explicit;
        self.flags.needs_dynamic_scope = touches_heap || !self.closures.is_empty();
        self.flags.receives_block = receives_block;
    }

    /// Structural checks that do not need a CFG: closure indices and the
    /// reach of outer variables
    pub fn validate(&self) -> Result<(), IrError> {
        let mut result = Ok(());
        self.for_each_instr(|instr| {
            if result.is_err() {
                return;
            }
            if let Instr::BuildClosure { closure, .. } = instr {
                if *closure as usize >= self.closures.len() {
                    result = Err(IrError::UnknownClosure {
                        scope: self.id,
                        index: *closure,
                        count: self.closures.len(),
                    });
                    return;
                }
            }
            let slot = match instr {
                Instr::LoadBinding { slot, .. } | Instr::StoreBinding { slot, .. } => Some(slot),
                _ => None,
            };
            let locals = instr
                .uses()
                .into_iter()
                .chain(instr.def())
                .filter_map(Variable::as_local)
                .chain(slot);
            for var in locals {
                if var.depth > self.nesting_depth {
                    result = Err(IrError::UnboundOuterVariable {
                        scope: self.id,
                        var: var.clone(),
                        nesting: self.nesting_depth,
                    });
                    return;
                }
            }
        });
        result
    }
}

impl fmt::Debug for IrScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IrScope")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("generation", &self.generation)
            .field("instrs", &self.instrs.len())
            .field("closures", &self.closures.len())
            .field("flags", &self.flags)
            .finish()
    }
}
