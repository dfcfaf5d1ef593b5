//! Binding instruction insertion
//!
//! Moves every local of a scope into a temporary. Locals a closure can see
//! keep a heap slot in the dynamic scope; the fast copy is written back
//! with `StoreBinding` wherever the store plan finds it dirty and refreshed
//! with `LoadBinding` wherever the load plan finds it stale.
//!
//! The order matters. Stores are placed from the plan computed over the
//! original locals. Loads are placed only after renaming, by solving load
//! placement over the renamed scope, so that the loads inserted for one
//! variable see the stores already inserted for it.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::{dep, BindingSummary, CompilerPass, PassKind, PassOrder, PassPipeline, PassResult};
use crate::cfg::{BlockId, Cfg};
use crate::dataflow::load_placement::{self, LoadPlan};
use crate::dataflow::store_placement::{self, binding_candidates, BindingVar, StorePlan};
use crate::error::{IrError, PassError};
use crate::ir::{BindingLayout, BindingSlot, Instr, IrScope, LocalVar, Operand, ScopeId, Variable};

/// Rewrites locals into temporaries plus explicit binding traffic
pub struct BindingInsertionPass;

impl CompilerPass for BindingInsertionPass {
    fn kind(&self) -> PassKind {
        PassKind::BindingInsertion
    }

    fn order(&self) -> PassOrder {
        PassOrder::PreOrder
    }

    fn execute(
        &self,
        _pipeline: &PassPipeline,
        scope: &mut IrScope,
        deps: &[PassResult],
    ) -> Result<PassResult, PassError> {
        if scope.flags().binding_has_escaped || scope.binding_layout().is_some() {
            return Ok(PassResult::Bindings(BindingSummary {
                skipped: true,
                ..BindingSummary::default()
            }));
        }
        let stores = dep(
            PassKind::BindingInsertion,
            deps,
            0,
            "store placement",
            PassResult::as_store_plan,
        )?
        .clone();
        let id = scope.id();
        let mut summary = BindingSummary::default();

        // Step 1: a temporary for each binding-backed variable
        let slots: Vec<BindingSlot> = stores
            .vars()
            .iter()
            .map(|v| BindingSlot {
                local: v.slot.clone(),
                temp: scope.new_temp(),
            })
            .collect();
        summary.slots = slots.len();

        // Step 2: write-backs before store points and at rescue boundaries
        summary.stores = insert_stores(cfg_mut(scope, id)?, &stores);

        // Step 3: rename every local
        let mut renames: FxHashMap<Variable, Variable> = stores
            .vars()
            .iter()
            .zip(&slots)
            .map(|(v, s)| (v.var.clone(), Variable::Temp(s.temp)))
            .collect();
        for local in locals_of(scope.require_cfg()?) {
            let var = Variable::Local(local);
            if !renames.contains_key(&var) {
                let temp = scope.new_temp();
                renames.insert(var, Variable::Temp(temp));
            }
        }
        rename(cfg_mut(scope, id)?, &renames);
        summary.renamed = renames.len();
        scope.set_binding_layout(BindingLayout { slots, renames });

        // Step 4: reloads, solved over the renamed scope
        let vars = binding_candidates(scope);
        let cfg = scope.require_cfg()?;
        let dirty = store_placement::compute(cfg, vars.clone())?;
        let loads = load_placement::compute(cfg, vars, &dirty)?;
        let visits = dirty.solution().visits + loads.solution().visits;
        scope.stats_mut().dataflow_visits += visits;
        summary.loads = insert_loads(cfg_mut(scope, id)?, &loads);

        debug!(
            scope = %id,
            slots = summary.slots,
            stores = summary.stores,
            loads = summary.loads,
            renamed = summary.renamed,
            "binding insertion"
        );
        Ok(PassResult::Bindings(summary))
    }
}

fn cfg_mut(scope: &mut IrScope, id: ScopeId) -> Result<&mut Cfg, IrError> {
    scope.cfg_mut().ok_or(IrError::MissingCfg { scope: id })
}

/// Depth-0 and outer locals the graph mentions, in a stable order
fn locals_of(cfg: &Cfg) -> Vec<LocalVar> {
    let mut seen = FxHashSet::default();
    for block in cfg.blocks() {
        for instr in block.instrs() {
            for var in instr.uses().into_iter().chain(instr.def()) {
                if let Variable::Local(l) = var {
                    seen.insert(l.clone());
                }
            }
        }
    }
    let mut locals: Vec<LocalVar> = seen.into_iter().collect();
    locals.sort();
    locals
}

/// Position just before a trailing jump or branch
fn end_position(instrs: &[Instr]) -> usize {
    match instrs.last() {
        Some(Instr::Jump(_) | Instr::Branch { .. }) => instrs.len() - 1,
        _ => instrs.len(),
    }
}

fn store(var: &BindingVar) -> Instr {
    Instr::StoreBinding {
        slot: var.slot.clone(),
        value: Operand::Var(var.var.clone()),
    }
}

fn load(var: &BindingVar) -> Instr {
    Instr::LoadBinding {
        dest: var.var.clone(),
        slot: var.slot.clone(),
    }
}

type Sites = FxHashMap<BlockId, Vec<(usize, Vec<BindingVar>)>>;

/// Insert `make(var)` at every site and at the end of every `tail` block;
/// returns the number of instructions inserted
fn insert_at(
    cfg: &mut Cfg,
    sites: &Sites,
    tails: &FxHashMap<BlockId, Vec<BindingVar>>,
    make: fn(&BindingVar) -> Instr,
) -> usize {
    let mut count = 0;
    let blocks: Vec<BlockId> = cfg.block_ids().collect();
    for block in blocks {
        let (site_list, tail) = (sites.get(&block), tails.get(&block));
        if site_list.is_none() && tail.is_none() {
            continue;
        }
        let Some(bb) = cfg.block_mut(block) else {
            continue;
        };
        let instrs = bb.instrs_mut();
        if let Some(vars) = tail {
            let at = end_position(instrs);
            for var in vars.iter().rev() {
                instrs.insert(at, make(var));
                count += 1;
            }
        }
        // Back to front so earlier indices stay valid
        for (i, vars) in site_list.into_iter().flatten().rev() {
            for var in vars.iter().rev() {
                instrs.insert(*i, make(var));
                count += 1;
            }
        }
    }
    count
}

fn insert_stores(cfg: &mut Cfg, plan: &StorePlan) -> usize {
    insert_at(cfg, &plan.stores, &plan.flushes, store)
}

fn insert_loads(cfg: &mut Cfg, plan: &LoadPlan) -> usize {
    insert_at(cfg, &plan.loads, &plan.reloads, load)
}

fn rename(cfg: &mut Cfg, renames: &FxHashMap<Variable, Variable>) {
    let blocks: Vec<BlockId> = cfg.block_ids().collect();
    for block in blocks {
        if let Some(bb) = cfg.block_mut(block) {
            for instr in bb.instrs_mut() {
                instr.rename_all(renames);
            }
        }
    }
}
