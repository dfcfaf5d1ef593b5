//! Pass registry
//!
//! Maps each [`PassKind`] to its implementation. The dependency graph is
//! checked whenever a pass is defined, so the pipeline never meets a cycle
//! or a missing dependency at run time.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};

use super::analyses::{LivenessPass, LoadPlacementPass, StorePlacementPass};
use super::binding::BindingInsertionPass;
use super::build_cfg::BuildCfgPass;
use super::dce::DeadCodeEliminationPass;
use super::linearize::LinearizePass;
use super::{CompilerPass, PassKind};
use crate::error::PassError;

/// Pass implementations by kind
pub struct PassRegistry {
    passes: FxHashMap<PassKind, Arc<dyn CompilerPass>>,
}

impl PassRegistry {
    /// Empty registry
    pub fn new() -> Self {
        PassRegistry {
            passes: FxHashMap::default(),
        }
    }

    /// Registry with every built-in pass
    pub fn standard() -> Self {
        let passes: [Arc<dyn CompilerPass>; 7] = [
            Arc::new(BuildCfgPass),
            Arc::new(LivenessPass),
            Arc::new(DeadCodeEliminationPass),
            Arc::new(StorePlacementPass),
            Arc::new(LoadPlacementPass),
            Arc::new(BindingInsertionPass),
            Arc::new(LinearizePass),
        ];
        PassRegistry {
            passes: passes.into_iter().map(|p| (p.kind(), p)).collect(),
        }
    }

    /// Register `pass`, replacing any previous implementation of its kind.
    ///
    /// The registry is left unchanged if the new pass would make the
    /// dependency graph invalid.
    pub fn define_pass(&mut self, pass: Arc<dyn CompilerPass>) -> Result<(), PassError> {
        let kind = pass.kind();
        let previous = self.passes.insert(kind, pass);
        if let Err(e) = self.validate() {
            match previous {
                Some(p) => self.passes.insert(kind, p),
                None => self.passes.remove(&kind),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Implementation of `kind`
    pub fn get(&self, kind: PassKind) -> Result<&Arc<dyn CompilerPass>, PassError> {
        self.passes.get(&kind).ok_or(PassError::UnregisteredPass(kind))
    }

    /// Whether `kind` is registered
    pub fn contains(&self, kind: PassKind) -> bool {
        self.passes.contains_key(&kind)
    }

    /// Check that every dependency is registered and the graph is acyclic
    pub fn validate(&self) -> Result<(), PassError> {
        let mut done = FxHashSet::default();
        let mut kinds: Vec<PassKind> = self.passes.keys().copied().collect();
        kinds.sort();
        for kind in kinds {
            let mut on_stack = FxHashSet::default();
            self.visit(kind, &mut on_stack, &mut done)?;
        }
        Ok(())
    }

    fn visit(
        &self,
        kind: PassKind,
        on_stack: &mut FxHashSet<PassKind>,
        done: &mut FxHashSet<PassKind>,
    ) -> Result<(), PassError> {
        if done.contains(&kind) {
            return Ok(());
        }
        if !on_stack.insert(kind) {
            return Err(PassError::DependencyCycle(kind));
        }
        let pass = self.get(kind)?;
        for &dep in pass.dependencies() {
            self.visit(dep, on_stack, done)?;
        }
        on_stack.remove(&kind);
        done.insert(kind);
        Ok(())
    }
}

impl Default for PassRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
