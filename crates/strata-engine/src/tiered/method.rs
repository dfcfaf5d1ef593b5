//! Dispatch records
//!
//! A `TieredMethod` owns a method's IR scope, the snapshot the interpreter
//! runs, its profile, and the write-once slot a compiled artifact is
//! published into.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

use super::backend::CompiledArtifact;
use super::profile::{MethodProfile, TierState};
use crate::ir::{IrScope, ScopeSnapshot};

/// Per-method call statistics
#[derive(Debug, Default)]
pub struct MethodStats {
    interpreted_calls: AtomicU64,
    compiled_calls: AtomicU64,
}

impl MethodStats {
    /// Calls executed by the interpreter
    pub fn interpreted_calls(&self) -> u64 {
        self.interpreted_calls.load(Ordering::Relaxed)
    }

    /// Calls executed by compiled code
    pub fn compiled_calls(&self) -> u64 {
        self.compiled_calls.load(Ordering::Relaxed)
    }

    pub(crate) fn record_interpreted(&self) {
        self.interpreted_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_compiled(&self) {
        self.compiled_calls.fetch_add(1, Ordering::Relaxed);
    }
}

/// A method and everything dispatch needs to run it
pub struct TieredMethod {
    name: Arc<str>,
    scope: Mutex<IrScope>,
    interpreted: Arc<ScopeSnapshot>,
    compiled: OnceCell<Arc<dyn CompiledArtifact>>,
    profile: MethodProfile,
    stats: MethodStats,
}

impl TieredMethod {
    /// Wrap a prepared scope and its snapshot
    pub fn new(scope: IrScope, interpreted: Arc<ScopeSnapshot>) -> Self {
        TieredMethod {
            name: Arc::clone(scope.name()),
            scope: Mutex::new(scope),
            interpreted,
            compiled: OnceCell::new(),
            profile: MethodProfile::new(),
            stats: MethodStats::default(),
        }
    }

    /// Method name
    pub fn name(&self) -> &Arc<str> {
        &self.name
    }

    /// The IR scope
    pub fn scope(&self) -> &Mutex<IrScope> {
        &self.scope
    }

    /// Snapshot the interpreter runs and backends compile
    pub fn snapshot(&self) -> &Arc<ScopeSnapshot> {
        &self.interpreted
    }

    /// Installed compiled artifact (acquire)
    pub fn compiled(&self) -> Option<&Arc<dyn CompiledArtifact>> {
        self.compiled.get()
    }

    /// Publish a compiled artifact. Only the first install wins; returns
    /// false if one was already present.
    pub(crate) fn install(&self, artifact: Arc<dyn CompiledArtifact>) -> bool {
        let installed = self.compiled.set(artifact).is_ok();
        if installed {
            self.profile.mark_compiled();
        }
        installed
    }

    /// Profiling counters and tier state
    pub fn profile(&self) -> &MethodProfile {
        &self.profile
    }

    /// Current tier
    pub fn state(&self) -> TierState {
        self.profile.state()
    }

    /// Call statistics
    pub fn stats(&self) -> &MethodStats {
        &self.stats
    }
}

impl fmt::Debug for TieredMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TieredMethod")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("calls", &self.profile.calls())
            .field("compiled", &self.compiled.get().map(|c| c.backend().to_string()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Instr, Operand, ScopeBuilder};
    use crate::passes::PassPipeline;
    use crate::tiered::ThreadedBackend;
    use crate::tiered::CompilerBackend;

    #[test]
    fn test_install_is_write_once() {
        let mut b = ScopeBuilder::method("answer");
        b.emit(Instr::Return(Operand::Int(42)));
        let mut scope = b.finish();
        let snapshot = PassPipeline::default().prepare(&mut scope).unwrap();
        let method = TieredMethod::new(scope, Arc::clone(&snapshot));
        assert!(method.compiled().is_none());

        let first = ThreadedBackend.compile(&snapshot).unwrap();
        let second = ThreadedBackend.compile(&snapshot).unwrap();
        assert!(method.install(Arc::clone(&first)));
        assert!(!method.install(second));
        assert!(Arc::ptr_eq(method.compiled().unwrap(), &first));
        assert_eq!(method.state(), TierState::Compiled);
    }
}
