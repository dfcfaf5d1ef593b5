//! Tiered dispatch
//!
//! Every call goes through [`TieredEngine::invoke`]:
//! 1. If a compiled artifact is installed, it runs the call.
//! 2. Otherwise the call is counted and the policy consulted; a promotion
//!    claims the method and compiles it, synchronously or on a worker.
//! 3. The call itself runs interpreted; it never waits for a compile.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, trace, warn};

use super::background::{BackgroundCompiler, CompileRequest};
use super::backend::CompilerBackend;
use super::method::TieredMethod;
use super::policy::CompilationPolicy;
use crate::config::{CompileMode, DispatchConfig};
use crate::interp::{call_scope, Activation, Raise, ThreadContext, Value};

/// Engine-wide promotion counters
#[derive(Debug, Default)]
pub struct EngineStats {
    promotions: AtomicU64,
    installed: AtomicU64,
    failures: AtomicU64,
    rejected: AtomicU64,
    pending: Mutex<u64>,
    drained: Condvar,
}

impl EngineStats {
    /// Methods claimed for compilation
    pub fn promotions(&self) -> u64 {
        self.promotions.load(Ordering::Relaxed)
    }

    /// Compiled artifacts installed
    pub fn installed(&self) -> u64 {
        self.installed.load(Ordering::Relaxed)
    }

    /// Compilations that failed
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Requests the background queue refused
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Requests submitted but not yet processed
    pub fn pending(&self) -> u64 {
        *self.pending.lock()
    }

    pub(crate) fn begin_pending(&self) {
        *self.pending.lock() += 1;
    }

    pub(crate) fn finish_pending(&self) {
        let mut pending = self.pending.lock();
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    /// Block until nothing is pending or `timeout` elapses
    pub(crate) fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut pending = self.pending.lock();
        while *pending > 0 {
            if self.drained.wait_until(&mut pending, deadline).timed_out() {
                return *pending == 0;
            }
        }
        true
    }
}

/// Compile `method` and publish the result
pub(crate) fn compile_and_install(method: &TieredMethod, backend: &dyn CompilerBackend, stats: &EngineStats) {
    match backend.compile(method.snapshot()) {
        Ok(artifact) => {
            if method.install(artifact) {
                stats.installed.fetch_add(1, Ordering::Relaxed);
                info!(method = %method.name(), backend = backend.name(), "installed compiled code");
            }
        }
        Err(err) => {
            method.profile().mark_failed();
            stats.failures.fetch_add(1, Ordering::Relaxed);
            warn!(method = %method.name(), error = %err, "compilation failed; staying interpreted");
        }
    }
}

/// Per-call tier selection and promotion
pub struct TieredEngine {
    config: DispatchConfig,
    policy: CompilationPolicy,
    backend: Arc<dyn CompilerBackend>,
    background: Option<BackgroundCompiler>,
    stats: Arc<EngineStats>,
}

impl TieredEngine {
    /// Create an engine; background workers start here when configured
    pub fn new(config: DispatchConfig, backend: Arc<dyn CompilerBackend>) -> Self {
        let stats = Arc::new(EngineStats::default());
        let background = if config.jit_enabled && config.compile_mode == CompileMode::Background {
            let started = BackgroundCompiler::start(
                config.worker_count(),
                config.queue_capacity,
                Arc::clone(&backend),
                Arc::clone(&stats),
            );
            if started.is_none() {
                warn!("no background compiler threads; compiling synchronously");
            }
            started
        } else {
            None
        };
        TieredEngine {
            policy: CompilationPolicy::from_config(&config),
            config,
            backend,
            background,
            stats,
        }
    }

    /// Dispatch settings
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Promotion thresholds
    pub fn policy(&self) -> &CompilationPolicy {
        &self.policy
    }

    /// The compiler backend
    pub fn backend(&self) -> &Arc<dyn CompilerBackend> {
        &self.backend
    }

    /// Promotion counters
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Whether promotions run on worker threads
    pub fn is_background(&self) -> bool {
        self.background.is_some()
    }

    /// Run one call of `method`
    pub fn invoke(
        &self,
        ctx: &mut ThreadContext,
        method: &Arc<TieredMethod>,
        args: &[Value],
        block: Option<&Value>,
    ) -> Result<Value, Raise> {
        if let Some(code) = method.compiled() {
            method.stats().record_compiled();
            trace!(method = %method.name(), tier = "compiled", "dispatch");
            return code.invoke(ctx, Activation::method(Arc::clone(method)), args, block);
        }

        if self.config.jit_enabled {
            method.profile().record_call();
            if self
                .policy
                .should_compile(method.profile(), method.snapshot().total_len())
            {
                self.promote(method);
            }
        }

        method.stats().record_interpreted();
        trace!(method = %method.name(), tier = "interpreted", "dispatch");
        call_scope(
            ctx,
            method.snapshot().as_ref(),
            Activation::method(Arc::clone(method)),
            args,
            block,
        )
    }

    /// Call with no arguments
    pub fn invoke0(
        &self,
        ctx: &mut ThreadContext,
        method: &Arc<TieredMethod>,
        block: Option<&Value>,
    ) -> Result<Value, Raise> {
        self.invoke(ctx, method, &[], block)
    }

    /// Call with one argument
    pub fn invoke1(
        &self,
        ctx: &mut ThreadContext,
        method: &Arc<TieredMethod>,
        a: Value,
        block: Option<&Value>,
    ) -> Result<Value, Raise> {
        self.invoke(ctx, method, &[a], block)
    }

    /// Call with two arguments
    pub fn invoke2(
        &self,
        ctx: &mut ThreadContext,
        method: &Arc<TieredMethod>,
        a: Value,
        b: Value,
        block: Option<&Value>,
    ) -> Result<Value, Raise> {
        self.invoke(ctx, method, &[a, b], block)
    }

    /// Call with three arguments
    pub fn invoke3(
        &self,
        ctx: &mut ThreadContext,
        method: &Arc<TieredMethod>,
        a: Value,
        b: Value,
        c: Value,
        block: Option<&Value>,
    ) -> Result<Value, Raise> {
        self.invoke(ctx, method, &[a, b, c], block)
    }

    /// Claim `method` and hand it to a compiler
    fn promote(&self, method: &Arc<TieredMethod>) {
        let profile = method.profile();
        if !profile.try_start_promotion() {
            return;
        }
        self.stats.promotions.fetch_add(1, Ordering::Relaxed);
        debug!(
            method = %method.name(),
            calls = profile.calls(),
            loops = profile.loops(),
            "promoting"
        );

        match &self.background {
            Some(background) => {
                self.stats.begin_pending();
                let request = CompileRequest {
                    method: Arc::clone(method),
                };
                if !background.try_submit(request) {
                    self.stats.finish_pending();
                    self.stats.rejected.fetch_add(1, Ordering::Relaxed);
                    profile.revert();
                    warn!(method = %method.name(), "compile queue full; method stays interpreted");
                }
            }
            None => compile_and_install(method, self.backend.as_ref(), &self.stats),
        }
    }

    /// Block until every submitted request has been processed or `timeout`
    /// elapses. Returns whether the queue drained.
    pub fn wait_for_compiles(&self, timeout: Duration) -> bool {
        self.stats.wait_drained(timeout)
    }
}
