//! Runtime: method table, natives, pass pipeline and dispatch engine

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::PassError;
use crate::interp::{
    ArgumentBinder, ExceptionKind, NativeRegistry, PositionalBinder, Raise, ThreadContext, Value,
};
use crate::ir::IrScope;
use crate::passes::PassPipeline;
use crate::tiered::{CompilerBackend, ThreadedBackend, TieredEngine, TieredMethod};

/// Everything shared by the threads executing one program
pub struct Runtime {
    config: EngineConfig,
    pipeline: PassPipeline,
    engine: TieredEngine,
    methods: DashMap<Arc<str>, Arc<TieredMethod>>,
    natives: NativeRegistry,
    binder: Arc<dyn ArgumentBinder>,
}

impl Runtime {
    /// Runtime compiling with the threaded backend
    pub fn new(config: EngineConfig) -> Arc<Self> {
        Self::with_backend(config, Arc::new(ThreadedBackend))
    }

    /// Runtime compiling with `backend`
    pub fn with_backend(config: EngineConfig, backend: Arc<dyn CompilerBackend>) -> Arc<Self> {
        Self::with_binder(config, backend, Arc::new(PositionalBinder))
    }

    /// Runtime with a custom argument binder
    pub fn with_binder(
        config: EngineConfig,
        backend: Arc<dyn CompilerBackend>,
        binder: Arc<dyn ArgumentBinder>,
    ) -> Arc<Self> {
        Arc::new(Runtime {
            pipeline: PassPipeline::standard(config.passes.clone()),
            engine: TieredEngine::new(config.dispatch.clone(), backend),
            methods: DashMap::new(),
            natives: NativeRegistry::standard(),
            binder,
            config,
        })
    }

    /// Engine settings
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Pass pipeline used by `define_method`
    pub fn pipeline(&self) -> &PassPipeline {
        &self.pipeline
    }

    /// Dispatch engine
    pub fn engine(&self) -> &TieredEngine {
        &self.engine
    }

    /// Native functions
    pub fn natives(&self) -> &NativeRegistry {
        &self.natives
    }

    /// Argument binder
    pub fn binder(&self) -> &dyn ArgumentBinder {
        self.binder.as_ref()
    }

    /// Fresh per-thread context
    pub fn new_context(self: &Arc<Self>) -> ThreadContext {
        ThreadContext::new(Arc::clone(self))
    }

    /// Optimize `scope` and register it under its name, replacing any
    /// method of the same name
    pub fn define_method(&self, mut scope: IrScope) -> Result<Arc<TieredMethod>, PassError> {
        let snapshot = self.pipeline.prepare(&mut scope)?;
        let name = Arc::clone(scope.name());
        let method = Arc::new(TieredMethod::new(scope, snapshot));
        method.scope().lock().set_owner(Arc::downgrade(&method));
        debug!(method = %name, instrs = method.snapshot().total_len(), "method defined");
        self.methods.insert(name, Arc::clone(&method));
        Ok(method)
    }

    /// Look up a method
    pub fn method(&self, name: &str) -> Option<Arc<TieredMethod>> {
        self.methods.get(name).map(|m| Arc::clone(m.value()))
    }

    /// Call a method by name
    pub fn call(
        &self,
        ctx: &mut ThreadContext,
        name: &str,
        args: &[Value],
        block: Option<&Value>,
    ) -> Result<Value, Raise> {
        let method = self.method(name).ok_or_else(|| {
            Raise::new(
                ExceptionKind::NoMethodError,
                format!("undefined method '{}'", name),
            )
        })?;
        self.engine.invoke(ctx, &method, args, block)
    }
}
