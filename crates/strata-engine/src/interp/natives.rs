//! Native function registry
//!
//! Natives are Rust closures called by name from `Call` instructions with a
//! `Native` target. The registry is shared by every thread of a runtime.

use std::sync::Arc;

use dashmap::DashMap;

use super::context::ThreadContext;
use super::value::{ExceptionKind, Raise, Value};

/// A native function
pub type NativeFn =
    Arc<dyn Fn(&mut ThreadContext, &[Value], Option<&Value>) -> Result<Value, Raise> + Send + Sync>;

/// Name → native function table
pub struct NativeRegistry {
    functions: DashMap<Arc<str>, NativeFn>,
}

impl NativeRegistry {
    /// Empty registry
    pub fn new() -> Self {
        NativeRegistry {
            functions: DashMap::new(),
        }
    }

    /// Registry with `puts`, `times` and `raise`
    pub fn standard() -> Self {
        let registry = NativeRegistry::new();
        registry.register("puts", |ctx, args, _| {
            for arg in args {
                ctx.print(arg.to_string());
            }
            Ok(Value::Nil)
        });
        registry.register("times", |ctx, args, block| {
            let count = args.first().and_then(Value::as_int).ok_or_else(|| {
                Raise::new(ExceptionKind::TypeError, "times expects an integer count")
            })?;
            if let Some(block) = block {
                for i in 0..count {
                    ctx.call_value(block, &[Value::Int(i)], None)?;
                }
            }
            Ok(Value::Int(count))
        });
        registry.register("raise", |_, args, _| {
            let message = args.first().map(Value::to_string).unwrap_or_default();
            Err(Raise::new(ExceptionKind::RuntimeError, message))
        });
        registry
    }

    /// Add or replace a native
    pub fn register<F>(&self, name: &str, f: F)
    where
        F: Fn(&mut ThreadContext, &[Value], Option<&Value>) -> Result<Value, Raise> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(f));
    }

    /// Look up a native
    pub fn get(&self, name: &str) -> Option<NativeFn> {
        self.functions.get(name).map(|f| Arc::clone(f.value()))
    }

    /// Whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

impl Default for NativeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
