//! Per-thread execution state and the call protocol
//!
//! Both tiers enter a scope through [`call_scope`]: it checks the call
//! depth, pushes a frame, binds arguments, allocates the dynamic scope the
//! snapshot needs, runs the body, and unwinds frame and scopes on every exit
//! path.

use std::sync::Arc;

use tracing::trace;

use super::scope::DynamicScope;
use super::value::{ExceptionKind, Raise, Value};
use super::ScopeCode;
use crate::ir::ScopeId;
use crate::runtime::Runtime;
use crate::tiered::TieredMethod;

/// One activation record
pub struct Frame {
    /// Name of the executing scope
    pub name: Arc<str>,
    /// Identity of the executing scope
    pub scope_id: ScopeId,
    parent: Option<Arc<DynamicScope>>,
    scope_base: usize,
    local_count: usize,
    method: Option<Arc<TieredMethod>>,
}

impl Frame {
    /// The dispatch record being executed, if this frame runs a method
    pub fn method(&self) -> Option<&Arc<TieredMethod>> {
        self.method.as_ref()
    }
}

/// How a scope is being entered
#[derive(Default)]
pub struct Activation {
    /// Scope the callee's own dynamic scope hangs off (closures only)
    pub parent: Option<Arc<DynamicScope>>,
    /// Dispatch record whose loop counter backward jumps feed
    pub method: Option<Arc<TieredMethod>>,
}

impl Activation {
    /// Entering a method
    pub fn method(method: Arc<TieredMethod>) -> Self {
        Activation {
            parent: None,
            method: Some(method),
        }
    }

    /// Entering a closure created over `captured`
    pub fn closure(captured: Option<Arc<DynamicScope>>) -> Self {
        Activation {
            parent: captured,
            method: None,
        }
    }
}

/// Execution state of one thread
pub struct ThreadContext {
    runtime: Arc<Runtime>,
    frames: Vec<Frame>,
    scopes: Vec<Arc<DynamicScope>>,
    output: Vec<String>,
}

impl ThreadContext {
    /// Fresh context with no frames
    pub fn new(runtime: Arc<Runtime>) -> Self {
        ThreadContext {
            runtime,
            frames: Vec::new(),
            scopes: Vec::new(),
            output: Vec::new(),
        }
    }

    /// The runtime this thread executes in
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Current call depth
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Active frames, outermost first
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Names of the active frames, innermost first
    pub fn backtrace(&self) -> Vec<Arc<str>> {
        self.frames.iter().rev().map(|f| Arc::clone(&f.name)).collect()
    }

    /// Number of live dynamic scopes
    pub fn scope_depth(&self) -> usize {
        self.scopes.len()
    }

    /// Lines written by `puts`
    pub fn output(&self) -> &[String] {
        &self.output
    }

    /// Take the recorded output
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    /// Record a line of output
    pub fn print(&mut self, line: impl Into<String>) {
        self.output.push(line.into());
    }

    /// Innermost frame
    pub fn frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// The current frame's dynamic scope
    pub(crate) fn current_scope(&self) -> Option<&Arc<DynamicScope>> {
        let base = self.frames.last().map_or(0, |f| f.scope_base);
        self.scopes.get(base..).and_then(<[_]>::last)
    }

    /// Dynamic scope of the current frame, or a runtime error
    pub(crate) fn require_scope(&self) -> Result<Arc<DynamicScope>, Raise> {
        self.current_scope()
            .cloned()
            .ok_or_else(|| Raise::internal("no dynamic scope for binding access"))
    }

    /// `PushBinding`: allocate the current frame's dynamic scope
    pub(crate) fn push_binding(&mut self) {
        let (parent, size) = self
            .frames
            .last()
            .map_or((None, 0), |f| (f.parent.clone(), f.local_count));
        self.scopes.push(Arc::new(DynamicScope::new(parent, size)));
    }

    /// `PopBinding`: leave the current frame's dynamic scope
    pub(crate) fn pop_binding(&mut self) {
        let base = self.frames.last().map_or(0, |f| f.scope_base);
        if self.scopes.len() > base {
            self.scopes.pop();
        }
    }

    /// Invoke a closure value
    pub fn call_value(
        &mut self,
        callee: &Value,
        args: &[Value],
        block: Option<&Value>,
    ) -> Result<Value, Raise> {
        match callee {
            Value::Closure(c) => {
                let closure = Arc::clone(c);
                call_scope(
                    self,
                    closure.code.as_ref(),
                    Activation::closure(closure.captured.clone()),
                    args,
                    block,
                )
            }
            other => Err(Raise::new(
                ExceptionKind::NoMethodError,
                format!("undefined method 'call' for {}", other.type_name()),
            )),
        }
    }
}

/// Enter `code` under the call protocol
pub fn call_scope(
    ctx: &mut ThreadContext,
    code: &dyn ScopeCode,
    activation: Activation,
    args: &[Value],
    block: Option<&Value>,
) -> Result<Value, Raise> {
    let snapshot = code.snapshot();
    if ctx.frames.len() >= ctx.runtime.config().max_call_depth {
        return Err(Raise::new(
            ExceptionKind::SystemStackError,
            "stack level too deep",
        ));
    }

    let base = ctx.scopes.len();
    ctx.frames.push(Frame {
        name: Arc::clone(&snapshot.name),
        scope_id: snapshot.scope_id,
        parent: activation.parent,
        scope_base: base,
        local_count: snapshot.local_count,
        method: activation.method,
    });
    trace!(scope = %snapshot.scope_id, depth = ctx.frames.len(), "enter");

    let result = run_activation(ctx, code, args, block);

    ctx.scopes.truncate(base);
    ctx.frames.pop();
    result
}

fn run_activation(
    ctx: &mut ThreadContext,
    code: &dyn ScopeCode,
    args: &[Value],
    block: Option<&Value>,
) -> Result<Value, Raise> {
    let snapshot = code.snapshot();
    let runtime = Arc::clone(&ctx.runtime);
    let bound = runtime.binder().bind(&snapshot.signature, args)?;
    if snapshot.needs_implicit_scope() {
        ctx.push_binding();
    }
    code.execute(ctx, &bound, block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_binding_push_pop_stays_above_frame_base() {
        let runtime = Runtime::new(EngineConfig::default());
        let mut ctx = runtime.new_context();
        ctx.push_binding();
        assert_eq!(ctx.scope_depth(), 1);
        assert!(ctx.current_scope().is_some());
        ctx.pop_binding();
        ctx.pop_binding();
        assert_eq!(ctx.scope_depth(), 0);
        assert!(ctx.require_scope().is_err());
    }

    #[test]
    fn test_calling_non_closure() {
        let runtime = Runtime::new(EngineConfig::default());
        let mut ctx = runtime.new_context();
        let err = ctx.call_value(&Value::Int(1), &[], None).unwrap_err();
        assert_eq!(err.kind(), Some(ExceptionKind::NoMethodError));
        assert_eq!(ctx.depth(), 0);
    }
}
