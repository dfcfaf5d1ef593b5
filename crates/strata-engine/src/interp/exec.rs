//! Instruction semantics shared by the interpreter and compiled code
//!
//! Both tiers keep their registers in [`Registers`] and drive their code
//! through [`run`], so argument reception, rescue routing and back-edge
//! counting behave identically whichever tier executes a scope.

use std::sync::Arc;

use super::context::ThreadContext;
use super::value::{ClosureValue, ExceptionKind, Raise, Value};
use super::ScopeCode;
use crate::ir::{LocalVar, Operand, ScopeSnapshot, Variable};

/// Control transfer out of one instruction
pub(crate) enum Flow {
    Next,
    Jump(usize),
    Return(Value),
}

/// Registers of one activation
pub(crate) struct Registers<'a> {
    temps: Vec<Value>,
    args: &'a [Value],
    block: Option<&'a Value>,
    exception: Value,
}

impl<'a> Registers<'a> {
    pub(crate) fn new(temp_count: usize, args: &'a [Value], block: Option<&'a Value>) -> Self {
        Registers {
            temps: vec![Value::Nil; temp_count],
            args,
            block,
            exception: Value::Nil,
        }
    }

    pub(crate) fn temp(&self, index: usize) -> Value {
        self.temps.get(index).cloned().unwrap_or_default()
    }

    pub(crate) fn set_temp(&mut self, index: usize, value: Value) -> Result<(), Raise> {
        match self.temps.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(Raise::internal(format!("temporary %t{} out of range", index))),
        }
    }

    /// Value of `op` in this activation
    pub(crate) fn read(&self, ctx: &ThreadContext, op: &Operand) -> Result<Value, Raise> {
        match op {
            Operand::Var(Variable::Temp(t)) => Ok(self.temp(t.index())),
            Operand::Var(Variable::Local(l)) => read_local(ctx, l),
            other => Ok(constant(other)),
        }
    }

    pub(crate) fn write(&mut self, ctx: &ThreadContext, dest: &Variable, value: Value) -> Result<(), Raise> {
        match dest {
            Variable::Temp(t) => self.set_temp(t.index(), value),
            Variable::Local(l) => write_local(ctx, l, value),
        }
    }

    /// Positional argument `index`; missing arguments read as `nil`
    pub(crate) fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    pub(crate) fn block(&self) -> Value {
        self.block.cloned().unwrap_or_default()
    }

    /// The exception that sent control to the current rescue target
    pub(crate) fn exception(&self) -> Value {
        self.exception.clone()
    }
}

/// Drive `step` over the PCs of `snapshot`.
///
/// Backward jumps feed the loop counter. A raise at a PC with a rescue
/// target stores the exception and resumes there; otherwise it propagates.
/// Running off the end returns `nil`.
pub(crate) fn run<'a, F>(
    ctx: &mut ThreadContext,
    snapshot: &ScopeSnapshot,
    regs: &mut Registers<'a>,
    mut step: F,
) -> Result<Value, Raise>
where
    F: FnMut(&mut ThreadContext, &mut Registers<'a>, usize) -> Result<Flow, Raise>,
{
    let mut pc = 0;
    while pc < snapshot.len() {
        match step(ctx, regs, pc) {
            Ok(Flow::Next) => pc += 1,
            Ok(Flow::Jump(target)) => {
                if target <= pc {
                    record_back_edge(ctx);
                }
                pc = target;
            }
            Ok(Flow::Return(value)) => return Ok(value),
            Err(raise) => match snapshot.rescue_pcs.get(pc).copied().flatten() {
                Some(rescue) => {
                    regs.exception = raise.exception;
                    pc = rescue;
                }
                None => return Err(raise),
            },
        }
    }
    Ok(Value::Nil)
}

/// Resolved target of a `Call`
pub(crate) enum Callee<'n> {
    Native(&'n str),
    Method(&'n str),
    Value(Value),
}

/// Perform a call once its arguments are evaluated
pub(crate) fn call(
    ctx: &mut ThreadContext,
    callee: Callee<'_>,
    args: &[Value],
    block: Option<&Value>,
) -> Result<Value, Raise> {
    match callee {
        Callee::Native(name) => call_native(ctx, name, args, block),
        Callee::Method(name) => call_method(ctx, name, args, block),
        Callee::Value(value) => ctx.call_value(&value, args, block),
    }
}

/// `Branch` semantics
pub(crate) fn branch_taken(cond: &Value, when: bool) -> bool {
    cond.is_truthy() == when
}

/// `Not` semantics
pub(crate) fn not(value: &Value) -> Value {
    Value::Bool(!value.is_truthy())
}

/// Value of an immediate operand; variables read as `nil`
pub(crate) fn constant(op: &Operand) -> Value {
    match op {
        Operand::Nil | Operand::Var(_) => Value::Nil,
        Operand::Bool(b) => Value::Bool(*b),
        Operand::Int(n) => Value::Int(*n),
        Operand::Float(x) => Value::Float(*x),
        Operand::Str(s) => Value::Str(Arc::clone(s)),
    }
}

pub(crate) fn read_local(ctx: &ThreadContext, var: &LocalVar) -> Result<Value, Raise> {
    let scope = ctx.require_scope()?;
    let owner = scope
        .ancestor(var.depth)
        .ok_or_else(|| Raise::internal(format!("no dynamic scope at depth {} for {}", var.depth, var)))?;
    Ok(owner.get(var.offset))
}

pub(crate) fn write_local(ctx: &ThreadContext, var: &LocalVar, value: Value) -> Result<(), Raise> {
    let scope = ctx.require_scope()?;
    let owner = scope
        .ancestor(var.depth)
        .ok_or_else(|| Raise::internal(format!("no dynamic scope at depth {} for {}", var.depth, var)))?;
    owner.set(var.offset, value);
    Ok(())
}

/// Closure over the current frame's dynamic scope
pub(crate) fn build_closure(ctx: &ThreadContext, code: Arc<dyn ScopeCode>) -> Value {
    Value::Closure(Arc::new(ClosureValue {
        code,
        captured: ctx.current_scope().cloned(),
    }))
}

/// A backward jump was taken in the current frame
pub(crate) fn record_back_edge(ctx: &ThreadContext) {
    if !ctx.runtime().config().dispatch.jit_enabled {
        return;
    }
    if let Some(method) = ctx.frame().and_then(|f| f.method()) {
        method.profile().record_loop();
    }
}

fn call_native(
    ctx: &mut ThreadContext,
    name: &str,
    args: &[Value],
    block: Option<&Value>,
) -> Result<Value, Raise> {
    let native = ctx.runtime().natives().get(name).ok_or_else(|| {
        Raise::new(
            ExceptionKind::NoMethodError,
            format!("undefined native function '{}'", name),
        )
    })?;
    native(ctx, args, block)
}

fn call_method(
    ctx: &mut ThreadContext,
    name: &str,
    args: &[Value],
    block: Option<&Value>,
) -> Result<Value, Raise> {
    let runtime = Arc::clone(ctx.runtime());
    runtime.call(ctx, name, args, block)
}

pub(crate) fn jump_target(target: Option<usize>) -> Result<usize, Raise> {
    target.ok_or_else(|| Raise::internal("unresolved jump target"))
}
