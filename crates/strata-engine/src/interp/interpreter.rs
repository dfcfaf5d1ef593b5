//! Snapshot interpreter
//!
//! Decodes one [`ScopeSnapshot`] instruction per step. Rescue routing and
//! loop counting come from the shared driver in `exec`.

use std::sync::Arc;

use super::context::ThreadContext;
use super::exec::{self, Callee, Flow, Registers};
use super::ops;
use super::value::{Raise, Value};
use super::ScopeCode;
use crate::ir::{CallTarget, Instr, ScopeSnapshot};

/// Run `snapshot` in the activation the call protocol set up
pub(crate) fn interpret(
    ctx: &mut ThreadContext,
    snapshot: &ScopeSnapshot,
    args: &[Value],
    block: Option<&Value>,
) -> Result<Value, Raise> {
    let mut regs = Registers::new(snapshot.temp_count, args, block);
    exec::run(ctx, snapshot, &mut regs, |ctx, regs, pc| step(ctx, snapshot, regs, pc))
}

fn step(
    ctx: &mut ThreadContext,
    snapshot: &ScopeSnapshot,
    regs: &mut Registers<'_>,
    pc: usize,
) -> Result<Flow, Raise> {
    match &snapshot.instrs[pc] {
        Instr::Copy { dest, src } => {
            let value = regs.read(ctx, src)?;
            regs.write(ctx, dest, value)?;
        }
        Instr::BinOp { dest, op, lhs, rhs } => {
            let value = ops::binop(*op, &regs.read(ctx, lhs)?, &regs.read(ctx, rhs)?)?;
            regs.write(ctx, dest, value)?;
        }
        Instr::Not { dest, src } => {
            let value = exec::not(&regs.read(ctx, src)?);
            regs.write(ctx, dest, value)?;
        }
        Instr::ReceiveArg { dest, index } => {
            let value = regs.arg(*index as usize);
            regs.write(ctx, dest, value)?;
        }
        Instr::ReceiveBlock { dest } => {
            let value = regs.block();
            regs.write(ctx, dest, value)?;
        }
        Instr::ReceiveException { dest } => {
            let value = regs.exception();
            regs.write(ctx, dest, value)?;
        }
        Instr::Label(_) | Instr::ExceptionRegionStart { .. } | Instr::ExceptionRegionEnd => {}
        Instr::Jump(_) => {
            return Ok(Flow::Jump(exec::jump_target(snapshot.jump_targets[pc])?));
        }
        Instr::Branch { cond, when, .. } => {
            if exec::branch_taken(&regs.read(ctx, cond)?, *when) {
                return Ok(Flow::Jump(exec::jump_target(snapshot.jump_targets[pc])?));
            }
        }
        Instr::Return(op) => return Ok(Flow::Return(regs.read(ctx, op)?)),
        Instr::Throw(op) => return Err(Raise::value(regs.read(ctx, op)?)),
        Instr::Call {
            dest,
            target,
            args,
            block,
        } => {
            let args = args
                .iter()
                .map(|a| regs.read(ctx, a))
                .collect::<Result<Vec<_>, _>>()?;
            let block = block.as_ref().map(|b| regs.read(ctx, b)).transpose()?;
            let callee = match target {
                CallTarget::Native(name) => Callee::Native(name),
                CallTarget::Method(name) => Callee::Method(name),
                CallTarget::Closure(op) => Callee::Value(regs.read(ctx, op)?),
            };
            let result = exec::call(ctx, callee, &args, block.as_ref())?;
            if let Some(dest) = dest {
                regs.write(ctx, dest, result)?;
            }
        }
        Instr::BuildClosure { dest, closure } => {
            let code = snapshot
                .closures
                .get(*closure as usize)
                .map(|c| Arc::clone(c) as Arc<dyn ScopeCode>)
                .ok_or_else(|| Raise::internal(format!("closure {} not linearized", closure)))?;
            let value = exec::build_closure(ctx, code);
            regs.write(ctx, dest, value)?;
        }
        Instr::LoadBinding { dest, slot } => {
            let value = exec::read_local(ctx, slot)?;
            regs.write(ctx, dest, value)?;
        }
        Instr::StoreBinding { slot, value } => {
            let value = regs.read(ctx, value)?;
            exec::write_local(ctx, slot, value)?;
        }
        Instr::PushBinding => ctx.push_binding(),
        Instr::PopBinding => ctx.pop_binding(),
    }
    Ok(Flow::Next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::interp::{call_scope, Activation, ExceptionKind};
    use crate::ir::{BinOpKind, Label, Operand, ScopeBuilder};
    use crate::runtime::Runtime;

    fn run(scope: crate::ir::IrScope, args: &[Value]) -> Result<Value, Raise> {
        let runtime = Runtime::new(EngineConfig::default());
        let mut scope = scope;
        let snapshot = runtime.pipeline().prepare(&mut scope).unwrap();
        let mut ctx = runtime.new_context();
        let result = call_scope(&mut ctx, snapshot.as_ref(), Activation::default(), args, None);
        assert_eq!(ctx.depth(), 0);
        result
    }

    #[test]
    fn test_counting_loop() {
        let mut b = ScopeBuilder::method("count");
        let (i, c) = (b.temp(), b.temp());
        let (head, done) = (b.label(), b.label());
        b.emit(Instr::Copy { dest: i.into(), src: Operand::Int(0) });
        b.emit(Instr::Label(head.clone()));
        b.emit(Instr::BinOp { dest: c.into(), op: BinOpKind::Lt, lhs: i.into(), rhs: Operand::Int(5) });
        b.emit(Instr::Branch { cond: c.into(), when: false, target: done.clone() });
        b.emit(Instr::BinOp { dest: i.into(), op: BinOpKind::Add, lhs: i.into(), rhs: Operand::Int(1) });
        b.emit(Instr::Jump(head));
        b.emit(Instr::Label(done));
        b.emit(Instr::Return(i.into()));
        assert_eq!(run(b.finish(), &[]).unwrap(), Value::Int(5));
    }

    #[test]
    fn test_rescue_receives_exception() {
        let mut b = ScopeBuilder::method("safe_div");
        let (a, q, e) = (b.temp(), b.temp(), b.temp());
        let (rescue, done) = (b.label(), b.label());
        b.emit(Instr::ReceiveArg { dest: a.into(), index: 0 });
        b.emit(Instr::ExceptionRegionStart { rescue: rescue.clone() });
        b.emit(Instr::BinOp { dest: q.into(), op: BinOpKind::Div, lhs: Operand::Int(10), rhs: a.into() });
        b.emit(Instr::ExceptionRegionEnd);
        b.emit(Instr::Jump(done.clone()));
        b.emit(Instr::Label(rescue));
        b.emit(Instr::ReceiveException { dest: e.into() });
        b.emit(Instr::Return(e.into()));
        b.emit(Instr::Label(done));
        b.emit(Instr::Return(q.into()));
        let scope = b.signature(1, 0).finish();

        let err = run(scope, &[Value::Int(0)]).unwrap();
        assert_eq!(
            err.as_exception().map(|e| e.kind),
            Some(ExceptionKind::ZeroDivisionError)
        );
    }

    #[test]
    fn test_uncaught_throw_propagates() {
        let mut b = ScopeBuilder::method("boom");
        b.emit(Instr::Throw(Operand::Int(7)));
        let err = run(b.finish(), &[]).unwrap_err();
        assert_eq!(err.exception, Value::Int(7));
    }

    #[test]
    fn test_falling_off_the_end_returns_nil() {
        let mut b = ScopeBuilder::method("empty");
        b.emit(Instr::Label(Label::new("L")));
        assert_eq!(run(b.finish(), &[]).unwrap(), Value::Nil);
    }
}
