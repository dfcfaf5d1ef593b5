//! Closure-threaded backend
//!
//! Compiles every instruction of a snapshot into a boxed closure with its
//! operands, jump targets and closure bodies resolved ahead of time. Binary
//! operations on two constants that cannot raise are folded. Nested closures
//! are compiled first so `BuildClosure` captures compiled bodies.

use std::sync::Arc;

use tracing::debug;

use super::backend::{CompiledArtifact, CompilerBackend};
use crate::error::CompileError;
use crate::interp::exec::{self, Callee, Flow, Registers};
use crate::interp::{ops, Raise, ScopeCode, ThreadContext, Value};
use crate::ir::{CallTarget, Instr, LocalVar, Operand, ScopeSnapshot, Variable};

type Op = Box<dyn Fn(&mut ThreadContext, &mut Registers<'_>) -> Result<Flow, Raise> + Send + Sync>;

fn thread<F>(f: F) -> Op
where
    F: Fn(&mut ThreadContext, &mut Registers<'_>) -> Result<Flow, Raise> + Send + Sync + 'static,
{
    Box::new(f)
}

/// A pre-resolved operand
#[derive(Clone)]
enum Src {
    Temp(usize),
    Local(LocalVar),
    Const(Value),
}

impl Src {
    fn new(op: &Operand) -> Self {
        match op {
            Operand::Var(Variable::Temp(t)) => Src::Temp(t.index()),
            Operand::Var(Variable::Local(l)) => Src::Local(l.clone()),
            other => Src::Const(exec::constant(other)),
        }
    }

    fn read(&self, ctx: &ThreadContext, regs: &Registers<'_>) -> Result<Value, Raise> {
        match self {
            Src::Temp(i) => Ok(regs.temp(*i)),
            Src::Local(l) => exec::read_local(ctx, l),
            Src::Const(v) => Ok(v.clone()),
        }
    }
}

/// A pre-resolved destination
#[derive(Clone)]
enum Dst {
    Temp(usize),
    Local(LocalVar),
}

impl Dst {
    fn new(var: &Variable) -> Self {
        match var {
            Variable::Temp(t) => Dst::Temp(t.index()),
            Variable::Local(l) => Dst::Local(l.clone()),
        }
    }

    fn write(&self, ctx: &ThreadContext, regs: &mut Registers<'_>, value: Value) -> Result<(), Raise> {
        match self {
            Dst::Temp(i) => regs.set_temp(*i, value),
            Dst::Local(l) => exec::write_local(ctx, l, value),
        }
    }
}

/// A pre-resolved call target
enum Target {
    Native(Arc<str>),
    Method(Arc<str>),
    Closure(Src),
}

/// Compiled form of one scope
pub struct ThreadedCode {
    snapshot: Arc<ScopeSnapshot>,
    ops: Vec<Op>,
    closures: Vec<Arc<ThreadedCode>>,
}

impl ThreadedCode {
    /// Compiled bodies of the nested closures
    pub fn closures(&self) -> &[Arc<ThreadedCode>] {
        &self.closures
    }
}

impl ScopeCode for ThreadedCode {
    fn snapshot(&self) -> &ScopeSnapshot {
        &self.snapshot
    }

    fn execute(
        &self,
        ctx: &mut ThreadContext,
        args: &[Value],
        block: Option<&Value>,
    ) -> Result<Value, Raise> {
        let mut regs = Registers::new(self.snapshot.temp_count, args, block);
        exec::run(ctx, &self.snapshot, &mut regs, |ctx, regs, pc| match self.ops.get(pc) {
            Some(op) => op(ctx, regs),
            None => Err(Raise::internal(format!("pc {} has no compiled op", pc))),
        })
    }
}

impl CompiledArtifact for ThreadedCode {
    fn backend(&self) -> &str {
        "threaded"
    }

    fn entry(&self) -> &dyn ScopeCode {
        self
    }
}

/// Backend producing [`ThreadedCode`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadedBackend;

impl ThreadedBackend {
    fn compile_scope(&self, snapshot: &Arc<ScopeSnapshot>) -> Result<Arc<ThreadedCode>, CompileError> {
        let closures = snapshot
            .closures
            .iter()
            .map(|c| self.compile_scope(c))
            .collect::<Result<Vec<_>, _>>()?;

        let mut ops = Vec::with_capacity(snapshot.len());
        let mut folded = 0usize;
        for (pc, instr) in snapshot.instrs.iter().enumerate() {
            let target = snapshot.jump_targets.get(pc).copied().flatten();
            let (op, was_folded) = compile_instr(instr, target, &closures)?;
            folded += usize::from(was_folded);
            ops.push(op);
        }

        debug!(
            scope = %snapshot.scope_id,
            instrs = snapshot.len(),
            folded,
            closures = closures.len(),
            "compiled threaded code"
        );
        Ok(Arc::new(ThreadedCode {
            snapshot: Arc::clone(snapshot),
            ops,
            closures,
        }))
    }
}

impl CompilerBackend for ThreadedBackend {
    fn name(&self) -> &str {
        "threaded"
    }

    fn compile(&self, snapshot: &Arc<ScopeSnapshot>) -> Result<Arc<dyn CompiledArtifact>, CompileError> {
        let code: Arc<dyn CompiledArtifact> = self.compile_scope(snapshot)?;
        Ok(code)
    }
}

fn resolved(target: Option<usize>, instr: &Instr) -> Result<usize, CompileError> {
    target.ok_or_else(|| CompileError::BackendError(format!("unresolved jump target in `{}`", instr)))
}

fn compile_instr(
    instr: &Instr,
    target: Option<usize>,
    closures: &[Arc<ThreadedCode>],
) -> Result<(Op, bool), CompileError> {
    let op: Op = match instr {
        Instr::Copy { dest, src } => {
            let (d, s) = (Dst::new(dest), Src::new(src));
            thread(move |ctx, r| {
                let v = s.read(ctx, r)?;
                d.write(ctx, r, v)?;
                Ok(Flow::Next)
            })
        }
        Instr::BinOp { dest, op, lhs, rhs } => {
            let (d, l, rr, op) = (Dst::new(dest), Src::new(lhs), Src::new(rhs), *op);
            if let (Src::Const(a), Src::Const(b), false) = (&l, &rr, op.can_raise()) {
                if let Ok(v) = ops::binop(op, a, b) {
                    return Ok((
                        thread(move |ctx, r| {
                            d.write(ctx, r, v.clone())?;
                            Ok(Flow::Next)
                        }),
                        true,
                    ));
                }
            }
            thread(move |ctx, r| {
                let v = ops::binop(op, &l.read(ctx, r)?, &rr.read(ctx, r)?)?;
                d.write(ctx, r, v)?;
                Ok(Flow::Next)
            })
        }
        Instr::Not { dest, src } => {
            let (d, s) = (Dst::new(dest), Src::new(src));
            thread(move |ctx, r| {
                let v = exec::not(&s.read(ctx, r)?);
                d.write(ctx, r, v)?;
                Ok(Flow::Next)
            })
        }
        Instr::ReceiveArg { dest, index } => {
            let (d, i) = (Dst::new(dest), *index as usize);
            thread(move |ctx, r| {
                let v = r.arg(i);
                d.write(ctx, r, v)?;
                Ok(Flow::Next)
            })
        }
        Instr::ReceiveBlock { dest } => {
            let d = Dst::new(dest);
            thread(move |ctx, r| {
                let v = r.block();
                d.write(ctx, r, v)?;
                Ok(Flow::Next)
            })
        }
        Instr::ReceiveException { dest } => {
            let d = Dst::new(dest);
            thread(move |ctx, r| {
                let v = r.exception();
                d.write(ctx, r, v)?;
                Ok(Flow::Next)
            })
        }
        Instr::Label(_) | Instr::ExceptionRegionStart { .. } | Instr::ExceptionRegionEnd => {
            thread(|_, _| Ok(Flow::Next))
        }
        Instr::Jump(_) => {
            let t = resolved(target, instr)?;
            thread(move |_, _| Ok(Flow::Jump(t)))
        }
        Instr::Branch { cond, when, .. } => {
            let (c, when, t) = (Src::new(cond), *when, resolved(target, instr)?);
            thread(move |ctx, r| {
                if exec::branch_taken(&c.read(ctx, r)?, when) {
                    Ok(Flow::Jump(t))
                } else {
                    Ok(Flow::Next)
                }
            })
        }
        Instr::Return(op) => {
            let s = Src::new(op);
            thread(move |ctx, r| Ok(Flow::Return(s.read(ctx, r)?)))
        }
        Instr::Throw(op) => {
            let s = Src::new(op);
            thread(move |ctx, r| Err(Raise::value(s.read(ctx, r)?)))
        }
        Instr::Call {
            dest,
            target,
            args,
            block,
        } => {
            let d = dest.as_ref().map(Dst::new);
            let args: Vec<Src> = args.iter().map(Src::new).collect();
            let blk = block.as_ref().map(Src::new);
            let target = match target {
                CallTarget::Native(name) => Target::Native(Arc::clone(name)),
                CallTarget::Method(name) => Target::Method(Arc::clone(name)),
                CallTarget::Closure(op) => Target::Closure(Src::new(op)),
            };
            thread(move |ctx, r| {
                let values = args
                    .iter()
                    .map(|a| a.read(ctx, r))
                    .collect::<Result<Vec<_>, _>>()?;
                let block = blk.as_ref().map(|b| b.read(ctx, r)).transpose()?;
                let callee = match &target {
                    Target::Native(name) => Callee::Native(name),
                    Target::Method(name) => Callee::Method(name),
                    Target::Closure(src) => Callee::Value(src.read(ctx, r)?),
                };
                let result = exec::call(ctx, callee, &values, block.as_ref())?;
                if let Some(d) = &d {
                    d.write(ctx, r, result)?;
                }
                Ok(Flow::Next)
            })
        }
        Instr::BuildClosure { dest, closure } => {
            let d = Dst::new(dest);
            let code: Arc<dyn ScopeCode> = closures
                .get(*closure as usize)
                .map(|c| Arc::clone(c) as Arc<dyn ScopeCode>)
                .ok_or_else(|| CompileError::BackendError(format!("closure {} not compiled", closure)))?;
            thread(move |ctx, r| {
                let v = exec::build_closure(ctx, Arc::clone(&code));
                d.write(ctx, r, v)?;
                Ok(Flow::Next)
            })
        }
        Instr::LoadBinding { dest, slot } => {
            let (d, slot) = (Dst::new(dest), slot.clone());
            thread(move |ctx, r| {
                let v = exec::read_local(ctx, &slot)?;
                d.write(ctx, r, v)?;
                Ok(Flow::Next)
            })
        }
        Instr::StoreBinding { slot, value } => {
            let (slot, s) = (slot.clone(), Src::new(value));
            thread(move |ctx, r| {
                let v = s.read(ctx, r)?;
                exec::write_local(ctx, &slot, v)?;
                Ok(Flow::Next)
            })
        }
        Instr::PushBinding => thread(|ctx, _| {
            ctx.push_binding();
            Ok(Flow::Next)
        }),
        Instr::PopBinding => thread(|ctx, _| {
            ctx.pop_binding();
            Ok(Flow::Next)
        }),
    };
    Ok((op, false))
}
