//! Pretty-printing for IR
//!
//! Display implementations used by dumps and test failure output.

use std::fmt;

use super::instr::{CallTarget, Instr};
use super::operand::Operand;
use super::scope::{IrScope, ScopeKind};
use super::snapshot::ScopeSnapshot;

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallTarget::Native(name) => write!(f, "native:{}", name),
            CallTarget::Method(name) => write!(f, "method:{}", name),
            CallTarget::Closure(op) => write!(f, "closure:{}", op),
        }
    }
}

fn write_operands(f: &mut fmt::Formatter<'_>, ops: &[Operand]) -> fmt::Result {
    for (i, op) in ops.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", op)?;
    }
    Ok(())
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instr::Copy { dest, src } => write!(f, "{} = copy {}", dest, src),
            Instr::BinOp { dest, op, lhs, rhs } => {
                write!(f, "{} = {} {} {}", dest, lhs, op.symbol(), rhs)
            }
            Instr::Not { dest, src } => write!(f, "{} = not {}", dest, src),
            Instr::ReceiveArg { dest, index } => write!(f, "{} = recv_arg {}", dest, index),
            Instr::ReceiveBlock { dest } => write!(f, "{} = recv_block", dest),
            Instr::ReceiveException { dest } => write!(f, "{} = recv_exception", dest),
            Instr::Label(label) => write!(f, "{}:", label),
            Instr::Jump(target) => write!(f, "jump {}", target),
            Instr::Branch { cond, when, target } => {
                let mnemonic = if *when { "b_true" } else { "b_false" };
                write!(f, "{} {}, {}", mnemonic, cond, target)
            }
            Instr::Return(op) => write!(f, "return {}", op),
            Instr::Throw(op) => write!(f, "throw {}", op),
            Instr::ExceptionRegionStart { rescue } => write!(f, "region_start -> {}", rescue),
            Instr::ExceptionRegionEnd => write!(f, "region_end"),
            Instr::Call {
                dest,
                target,
                args,
                block,
            } => {
                if let Some(d) = dest {
                    write!(f, "{} = ", d)?;
                }
                write!(f, "call {}(", target)?;
                write_operands(f, args)?;
                write!(f, ")")?;
                if let Some(b) = block {
                    write!(f, " &{}", b)?;
                }
                Ok(())
            }
            Instr::BuildClosure { dest, closure } => {
                write!(f, "{} = build_closure #{}", dest, closure)
            }
            Instr::LoadBinding { dest, slot } => write!(f, "{} = load_binding {}", dest, slot),
            Instr::StoreBinding { slot, value } => write!(f, "store_binding {}, {}", slot, value),
            Instr::PushBinding => write!(f, "push_binding"),
            Instr::PopBinding => write!(f, "pop_binding"),
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Method => write!(f, "method"),
            ScopeKind::Closure => write!(f, "closure"),
        }
    }
}

impl fmt::Display for IrScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} [{}] (locals: {}, temps: {}, gen: {}) {{",
            self.kind(),
            self.name(),
            self.id(),
            self.locals().len(),
            self.temp_count(),
            self.generation()
        )?;

        match self.cfg() {
            Some(cfg) => write!(f, "{}", cfg)?,
            None => {
                for instr in self.instrs() {
                    writeln!(f, "    {}", instr)?;
                }
            }
        }

        for closure in self.closures() {
            write!(f, "{}", closure)?;
        }

        writeln!(f, "}}")
    }
}

impl fmt::Display for ScopeSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {} [{}] gen {} {{",
            self.kind, self.name, self.scope_id, self.generation
        )?;
        for (pc, instr) in self.instrs.iter().enumerate() {
            write!(f, "  {:4}: {}", pc, instr)?;
            if let Some(target) = self.jump_targets[pc] {
                write!(f, "  ; -> {}", target)?;
            }
            if let Some(rescue) = self.rescue_pcs[pc] {
                write!(f, "  ; rescue {}", rescue)?;
            }
            writeln!(f)?;
        }
        writeln!(f, "}}")
    }
}
