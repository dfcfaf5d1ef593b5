//! IR instructions

use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::operand::{Label, LocalVar, Operand, Variable};

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOpKind {
    /// `+` (also string concatenation)
    Add,
    /// `-`
    Sub,
    /// `*`
    Mul,
    /// `/`, raises on integer division by zero
    Div,
    /// `%`, raises on integer division by zero
    Mod,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl BinOpKind {
    /// Whether evaluating this operator can raise an exception
    pub fn can_raise(self) -> bool {
        matches!(self, BinOpKind::Div | BinOpKind::Mod)
    }

    /// Operator symbol
    pub fn symbol(self) -> &'static str {
        match self {
            BinOpKind::Add => "+",
            BinOpKind::Sub => "-",
            BinOpKind::Mul => "*",
            BinOpKind::Div => "/",
            BinOpKind::Mod => "%",
            BinOpKind::Lt => "<",
            BinOpKind::Le => "<=",
            BinOpKind::Gt => ">",
            BinOpKind::Ge => ">=",
            BinOpKind::Eq => "==",
            BinOpKind::Ne => "!=",
        }
    }
}

/// What a `Call` invokes
#[derive(Debug, Clone, PartialEq)]
pub enum CallTarget {
    /// A function from the runtime's native registry
    Native(Arc<str>),
    /// A method defined on the runtime
    Method(Arc<str>),
    /// A closure value held in an operand
    Closure(Operand),
}

/// A single IR instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Instr {
    /// `dest = src`
    Copy { dest: Variable, src: Operand },

    /// `dest = lhs op rhs`
    BinOp {
        dest: Variable,
        op: BinOpKind,
        lhs: Operand,
        rhs: Operand,
    },

    /// `dest = !src` (truthiness negation)
    Not { dest: Variable, src: Operand },

    /// `dest = args[index]` after argument binding
    ReceiveArg { dest: Variable, index: u32 },

    /// `dest = <block argument or nil>`
    ReceiveBlock { dest: Variable },

    /// `dest = <exception being rescued>`
    ReceiveException { dest: Variable },

    /// Jump target marker
    Label(Label),

    /// Unconditional jump
    Jump(Label),

    /// Jump to `target` if the truthiness of `cond` equals `when`
    Branch {
        cond: Operand,
        when: bool,
        target: Label,
    },

    /// Return from the scope
    Return(Operand),

    /// Raise the operand as an exception
    Throw(Operand),

    /// Start of a protected region whose raises go to `rescue`
    ExceptionRegionStart { rescue: Label },

    /// End of the innermost protected region
    ExceptionRegionEnd,

    /// Invoke a native, method or closure
    Call {
        dest: Option<Variable>,
        target: CallTarget,
        args: Vec<Operand>,
        block: Option<Operand>,
    },

    /// `dest = closure over the current dynamic scope`
    BuildClosure { dest: Variable, closure: u32 },

    /// `dest = heap slot`
    LoadBinding { dest: Variable, slot: LocalVar },

    /// `heap slot = value`
    StoreBinding { slot: LocalVar, value: Operand },

    /// Allocate and enter this scope's dynamic scope
    PushBinding,

    /// Leave this scope's dynamic scope
    PopBinding,
}

impl Instr {
    /// Operands read by this instruction, in evaluation order
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Instr::Copy { src, .. } | Instr::Not { src, .. } => vec![src],
            Instr::BinOp { lhs, rhs, .. } => vec![lhs, rhs],
            Instr::Branch { cond, .. } => vec![cond],
            Instr::Return(op) | Instr::Throw(op) => vec![op],
            Instr::StoreBinding { value, .. } => vec![value],
            Instr::Call {
                target,
                args,
                block,
                ..
            } => {
                let mut ops = Vec::with_capacity(args.len() + 2);
                if let CallTarget::Closure(op) = target {
                    ops.push(op);
                }
                ops.extend(args.iter());
                if let Some(b) = block {
                    ops.push(b);
                }
                ops
            }
            _ => Vec::new(),
        }
    }

    /// Mutable access to the operands read by this instruction
    pub fn operands_mut(&mut self) -> Vec<&mut Operand> {
        match self {
            Instr::Copy { src, .. } | Instr::Not { src, .. } => vec![src],
            Instr::BinOp { lhs, rhs, .. } => vec![lhs, rhs],
            Instr::Branch { cond, .. } => vec![cond],
            Instr::Return(op) | Instr::Throw(op) => vec![op],
            Instr::StoreBinding { value, .. } => vec![value],
            Instr::Call {
                target,
                args,
                block,
                ..
            } => {
                let mut ops = Vec::with_capacity(args.len() + 2);
                if let CallTarget::Closure(op) = target {
                    ops.push(op);
                }
                ops.extend(args.iter_mut());
                if let Some(b) = block {
                    ops.push(b);
                }
                ops
            }
            _ => Vec::new(),
        }
    }

    /// Variables read by this instruction
    pub fn uses(&self) -> Vec<&Variable> {
        self.operands()
            .into_iter()
            .filter_map(Operand::as_var)
            .collect()
    }

    /// Variable written by this instruction, if any
    pub fn def(&self) -> Option<&Variable> {
        match self {
            Instr::Copy { dest, .. }
            | Instr::BinOp { dest, .. }
            | Instr::Not { dest, .. }
            | Instr::ReceiveArg { dest, .. }
            | Instr::ReceiveBlock { dest }
            | Instr::ReceiveException { dest }
            | Instr::BuildClosure { dest, .. }
            | Instr::LoadBinding { dest, .. } => Some(dest),
            Instr::Call { dest, .. } => dest.as_ref(),
            _ => None,
        }
    }

    /// Mutable access to the variable written by this instruction
    pub fn def_mut(&mut self) -> Option<&mut Variable> {
        match self {
            Instr::Copy { dest, .. }
            | Instr::BinOp { dest, .. }
            | Instr::Not { dest, .. }
            | Instr::ReceiveArg { dest, .. }
            | Instr::ReceiveBlock { dest }
            | Instr::ReceiveException { dest }
            | Instr::BuildClosure { dest, .. }
            | Instr::LoadBinding { dest, .. } => Some(dest),
            Instr::Call { dest, .. } => dest.as_mut(),
            _ => None,
        }
    }

    /// Rewrite every variable this instruction reads through `map`
    pub fn rename_uses(&mut self, map: &FxHashMap<Variable, Variable>) {
        for op in self.operands_mut() {
            if let Some(var) = op.as_var_mut() {
                if let Some(renamed) = map.get(var) {
                    *var = renamed.clone();
                }
            }
        }
    }

    /// Rewrite the variable this instruction writes through `map`
    pub fn rename_def(&mut self, map: &FxHashMap<Variable, Variable>) {
        if let Some(var) = self.def_mut() {
            if let Some(renamed) = map.get(var) {
                *var = renamed.clone();
            }
        }
    }

    /// Rewrite both uses and the def
    pub fn rename_all(&mut self, map: &FxHashMap<Variable, Variable>) {
        self.rename_uses(map);
        self.rename_def(map);
    }

    /// Whether this instruction may raise an exception
    pub fn can_raise(&self) -> bool {
        match self {
            Instr::Call { .. } | Instr::Throw(_) => true,
            Instr::BinOp { op, .. } => op.can_raise(),
            _ => false,
        }
    }

    /// Whether removing this instruction could change observable behavior,
    /// even if its result is never read.
    ///
    /// Writes to depth-0 locals captured by a nested closure are only
    /// observable in context; callers that know the captured set check that
    /// separately.
    pub fn has_side_effects(&self) -> bool {
        match self {
            Instr::Call { .. }
            | Instr::Return(_)
            | Instr::Throw(_)
            | Instr::Jump(_)
            | Instr::Branch { .. }
            | Instr::Label(_)
            | Instr::ExceptionRegionStart { .. }
            | Instr::ExceptionRegionEnd
            | Instr::StoreBinding { .. }
            | Instr::PushBinding
            | Instr::PopBinding => true,
            Instr::BinOp { op, .. } if op.can_raise() => true,
            _ => self.def().is_some_and(Variable::is_outer_local),
        }
    }

    /// Whether this instruction terminates a basic block
    pub fn ends_block(&self) -> bool {
        matches!(
            self,
            Instr::Jump(_) | Instr::Branch { .. } | Instr::Return(_) | Instr::Throw(_)
        )
    }

    /// Control leaves the block unconditionally after this instruction
    pub fn is_unconditional_exit(&self) -> bool {
        matches!(self, Instr::Jump(_) | Instr::Return(_) | Instr::Throw(_))
    }

    /// Whether this instruction leaves the scope
    pub fn exits_scope(&self) -> bool {
        matches!(self, Instr::Return(_) | Instr::Throw(_))
    }

    /// Target label of a jump or branch
    pub fn jump_target(&self) -> Option<&Label> {
        match self {
            Instr::Jump(target) | Instr::Branch { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Whether a call can run closures that observe or mutate bindings
    pub fn may_run_closures(&self) -> bool {
        matches!(self, Instr::Call { .. })
    }

    /// Whether a closure-visible binding must be current in the heap before
    /// this instruction runs
    pub fn is_store_point(&self) -> bool {
        matches!(self, Instr::Return(_)) || self.can_raise()
    }
}
