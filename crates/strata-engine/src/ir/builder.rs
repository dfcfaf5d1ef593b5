//! Scope builder
//!
//! The entry point for IR producers: declare locals, temporaries and labels,
//! emit instructions, attach nested closures.

use std::sync::Arc;

use super::instr::Instr;
use super::operand::{Label, LocalVar, TempVar};
use super::scope::{IrScope, ScopeKind, Signature};

/// Builder for an [`IrScope`]
pub struct ScopeBuilder {
    name: Arc<str>,
    kind: ScopeKind,
    instrs: Vec<Instr>,
    closures: Vec<IrScope>,
    locals: Vec<Arc<str>>,
    temp_count: u32,
    label_count: u32,
    signature: Signature,
    binding_escapes: bool,
}

impl ScopeBuilder {
    fn new(name: &str, kind: ScopeKind, signature: Signature) -> Self {
        ScopeBuilder {
            name: name.into(),
            kind,
            instrs: Vec::new(),
            closures: Vec::new(),
            locals: Vec::new(),
            temp_count: 0,
            label_count: 0,
            signature,
            binding_escapes: false,
        }
    }

    /// Start a method body
    pub fn method(name: &str) -> Self {
        Self::new(name, ScopeKind::Method, Signature::default())
    }

    /// Start a closure body; closures bind arguments leniently
    pub fn closure(name: &str) -> Self {
        Self::new(
            name,
            ScopeKind::Closure,
            Signature {
                lenient: true,
                ..Signature::default()
            },
        )
    }

    /// Declare (or look up) a local of this scope
    pub fn local(&mut self, name: &str) -> LocalVar {
        let offset = match self.locals.iter().position(|l| &**l == name) {
            Some(i) => i,
            None => {
                self.locals.push(name.into());
                self.locals.len() - 1
            }
        };
        LocalVar::new(self.locals[offset].clone(), 0, offset as u32)
    }

    /// Allocate a temporary
    pub fn temp(&mut self) -> TempVar {
        let t = TempVar(self.temp_count);
        self.temp_count += 1;
        t
    }

    /// Mint a fresh label
    pub fn label(&mut self) -> Label {
        self.label_count += 1;
        Label::new(format!("L{}", self.label_count))
    }

    /// Append an instruction
    pub fn emit(&mut self, instr: Instr) -> &mut Self {
        self.instrs.push(instr);
        self
    }

    /// Attach a nested closure; the result is its `BuildClosure` index
    pub fn add_closure(&mut self, closure: IrScope) -> u32 {
        self.closures.push(closure);
        (self.closures.len() - 1) as u32
    }

    /// Set the argument arity, keeping leniency
    pub fn signature(mut self, required: u32, optional: u32) -> Self {
        self.signature.required = required;
        self.signature.optional = optional;
        self
    }

    /// Declare that the scope's binding may be captured reflectively
    pub fn binding_escapes(mut self) -> Self {
        self.binding_escapes = true;
        self
    }

    /// Produce the scope
    pub fn finish(self) -> IrScope {
        IrScope::new(
            self.name,
            self.kind,
            self.instrs,
            self.closures,
            self.locals,
            self.temp_count,
            self.signature,
            self.binding_escapes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Operand;

    #[test]
    fn test_locals_are_interned() {
        let mut b = ScopeBuilder::method("m");
        let x1 = b.local("x");
        let y = b.local("y");
        let x2 = b.local("x");
        assert_eq!(x1, x2);
        assert_eq!(y.offset, 1);
        assert_eq!(b.finish().locals().len(), 2);
    }

    #[test]
    fn test_labels_are_fresh() {
        let mut b = ScopeBuilder::method("m");
        assert_ne!(b.label(), b.label());
    }

    #[test]
    fn test_signature_and_escape() {
        let mut b = ScopeBuilder::closure("blk");
        b.emit(Instr::Return(Operand::Nil));
        let scope = b.signature(1, 1).binding_escapes().finish();
        assert_eq!(scope.signature().max_args(), 2);
        assert!(scope.signature().lenient);
        assert!(scope.flags().binding_has_escaped);
        assert_eq!(scope.kind(), ScopeKind::Closure);
    }
}
