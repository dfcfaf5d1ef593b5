//! Operands, variables and labels

use std::fmt;
use std::sync::Arc;

/// A compiler temporary, numbered per scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TempVar(pub u32);

impl TempVar {
    /// Index into the activation's temporary array
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TempVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%t{}", self.0)
    }
}

/// A programmer-visible local variable.
///
/// `depth` counts scopes outward from the scope that references the variable:
/// 0 is the referencing scope itself, 1 its immediately enclosing scope, and so
/// on. `offset` indexes the declaring scope's static local table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalVar {
    /// Source name
    pub name: Arc<str>,
    /// Number of scope boundaries between the reference and the declaration
    pub depth: u32,
    /// Slot in the declaring scope's local table
    pub offset: u32,
}

impl LocalVar {
    /// Create a local variable reference
    pub fn new(name: impl Into<Arc<str>>, depth: u32, offset: u32) -> Self {
        LocalVar {
            name: name.into(),
            depth,
            offset,
        }
    }

    /// The same variable as seen from a closure nested one level deeper
    pub fn outer(&self) -> LocalVar {
        LocalVar {
            name: self.name.clone(),
            depth: self.depth + 1,
            offset: self.offset,
        }
    }

    /// Whether the variable lives in an enclosing scope
    pub fn is_outer(&self) -> bool {
        self.depth > 0
    }
}

impl fmt::Display for LocalVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.depth == 0 {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}^{}", self.name, self.depth)
        }
    }
}

/// A variable an instruction can read or write
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Variable {
    /// Programmer-visible local, stored in a dynamic scope
    Local(LocalVar),
    /// Compiler temporary, stored in the activation
    Temp(TempVar),
}

impl Variable {
    /// The temporary, if this is one
    pub fn as_temp(&self) -> Option<TempVar> {
        match self {
            Variable::Temp(t) => Some(*t),
            Variable::Local(_) => None,
        }
    }

    /// The local, if this is one
    pub fn as_local(&self) -> Option<&LocalVar> {
        match self {
            Variable::Local(l) => Some(l),
            Variable::Temp(_) => None,
        }
    }

    /// A local declared in an enclosing scope
    pub fn is_outer_local(&self) -> bool {
        matches!(self, Variable::Local(l) if l.is_outer())
    }
}

impl From<TempVar> for Variable {
    fn from(t: TempVar) -> Self {
        Variable::Temp(t)
    }
}

impl From<LocalVar> for Variable {
    fn from(l: LocalVar) -> Self {
        Variable::Local(l)
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variable::Local(l) => write!(f, "{}", l),
            Variable::Temp(t) => write!(f, "{}", t),
        }
    }
}

/// An instruction input: a variable or an immediate constant
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Read a variable
    Var(Variable),
    /// `nil`
    Nil,
    /// Boolean constant
    Bool(bool),
    /// Integer constant
    Int(i64),
    /// Float constant
    Float(f64),
    /// String constant
    Str(Arc<str>),
}

impl Operand {
    /// The variable this operand reads, if any
    pub fn as_var(&self) -> Option<&Variable> {
        match self {
            Operand::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Mutable access to the variable this operand reads, if any
    pub fn as_var_mut(&mut self) -> Option<&mut Variable> {
        match self {
            Operand::Var(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this operand is an immediate
    pub fn is_constant(&self) -> bool {
        !matches!(self, Operand::Var(_))
    }
}

impl From<Variable> for Operand {
    fn from(v: Variable) -> Self {
        Operand::Var(v)
    }
}

impl From<TempVar> for Operand {
    fn from(t: TempVar) -> Self {
        Operand::Var(Variable::Temp(t))
    }
}

impl From<LocalVar> for Operand {
    fn from(l: LocalVar) -> Self {
        Operand::Var(Variable::Local(l))
    }
}

impl From<i64> for Operand {
    fn from(i: i64) -> Self {
        Operand::Int(i)
    }
}

impl From<bool> for Operand {
    fn from(b: bool) -> Self {
        Operand::Bool(b)
    }
}

impl From<&str> for Operand {
    fn from(s: &str) -> Self {
        Operand::Str(s.into())
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Var(v) => write!(f, "{}", v),
            Operand::Nil => write!(f, "nil"),
            Operand::Bool(b) => write!(f, "{}", b),
            Operand::Int(i) => write!(f, "{}", i),
            Operand::Float(x) => write!(f, "{:?}", x),
            Operand::Str(s) => write!(f, "{:?}", s),
        }
    }
}

/// A jump target
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Label(pub Arc<str>);

impl Label {
    /// Create a label with the given name
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Label(name.into())
    }

    /// Label minted by the CFG builder for a block that had none
    pub fn synthetic(block: u32) -> Self {
        Label(format!("_BB{}", block).into())
    }

    /// Label name
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
