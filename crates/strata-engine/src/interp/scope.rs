//! Heap-allocated dynamic scopes
//!
//! A dynamic scope holds the locals of one activation that closures can
//! reach. Scopes form a chain through `parent`: a local at depth `d` lives
//! `d` links up from the current scope.

use std::sync::Arc;

use parking_lot::RwLock;

use super::value::Value;

/// Local slots of one activation
pub struct DynamicScope {
    parent: Option<Arc<DynamicScope>>,
    slots: RwLock<Vec<Value>>,
}

impl DynamicScope {
    /// Scope with `size` nil slots
    pub fn new(parent: Option<Arc<DynamicScope>>, size: usize) -> Self {
        DynamicScope {
            parent,
            slots: RwLock::new(vec![Value::Nil; size]),
        }
    }

    /// Enclosing scope
    pub fn parent(&self) -> Option<&Arc<DynamicScope>> {
        self.parent.as_ref()
    }

    /// The scope `depth` links up the chain
    pub fn ancestor(&self, depth: u32) -> Option<&DynamicScope> {
        let mut scope = self;
        for _ in 0..depth {
            scope = scope.parent.as_deref()?;
        }
        Some(scope)
    }

    /// Read a slot; never-written slots are nil
    pub fn get(&self, offset: u32) -> Value {
        self.slots
            .read()
            .get(offset as usize)
            .cloned()
            .unwrap_or_default()
    }

    /// Write a slot, growing the scope if needed
    pub fn set(&self, offset: u32, value: Value) {
        let mut slots = self.slots.write();
        let i = offset as usize;
        if i >= slots.len() {
            slots.resize(i + 1, Value::Nil);
        }
        slots[i] = value;
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Whether the scope has no slots
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_lookup() {
        let outer = Arc::new(DynamicScope::new(None, 2));
        outer.set(1, Value::Int(7));
        let inner = DynamicScope::new(Some(Arc::clone(&outer)), 1);
        assert_eq!(inner.ancestor(1).unwrap().get(1), Value::Int(7));
        assert!(inner.ancestor(2).is_none());
        assert_eq!(inner.get(0), Value::Nil);
    }

    #[test]
    fn test_set_grows() {
        let scope = DynamicScope::new(None, 0);
        assert!(scope.is_empty());
        scope.set(3, Value::Bool(true));
        assert_eq!(scope.len(), 4);
        assert_eq!(scope.get(3), Value::Bool(true));
        assert_eq!(scope.get(9), Value::Nil);
    }
}
