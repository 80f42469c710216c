use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::evaluator::Value;

/// A section captured by a child template, waiting for the parent's
/// matching `define`.
#[derive(Debug, Clone)]
pub struct Section {
    pub name: String,
    pub content: String,
    pub line: usize,
    pub column: usize,
}

/// Inheritance state: the parent template's name and the sections the child
/// captured for it. The sections map is shared between the child environment
/// and the environment derived for the parent render, so a `define` consuming
/// a section is visible to the child's unconsumed-section check.
#[derive(Debug, Clone, Default)]
pub struct ExtendsFrom {
    pub from: String,
    pub sections: Rc<RefCell<HashMap<String, Section>>>,
}

/// Nested name→value scope plus per-render inheritance state. Lookup walks
/// outer scopes; binding always writes to the local store.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    store: Rc<RefCell<HashMap<String, Value>>>,
    outer: Option<Rc<Environment>>,
    pub file_name: String,
    pub in_extends: bool,
    pub is_extends: bool,
    pub in_section: bool,
    pub in_define: bool,
    pub extends_from: ExtendsFrom,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_enclosed(outer: Environment) -> Self {
        Self {
            outer: Some(Rc::new(outer)),
            ..Self::default()
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.store.borrow().get(name) {
            return Some(value.clone());
        }
        self.outer.as_ref().and_then(|outer| outer.get(name))
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.store.borrow_mut().insert(name.into(), value);
    }

    /// Removes a binding from the local store only. Used to unbind loop
    /// variables once a `for` finishes.
    pub fn delete(&self, name: &str) {
        self.store.borrow_mut().remove(name);
    }

    /// Sibling environment for re-entering the pipeline under inheritance:
    /// same store, same outer, same captured sections, fresh phase flags.
    /// The host's well-known `sessions` binding stays visible.
    pub fn copy(&self) -> Environment {
        let copied = Environment {
            store: Rc::clone(&self.store),
            outer: self.outer.clone(),
            extends_from: self.extends_from.clone(),
            ..Self::default()
        };

        if let Some(sessions) = self.get("sessions") {
            copied.set("sessions", sessions);
        }

        copied
    }
}
