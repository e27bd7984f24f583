//! Registry of named operations for name-based refetching.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::request::RefetchOperation;

/// Maps operation names to the document and variables they last ran with.
///
/// Query controllers register themselves here when they issue, so a mutation
/// can ask for `"people"` to be refetched and get the latest variables. Lookups
/// happen at trigger time, never cached, because entries change between calls.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: RwLock<HashMap<String, RefetchOperation>>,
}

impl OperationRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the operation for `name`.
    pub fn register(&self, name: impl Into<String>, operation: RefetchOperation) {
        self.operations.write().insert(name.into(), operation);
    }

    /// Look up the operation registered for `name`.
    pub fn lookup(&self, name: &str) -> Option<RefetchOperation> {
        self.operations.read().get(name).cloned()
    }

    /// Remove the operation registered for `name`.
    pub fn unregister(&self, name: &str) -> Option<RefetchOperation> {
        self.operations.write().remove(name)
    }

    /// Number of registered operations.
    pub fn len(&self) -> usize {
        self.operations.read().len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.operations.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_register_replaces_variables() {
        let registry = OperationRegistry::new();
        let doc = "query people($first: Int) { allPeople(first: $first) { name } }";
        let vars = |n: i64| json!({ "first": n }).as_object().cloned().unwrap();

        registry.register("people", RefetchOperation::new(doc, vars(1)));
        registry.register("people", RefetchOperation::new(doc, vars(2)));

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("people").unwrap().variables, vars(2));
        assert!(registry.lookup("planets").is_none());

        assert!(registry.unregister("people").is_some());
        assert!(registry.is_empty());
    }
}
