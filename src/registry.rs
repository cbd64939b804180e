// SPDX-License-Identifier: MIT

//! Explicit registry of node definitions, functions, and predicates
//!
//! Constructed by the caller and passed to the builder, manager, and
//! validator; one registry per process or test, no global state.
//! Duplicate registration overwrites, last-write-wins.

use std::collections::HashMap;
use std::sync::Arc;

use crate::condition::CustomPredicate;
use crate::error::WorkflowError;
use crate::node::{Node, NodeFunction};
use crate::state::Context;

#[derive(Default)]
pub struct Registry {
    nodes: HashMap<String, Node>,
    functions: HashMap<String, Arc<dyn NodeFunction>>,
    predicates: HashMap<String, Arc<CustomPredicate>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node definition (overwrites any existing definition
    /// with the same name)
    pub fn define(&mut self, node: Node) {
        self.nodes.insert(node.name.clone(), node);
    }

    /// Look up a node definition
    pub fn node(&self, name: &str) -> Result<&Node, WorkflowError> {
        self.nodes.get(name).ok_or_else(|| WorkflowError::NodeNotFound {
            name: name.to_string(),
        })
    }

    /// Register a function under its own name
    pub fn register_function(&mut self, function: Arc<dyn NodeFunction>) {
        self.functions
            .insert(function.name().to_string(), function);
    }

    pub fn function(&self, name: &str) -> Option<Arc<dyn NodeFunction>> {
        self.functions.get(name).cloned()
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Register a named predicate for `Predicate::Custom` conditions
    pub fn register_predicate<F>(&mut self, name: impl Into<String>, predicate: F)
    where
        F: Fn(&Context) -> bool + Send + Sync + 'static,
    {
        self.predicates.insert(name.into(), Arc::new(predicate));
    }

    pub fn predicate(&self, name: &str) -> Option<Arc<CustomPredicate>> {
        self.predicates.get(name).cloned()
    }

    pub fn has_predicate(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }
}
