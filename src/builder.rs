// SPDX-License-Identifier: MIT

//! Workflow structure and fluent construction API
//!
//! The builder stays permissive during staged construction: unknown
//! node names and sequence misuse are recorded and surfaced by
//! `build()`, so chains can be assembled in any order. Graph-level
//! problems (dangling targets, cycles, data-flow gaps) are the
//! validator's concern.

use std::collections::HashMap;
use std::sync::Arc;

use crate::condition::Predicate;
use crate::engine::Engine;
use crate::error::WorkflowError;
use crate::node::{Node, WorkflowRef};
use crate::registry::Registry;

/// A directed, optionally-conditional edge. `to.len() > 1` means
/// concurrent fan-out to every target.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: String,
    pub to: Vec<String>,
    pub condition: Predicate,
}

/// An immutable, built workflow graph
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    pub start: String,
    /// Node names in insertion order, for deterministic traversal
    pub order: Vec<String>,
    pub nodes: HashMap<String, Node>,
    pub transitions: Vec<Transition>,
    /// Flat table of embedded sub-workflows, indexed by `WorkflowRef`
    pub subflows: Vec<Workflow>,
}

impl Workflow {
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn subflow(&self, r: WorkflowRef) -> Option<&Workflow> {
        self.subflows.get(r.0)
    }

    /// All transitions leaving the given node
    pub fn transitions_from<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Transition> {
        self.transitions.iter().filter(move |t| t.from == name)
    }

    /// How many transitions target the given node (counting fan-out
    /// membership); >1 marks a convergence node
    pub fn incoming_count(&self, name: &str) -> usize {
        self.transitions
            .iter()
            .filter(|t| t.to.iter().any(|to| to == name))
            .count()
    }
}

/// Fluent workflow builder bound to an explicit registry
pub struct WorkflowBuilder {
    registry: Arc<Registry>,
    start: String,
    order: Vec<String>,
    nodes: HashMap<String, Node>,
    transitions: Vec<Transition>,
    subflows: Vec<Workflow>,
    last_added: Option<String>,
    errors: Vec<WorkflowError>,
}

impl WorkflowBuilder {
    /// Start building a workflow whose entry node is `start`. The start
    /// node itself must still be added (via `node()`, `sequence()`, or
    /// `add_sub_workflow()`) before `build()`.
    pub fn new(registry: Arc<Registry>, start: impl Into<String>) -> Self {
        Self {
            registry,
            start: start.into(),
            order: Vec::new(),
            nodes: HashMap::new(),
            transitions: Vec::new(),
            subflows: Vec::new(),
            last_added: None,
            errors: Vec::new(),
        }
    }

    /// Copy a node definition from the registry into this workflow
    pub fn node(mut self, name: &str) -> Self {
        self.ensure_node(name);
        self.last_added = Some(name.to_string());
        self
    }

    /// Unconditional edge from the most-recently-added node to `target`
    pub fn then(self, target: &str) -> Self {
        self.then_if(target, Predicate::Always)
    }

    /// Conditional edge from the most-recently-added node to `target`
    pub fn then_if(mut self, target: &str, condition: Predicate) -> Self {
        let from = self.edge_source();
        self.ensure_node(target);
        self.transitions.push(Transition {
            from,
            to: vec![target.to_string()],
            condition,
        });
        self.last_added = Some(target.to_string());
        self
    }

    /// Concurrent fan-out from the most-recently-added node to every
    /// target, as a single transition
    pub fn parallel<I, S>(self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.parallel_if(targets, Predicate::Always)
    }

    /// Conditional fan-out; the whole target set is guarded together
    pub fn parallel_if<I, S>(mut self, targets: I, condition: Predicate) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let from = self.edge_source();
        let to: Vec<String> = targets
            .into_iter()
            .map(|t| t.as_ref().to_string())
            .collect();
        for target in &to {
            self.ensure_node(target);
        }
        if let Some(last) = to.last() {
            self.last_added = Some(last.clone());
        }
        self.transitions.push(Transition {
            from,
            to,
            condition,
        });
        self
    }

    /// Sugar for a straight `then()` chain. The first name must equal
    /// the workflow's declared start node.
    pub fn sequence<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = names.into_iter();
        let first = match names.next() {
            Some(first) => first,
            None => return self,
        };
        if first.as_ref() != self.start {
            self.errors.push(WorkflowError::SequenceStartMismatch {
                expected: self.start.clone(),
                found: first.as_ref().to_string(),
            });
            return self;
        }
        self = self.node(first.as_ref());
        for name in names {
            self = self.then(name.as_ref());
        }
        self
    }

    /// Back-edge from `from` to `to`. The validator flags back-edges
    /// whose condition is always-true; the builder accepts them so the
    /// graph can be assembled in stages.
    pub fn loop_to(mut self, from: &str, to: &str, condition: Predicate) -> Self {
        self.transitions.push(Transition {
            from: from.to_string(),
            to: vec![to.to_string()],
            condition,
        });
        self
    }

    /// Embed another workflow as a single node. The inner workflow
    /// shares the parent's context at run time.
    pub fn add_sub_workflow<I, S>(
        mut self,
        name: &str,
        inner: Workflow,
        inputs: I,
        output: Option<&str>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let index = self.subflows.len();
        self.subflows.push(inner);

        let mut node = Node::sub_workflow(name, WorkflowRef(index)).with_inputs(inputs);
        if let Some(output) = output {
            node = node.with_output(output);
        }
        self.insert_node(node);
        self.last_added = Some(name.to_string());
        self
    }

    /// Finish construction and bind an engine to the structure
    pub fn build(self) -> Result<Engine, WorkflowError> {
        let registry = self.registry.clone();
        let workflow = self.build_workflow()?;
        Ok(Engine::new(Arc::new(workflow), registry))
    }

    /// Finish construction and return the bare structure (for the
    /// validator, manager, or diagram renderer)
    pub fn build_workflow(mut self) -> Result<Workflow, WorkflowError> {
        if !self.nodes.contains_key(&self.start) {
            return Err(WorkflowError::MissingStartNode {
                name: self.start.clone(),
            });
        }
        if !self.errors.is_empty() {
            return Err(self.errors.remove(0));
        }
        Ok(Workflow {
            start: self.start,
            order: self.order,
            nodes: self.nodes,
            transitions: self.transitions,
            subflows: self.subflows,
        })
    }

    fn edge_source(&self) -> String {
        self.last_added.clone().unwrap_or_else(|| self.start.clone())
    }

    fn ensure_node(&mut self, name: &str) {
        if self.nodes.contains_key(name) {
            return;
        }
        match self.registry.node(name) {
            Ok(node) => {
                let node = node.clone();
                self.insert_node(node);
            }
            Err(err) => self.errors.push(err),
        }
    }

    fn insert_node(&mut self, node: Node) {
        if !self.nodes.contains_key(&node.name) {
            self.order.push(node.name.clone());
        }
        self.nodes.insert(node.name.clone(), node);
    }
}
