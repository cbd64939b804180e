// SPDX-License-Identifier: MIT

//! Runtime state for workflow execution
//!
//! `WorkflowState` is created fresh for every `run()` and mutated in
//! place by the engine for the lifetime of that run. The context is
//! append/overwrite only; keys are never deleted during a run.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use uuid::Uuid;

/// The shared key-value store threaded through a workflow run
pub type Context = HashMap<String, Value>;

/// Per-node execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    Pending,
    Running,
    Success,
    Failed,
}

/// Runtime workflow state
#[derive(Debug, Clone)]
pub struct WorkflowState {
    /// Opaque unique id for this run
    pub execution_id: Uuid,
    /// The active frontier: nodes eligible to execute in the current step
    pub current_nodes: BTreeSet<String>,
    /// Shared context, written by node outputs and read by node inputs
    pub context: Context,
    /// Node name -> execution status
    pub status: HashMap<String, NodeStatus>,
    /// Refreshed on every mutation
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    /// Create a fresh state seeded with the caller's initial context
    pub fn new(context: Context) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            current_nodes: BTreeSet::new(),
            context,
            status: HashMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Write a context key (insert or overwrite)
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
        self.touch();
    }

    /// Record a node's status
    pub fn set_status(&mut self, node: impl Into<String>, status: NodeStatus) {
        self.status.insert(node.into(), status);
        self.touch();
    }

    /// Replace the active frontier
    pub fn set_frontier(&mut self, nodes: BTreeSet<String>) {
        self.current_nodes = nodes;
        self.touch();
    }

    /// Get a context value by exact key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Get a possibly-nested context value using dot notation
/// (e.g. "result.intent"). Falls back to the exact key when the dotted
/// lookup misses, so keys that themselves contain dots still resolve.
pub fn get_path<'a>(context: &'a Context, path: &str) -> Option<&'a Value> {
    if let Some(value) = context.get(path) {
        return Some(value);
    }

    let mut parts = path.split('.');
    let mut current = context.get(parts.next()?)?;
    for part in parts {
        current = current.get(part)?;
    }
    Some(current)
}
