// SPDX-License-Identifier: MIT

//! Declarative document schema
//!
//! Serde types for the YAML workflow document. Maps are `BTreeMap` so
//! emitted documents are reproducible; transitions keep their
//! structural order.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::node::{DEFAULT_DELAY, DEFAULT_RETRIES};

/// Top-level workflow document
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct WorkflowDocument {
    /// Named function definitions, resolved through the registry
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub functions: BTreeMap<String, FunctionDef>,
    /// Node definitions keyed by node name
    pub nodes: BTreeMap<String, NodeDef>,
    /// The graph structure: start node plus transitions
    pub workflow: StructureDef,
}

/// How a document-level function name maps to an executable body
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FunctionDef {
    /// Inline source text. Accepted by the schema for compatibility,
    /// rejected at load time: a compiled implementation cannot compile
    /// embedded source.
    Embedded { code: String },
    /// Reference to a function registered on the registry; `module` is
    /// carried for document fidelity only
    External { module: String, function: String },
}

/// Serialized mirror of a `Node`; exactly one payload field must be set
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct NodeDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_workflow: Option<Box<SubWorkflowDef>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_delay")]
    pub delay: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub parallel: bool,
}

impl Default for NodeDef {
    fn default() -> Self {
        Self {
            function: None,
            sub_workflow: None,
            inputs: Vec::new(),
            output: None,
            retries: DEFAULT_RETRIES,
            delay: DEFAULT_DELAY,
            timeout: None,
            parallel: false,
        }
    }
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_delay() -> f64 {
    DEFAULT_DELAY
}

/// A nested workflow embedded in a node definition
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct SubWorkflowDef {
    pub start: String,
    pub nodes: BTreeMap<String, NodeDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<TransitionDef>,
}

/// Start node and edge list
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Default)]
pub struct StructureDef {
    pub start: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transitions: Vec<TransitionDef>,
}

/// Serialized transition; `to` accepts a string or a list
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TransitionDef {
    pub from: String,
    pub to: Targets,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// Transition target specification (single name or fan-out list)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Targets {
    Single(String),
    Multiple(Vec<String>),
}

impl Targets {
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Targets::Single(s) => vec![s.clone()],
            Targets::Multiple(v) => v.clone(),
        }
    }

    /// Collapse to the compact single form when there is one target
    pub fn from_vec(mut targets: Vec<String>) -> Self {
        if targets.len() == 1 {
            Targets::Single(targets.remove(0))
        } else {
            Targets::Multiple(targets)
        }
    }
}
