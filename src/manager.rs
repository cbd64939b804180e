// SPDX-License-Identifier: MIT

//! Workflow (de)serialization
//!
//! `load` materializes a `Workflow` from a declarative document,
//! resolving function references through the registry and compiling
//! condition text into predicates. `save` is the inverse. Loading is
//! strict about structure (payload shape, function resolution) and
//! lenient about graph semantics, which stay the validator's concern:
//! malformed condition text loads as `Predicate::Invalid`, dangling
//! transition targets load as written.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::builder::{Transition, Workflow};
use crate::condition::Predicate;
use crate::document::{
    FunctionDef, NodeDef, StructureDef, SubWorkflowDef, Targets, TransitionDef, WorkflowDocument,
};
use crate::error::ManagerError;
use crate::node::{Node, NodePayload, WorkflowRef};
use crate::registry::Registry;

pub struct Manager;

impl Manager {
    /// Materialize a workflow from a parsed document
    pub fn load(doc: &WorkflowDocument, registry: &Registry) -> Result<Workflow, ManagerError> {
        let workflow = build_workflow(
            &doc.workflow.start,
            &doc.nodes,
            &doc.workflow.transitions,
            &doc.functions,
            registry,
        )?;
        log::info!(
            "Loaded workflow starting at '{}' with {} node(s)",
            workflow.start,
            workflow.order.len()
        );
        Ok(workflow)
    }

    /// Parse and materialize from YAML text
    pub fn load_str(yaml: &str, registry: &Registry) -> Result<Workflow, ManagerError> {
        let doc: WorkflowDocument = serde_yaml::from_str(yaml)?;
        Self::load(&doc, registry)
    }

    /// Read, parse, and materialize from a YAML file
    pub fn load_file<P: AsRef<Path>>(
        path: P,
        registry: &Registry,
    ) -> Result<Workflow, ManagerError> {
        let content = std::fs::read_to_string(path)?;
        Self::load_str(&content, registry)
    }

    /// Serialize a workflow back to its document form
    pub fn save(workflow: &Workflow) -> WorkflowDocument {
        WorkflowDocument {
            functions: BTreeMap::new(),
            nodes: save_nodes(workflow),
            workflow: StructureDef {
                start: workflow.start.clone(),
                transitions: save_transitions(&workflow.transitions),
            },
        }
    }

    /// Serialize a workflow to YAML text
    pub fn to_yaml(workflow: &Workflow) -> Result<String, ManagerError> {
        Ok(serde_yaml::to_string(&Self::save(workflow))?)
    }
}

fn build_workflow(
    start: &str,
    node_defs: &BTreeMap<String, NodeDef>,
    transition_defs: &[TransitionDef],
    functions: &BTreeMap<String, FunctionDef>,
    registry: &Registry,
) -> Result<Workflow, ManagerError> {
    let mut order = Vec::new();
    let mut nodes = HashMap::new();
    let mut subflows = Vec::new();

    for (name, def) in node_defs {
        let payload = match (&def.function, &def.sub_workflow) {
            (Some(function), None) => {
                let symbol = resolve_function(name, function, functions, registry)?;
                NodePayload::Function(symbol)
            }
            (None, Some(sub)) => {
                let inner = build_workflow(
                    &sub.start,
                    &sub.nodes,
                    &sub.transitions,
                    functions,
                    registry,
                )?;
                let index = subflows.len();
                subflows.push(inner);
                NodePayload::SubWorkflow(WorkflowRef(index))
            }
            _ => {
                return Err(ManagerError::InvalidNodePayload {
                    node: name.clone(),
                })
            }
        };

        let node = Node {
            name: name.clone(),
            inputs: def.inputs.clone(),
            output: def.output.clone(),
            retries: def.retries,
            delay: def.delay,
            timeout: def.timeout,
            parallel: def.parallel,
            payload,
        };
        order.push(name.clone());
        nodes.insert(name.clone(), node);
    }

    let transitions = transition_defs
        .iter()
        .map(|def| Transition {
            from: def.from.clone(),
            to: def.to.to_vec(),
            condition: match &def.condition {
                Some(text) => Predicate::parse(text),
                None => Predicate::Always,
            },
        })
        .collect();

    Ok(Workflow {
        start: start.to_string(),
        order,
        nodes,
        transitions,
        subflows,
    })
}

/// Resolve a node's function reference to a registry symbol.
///
/// The reference may name an entry in the document's `functions`
/// section or a registered function directly.
fn resolve_function(
    node: &str,
    reference: &str,
    functions: &BTreeMap<String, FunctionDef>,
    registry: &Registry,
) -> Result<String, ManagerError> {
    let symbol = match functions.get(reference) {
        Some(FunctionDef::Embedded { .. }) => {
            return Err(ManagerError::EmbeddedFunction {
                name: reference.to_string(),
            })
        }
        Some(FunctionDef::External { function, .. }) => function.clone(),
        None => reference.to_string(),
    };

    if !registry.has_function(&symbol) {
        return Err(ManagerError::UnknownFunction {
            node: node.to_string(),
            function: symbol,
        });
    }
    Ok(symbol)
}

fn save_nodes(workflow: &Workflow) -> BTreeMap<String, NodeDef> {
    workflow
        .order
        .iter()
        .map(|name| {
            let node = &workflow.nodes[name];
            let mut def = NodeDef {
                inputs: node.inputs.clone(),
                output: node.output.clone(),
                retries: node.retries,
                delay: node.delay,
                timeout: node.timeout,
                parallel: node.parallel,
                ..NodeDef::default()
            };
            match &node.payload {
                NodePayload::Function(symbol) => def.function = Some(symbol.clone()),
                NodePayload::SubWorkflow(subflow_ref) => {
                    if let Some(inner) = workflow.subflow(*subflow_ref) {
                        def.sub_workflow = Some(Box::new(SubWorkflowDef {
                            start: inner.start.clone(),
                            nodes: save_nodes(inner),
                            transitions: save_transitions(&inner.transitions),
                        }));
                    }
                }
            }
            (name.clone(), def)
        })
        .collect()
}

fn save_transitions(transitions: &[Transition]) -> Vec<TransitionDef> {
    transitions
        .iter()
        .map(|t| TransitionDef {
            from: t.from.clone(),
            to: Targets::from_vec(t.to.clone()),
            condition: t.condition.to_source(),
        })
        .collect()
}
