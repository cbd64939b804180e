// SPDX-License-Identifier: MIT

//! Static workflow validation
//!
//! `validate()` is pure and advisory: it returns a list of issues and
//! never fails the workflow itself; the caller decides whether to
//! abort. Sub-workflows are validated recursively with their issues
//! namespaced as `parent_node/child_node`.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::builder::{Transition, Workflow};
use crate::condition::Predicate;
use crate::node::NodePayload;
use crate::registry::Registry;

/// Classification of a validation finding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// A transition or start reference names a node absent from the set
    UnknownNode,
    /// A function payload has no entry in the registry's function table
    UnknownFunction,
    /// A custom predicate name has no entry in the predicate table
    UnknownPredicate,
    /// Condition source text that failed to compile
    InvalidCondition,
    /// A declared input no backward-reachable ancestor produces
    UnproducedInput,
    /// A cycle whose every edge is always-true (would loop forever)
    UnconditionalCycle,
    /// Two fan-out siblings declare the same output key
    ConflictingOutputs,
}

/// One advisory validation finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub kind: IssueKind,
    /// Node or transition location, namespaced `parent/child` inside
    /// sub-workflows
    pub path: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}: {}", self.kind, self.path, self.message)
    }
}

/// Statically analyze a workflow against its registry
pub fn validate(workflow: &Workflow, registry: &Registry) -> Vec<Issue> {
    let mut issues = Vec::new();
    validate_scoped(workflow, registry, "", &mut issues);
    issues
}

fn validate_scoped(workflow: &Workflow, registry: &Registry, prefix: &str, issues: &mut Vec<Issue>) {
    check_references(workflow, registry, prefix, issues);
    check_input_ancestry(workflow, prefix, issues);
    check_unconditional_cycles(workflow, prefix, issues);
    check_conflicting_outputs(workflow, prefix, issues);

    for name in &workflow.order {
        let node = &workflow.nodes[name];
        if let NodePayload::SubWorkflow(subflow_ref) = &node.payload {
            if let Some(inner) = workflow.subflow(*subflow_ref) {
                let nested_prefix = format!("{}{}/", prefix, name);
                validate_scoped(inner, registry, &nested_prefix, issues);
            }
        }
    }
}

fn check_references(
    workflow: &Workflow,
    registry: &Registry,
    prefix: &str,
    issues: &mut Vec<Issue>,
) {
    if !workflow.nodes.contains_key(&workflow.start) {
        issues.push(Issue {
            kind: IssueKind::UnknownNode,
            path: format!("{}{}", prefix, workflow.start),
            message: format!("start node '{}' does not exist", workflow.start),
        });
    }

    for name in &workflow.order {
        let node = &workflow.nodes[name];
        match &node.payload {
            NodePayload::Function(function) => {
                if !registry.has_function(function) {
                    issues.push(Issue {
                        kind: IssueKind::UnknownFunction,
                        path: format!("{}{}", prefix, name),
                        message: format!("function '{}' is not registered", function),
                    });
                }
            }
            NodePayload::SubWorkflow(subflow_ref) => {
                if workflow.subflow(*subflow_ref).is_none() {
                    issues.push(Issue {
                        kind: IssueKind::UnknownNode,
                        path: format!("{}{}", prefix, name),
                        message: format!("sub-workflow index {} is out of range", subflow_ref.0),
                    });
                }
            }
        }
    }

    for transition in &workflow.transitions {
        let location = transition_path(prefix, transition);

        if !workflow.nodes.contains_key(&transition.from) {
            issues.push(Issue {
                kind: IssueKind::UnknownNode,
                path: location.clone(),
                message: format!("transition source '{}' does not exist", transition.from),
            });
        }
        for target in &transition.to {
            if !workflow.nodes.contains_key(target) {
                issues.push(Issue {
                    kind: IssueKind::UnknownNode,
                    path: location.clone(),
                    message: format!("transition target '{}' does not exist", target),
                });
            }
        }

        match &transition.condition {
            Predicate::Custom(name) if !registry.has_predicate(name) => {
                issues.push(Issue {
                    kind: IssueKind::UnknownPredicate,
                    path: location.clone(),
                    message: format!("custom predicate '{}' is not registered", name),
                });
            }
            Predicate::Invalid { source } => {
                issues.push(Issue {
                    kind: IssueKind::InvalidCondition,
                    path: location.clone(),
                    message: format!("condition '{}' failed to compile", source),
                });
            }
            _ => {}
        }
    }
}

/// Every declared input must be produced (as some node's output) by an
/// ancestor reachable backward through the transition graph.
fn check_input_ancestry(workflow: &Workflow, prefix: &str, issues: &mut Vec<Issue>) {
    let mut predecessors: HashMap<&str, Vec<&str>> = HashMap::new();
    for transition in &workflow.transitions {
        for target in &transition.to {
            predecessors
                .entry(target.as_str())
                .or_default()
                .push(transition.from.as_str());
        }
    }

    for name in &workflow.order {
        let node = &workflow.nodes[name];
        if node.inputs.is_empty() {
            continue;
        }

        // walk predecessor edges backward from this node
        let mut produced: HashSet<&str> = HashSet::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: Vec<&str> = predecessors.get(name.as_str()).cloned().unwrap_or_default();
        while let Some(ancestor) = queue.pop() {
            if !seen.insert(ancestor) {
                continue;
            }
            if let Some(ancestor_node) = workflow.nodes.get(ancestor) {
                if let Some(output) = &ancestor_node.output {
                    produced.insert(output.as_str());
                }
            }
            if let Some(more) = predecessors.get(ancestor) {
                queue.extend(more.iter().copied());
            }
        }

        for input in &node.inputs {
            if !produced.contains(input.as_str()) {
                issues.push(Issue {
                    kind: IssueKind::UnproducedInput,
                    path: format!("{}{}", prefix, name),
                    message: format!("input '{}' has no producing ancestor", input),
                });
            }
        }
    }
}

/// DFS over the subgraph of always-true edges; any cycle there would
/// spin forever at run time.
fn check_unconditional_cycles(workflow: &Workflow, prefix: &str, issues: &mut Vec<Issue>) {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for transition in &workflow.transitions {
        if transition.condition.is_always() {
            for target in &transition.to {
                adjacency
                    .entry(transition.from.as_str())
                    .or_default()
                    .push(target.as_str());
            }
        }
    }

    let mut finished: HashSet<&str> = HashSet::new();
    let mut reported: HashSet<String> = HashSet::new();

    for name in &workflow.order {
        let mut stack: Vec<&str> = Vec::new();
        let mut on_stack: HashSet<&str> = HashSet::new();
        dfs_cycles(
            name.as_str(),
            &adjacency,
            &mut stack,
            &mut on_stack,
            &mut finished,
            &mut reported,
            prefix,
            issues,
        );
    }
}

#[allow(clippy::too_many_arguments)]
fn dfs_cycles<'a>(
    node: &'a str,
    adjacency: &HashMap<&'a str, Vec<&'a str>>,
    stack: &mut Vec<&'a str>,
    on_stack: &mut HashSet<&'a str>,
    finished: &mut HashSet<&'a str>,
    reported: &mut HashSet<String>,
    prefix: &str,
    issues: &mut Vec<Issue>,
) {
    if finished.contains(node) {
        return;
    }
    if !on_stack.insert(node) {
        // found a back-edge: the cycle is the stack suffix from `node`
        let pos = stack.iter().position(|n| *n == node).unwrap_or(0);
        let mut cycle: Vec<&str> = stack[pos..].to_vec();
        cycle.push(node);
        let rendered = cycle.join(" -> ");
        if reported.insert(rendered.clone()) {
            issues.push(Issue {
                kind: IssueKind::UnconditionalCycle,
                path: format!("{}{}", prefix, node),
                message: format!("unconditional circular transition: {}", rendered),
            });
        }
        return;
    }
    stack.push(node);

    if let Some(targets) = adjacency.get(node) {
        for target in targets {
            dfs_cycles(
                target, adjacency, stack, on_stack, finished, reported, prefix, issues,
            );
        }
    }

    stack.pop();
    on_stack.remove(node);
    finished.insert(node);
}

/// Two targets of one fan-out transition writing the same output key
/// would race; flag it statically (the engine does not serialize such
/// writes).
fn check_conflicting_outputs(workflow: &Workflow, prefix: &str, issues: &mut Vec<Issue>) {
    for transition in &workflow.transitions {
        if transition.to.len() < 2 {
            continue;
        }
        let mut writers: HashMap<&str, Vec<&str>> = HashMap::new();
        for target in &transition.to {
            if let Some(node) = workflow.nodes.get(target) {
                if let Some(output) = &node.output {
                    writers.entry(output.as_str()).or_default().push(target);
                }
            }
        }
        for (output, nodes) in writers {
            if nodes.len() > 1 {
                issues.push(Issue {
                    kind: IssueKind::ConflictingOutputs,
                    path: transition_path(prefix, transition),
                    message: format!(
                        "nodes {:?} fan out together but all write output '{}'",
                        nodes, output
                    ),
                });
            }
        }
    }
}

fn transition_path(prefix: &str, transition: &Transition) -> String {
    format!(
        "{}{} -> {}",
        prefix,
        transition.from,
        transition.to.join(", ")
    )
}
