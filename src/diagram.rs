// SPDX-License-Identifier: MIT

//! Mermaid rendering
//!
//! Projects a workflow's static structure into a `flowchart TD` text
//! block for documentation and debugging. Purely observational: never
//! mutates the workflow and knows nothing about execution. The output
//! is deterministic, following node insertion order and transition
//! declaration order.

use std::fmt::Write;

use crate::builder::Workflow;
use crate::node::NodePayload;

/// Maximum length of a condition label before it is truncated
const MAX_LABEL_LEN: usize = 30;

/// Render the workflow as a Mermaid flowchart.
///
/// Node shapes classify the payload: `name[name]` for function nodes,
/// `name[[name]]` for sub-workflows. Unconditional single-target edges
/// use `-->`, conditional edges carry their condition text as an edge
/// label, and fan-out edges use `==>`. Nodes with more than one
/// incoming transition are styled as convergence points.
pub fn render(workflow: &Workflow) -> String {
    let mut diagram = String::from("flowchart TD\n");

    let _ = writeln!(diagram, "    Start([Start]) --> {}", workflow.start);

    for name in &workflow.order {
        match workflow.nodes[name].payload {
            NodePayload::Function(_) => {
                let _ = writeln!(diagram, "    {name}[{name}]");
            }
            NodePayload::SubWorkflow(_) => {
                let _ = writeln!(diagram, "    {name}[[{name}]]");
            }
        }
    }

    for transition in &workflow.transitions {
        if transition.to.len() > 1 {
            let label = transition.condition.to_source().map(|s| edge_label(&s));
            for target in &transition.to {
                match &label {
                    Some(label) => {
                        let _ = writeln!(
                            diagram,
                            "    {} ==>|{}| {}",
                            transition.from, label, target
                        );
                    }
                    None => {
                        let _ = writeln!(diagram, "    {} ==> {}", transition.from, target);
                    }
                }
            }
        } else if let Some(target) = transition.to.first() {
            match transition.condition.to_source() {
                Some(source) => {
                    let _ = writeln!(
                        diagram,
                        "    {} -->|{}| {}",
                        transition.from,
                        edge_label(&source),
                        target
                    );
                }
                None => {
                    let _ = writeln!(diagram, "    {} --> {}", transition.from, target);
                }
            }
        }
    }

    diagram.push_str("\n    %% Styling\n");
    diagram.push_str("    classDef startStyle fill:#e1f5e1,stroke:#4caf50,stroke-width:3px\n");
    diagram.push_str("    classDef nodeStyle fill:#e3f2fd,stroke:#2196f3,stroke-width:2px\n");
    diagram.push_str("    classDef convergeStyle fill:#fff3e0,stroke:#ff9800,stroke-width:2px\n");
    diagram.push_str("    class Start startStyle\n");

    let (converging, plain): (Vec<_>, Vec<_>) = workflow
        .order
        .iter()
        .cloned()
        .partition(|name| workflow.incoming_count(name) > 1);
    if !plain.is_empty() {
        let _ = writeln!(diagram, "    class {} nodeStyle", plain.join(","));
    }
    if !converging.is_empty() {
        let _ = writeln!(diagram, "    class {} convergeStyle", converging.join(","));
    }

    diagram
}

/// Truncate condition text and strip characters Mermaid treats as
/// edge-label delimiters.
fn edge_label(source: &str) -> String {
    let cleaned: String = source
        .chars()
        .map(|c| if c == '|' { ' ' } else { c })
        .collect();
    if cleaned.chars().count() > MAX_LABEL_LEN {
        let truncated: String = cleaned.chars().take(MAX_LABEL_LEN).collect();
        format!("{truncated}...")
    } else {
        cleaned
    }
}
