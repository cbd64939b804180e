// SPDX-License-Identifier: MIT

//! Typed error handling for trellis-rs
//!
//! Build-time, run-time, and load-time failures are kept in separate
//! enums so callers can match on the phase that failed. Validator
//! findings are advisory values (`validator::Issue`), never errors.

use thiserror::Error;

/// Top-level error type for trellis-rs
#[derive(Debug, Error)]
pub enum TrellisError {
    /// Workflow construction errors
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    /// Workflow execution errors
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Document load/save errors
    #[error(transparent)]
    Manager(#[from] ManagerError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors raised while building a workflow structure
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A node name was not found in the registry
    #[error("Node '{name}' not found in registry")]
    NodeNotFound { name: String },

    /// The declared start node was never added to the workflow
    #[error("Start node '{name}' was never added to the workflow")]
    MissingStartNode { name: String },

    /// sequence() must begin at the workflow's start node
    #[error("sequence() must begin at start node '{expected}', got '{found}'")]
    SequenceStartMismatch { expected: String, found: String },
}

/// Errors raised while executing a workflow
#[derive(Debug, Error)]
pub enum EngineError {
    /// A node's declared inputs are absent from the context.
    /// Indicates a graph/data-flow bug, so it is never retried.
    #[error("Node '{node}' is missing inputs: {missing:?}")]
    MissingInputs { node: String, missing: Vec<String> },

    /// A single attempt exceeded the node's timeout
    #[error("Node '{node}' timed out after {seconds}s")]
    NodeTimeout { node: String, seconds: f64 },

    /// A node exhausted its retry budget
    #[error("Node '{node}' failed after {attempts} attempt(s): {source}")]
    NodeFailed {
        node: String,
        attempts: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A sub-workflow completed without writing its declared output key
    #[error("Sub-workflow node '{node}' did not produce output key '{key}'")]
    SubWorkflowOutputMissing { node: String, key: String },

    /// A node's function payload has no entry in the registry
    #[error("Node '{node}' references unknown function '{function}'")]
    FunctionNotFound { node: String, function: String },

    /// The frontier referenced a node absent from the workflow
    #[error("Unknown node '{name}' in execution frontier")]
    UnknownNode { name: String },

    /// A sub-workflow reference points outside the subflow table
    #[error("Node '{node}' references invalid sub-workflow index {index}")]
    InvalidSubWorkflowRef { node: String, index: usize },
}

impl EngineError {
    /// The failing node's name, when the error is tied to one
    pub fn node_name(&self) -> Option<&str> {
        match self {
            EngineError::MissingInputs { node, .. }
            | EngineError::NodeTimeout { node, .. }
            | EngineError::NodeFailed { node, .. }
            | EngineError::SubWorkflowOutputMissing { node, .. }
            | EngineError::FunctionNotFound { node, .. }
            | EngineError::InvalidSubWorkflowRef { node, .. } => Some(node),
            EngineError::UnknownNode { name } => Some(name),
        }
    }
}

/// Errors raised while loading or saving workflow documents
#[derive(Debug, Error)]
pub enum ManagerError {
    /// I/O errors reading a document file
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// YAML parse/emit errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Embedded function bodies cannot be compiled at load time;
    /// register the function on the Registry instead
    #[error("Function '{name}' is embedded source; register it on the Registry instead")]
    EmbeddedFunction { name: String },

    /// A node references a function absent from both the document's
    /// `functions` section and the registry
    #[error("Node '{node}' references unknown function '{function}'")]
    UnknownFunction { node: String, function: String },

    /// A node definition must carry exactly one payload kind
    #[error("Node '{node}' must define exactly one of `function` or `sub_workflow`")]
    InvalidNodePayload { node: String },
}
