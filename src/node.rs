// SPDX-License-Identifier: MIT

//! Node definitions
//!
//! A `Node` is an immutable build-time artifact: a named unit of work
//! plus its retry/timeout policy. The payload is exactly one of a
//! function reference (resolved through the registry's function table at
//! run time) or a sub-workflow reference (an index into the enclosing
//! workflow's subflow table).

use async_trait::async_trait;
use serde_json::Value;
use std::error::Error;

use crate::state::Context;

/// Default retry budget (total attempts)
pub const DEFAULT_RETRIES: u32 = 3;
/// Default base backoff in seconds
pub const DEFAULT_DELAY: f64 = 1.0;

/// Index into a workflow's flat subflow table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkflowRef(pub usize);

/// What a node executes
#[derive(Debug, Clone, PartialEq)]
pub enum NodePayload {
    /// Name of a function in the registry's function table
    Function(String),
    /// Reference to an embedded sub-workflow
    SubWorkflow(WorkflowRef),
}

/// A named unit of work in the workflow graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Unique name within a workflow
    pub name: String,
    /// Parameter names consumed from the context
    pub inputs: Vec<String>,
    /// Context key the return value is written to, if any
    pub output: Option<String>,
    /// Total attempt budget; 0 is treated as a single attempt
    pub retries: u32,
    /// Base backoff in seconds; the sleep before attempt n is
    /// `delay * 2^(n-2)` for n >= 2
    pub delay: f64,
    /// Per-attempt wall-clock bound in seconds
    pub timeout: Option<f64>,
    /// Advisory hint that this node is safe to fan out with siblings
    pub parallel: bool,
    pub payload: NodePayload,
}

impl Node {
    /// A node backed by a registered function
    pub fn function(name: impl Into<String>, function: impl Into<String>) -> Self {
        Self::with_payload(name, NodePayload::Function(function.into()))
    }

    /// A node backed by a sub-workflow table entry
    pub fn sub_workflow(name: impl Into<String>, subflow: WorkflowRef) -> Self {
        Self::with_payload(name, NodePayload::SubWorkflow(subflow))
    }

    fn with_payload(name: impl Into<String>, payload: NodePayload) -> Self {
        Self {
            name: name.into(),
            inputs: Vec::new(),
            output: None,
            retries: DEFAULT_RETRIES,
            delay: DEFAULT_DELAY,
            timeout: None,
            parallel: false,
            payload,
        }
    }

    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_delay(mut self, delay: f64) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: f64) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }
}

/// An asynchronous node body.
///
/// `args` holds exactly the node's declared inputs, cloned from the
/// context at call time. The return value is written to the node's
/// `output` key when one is declared.
#[async_trait]
pub trait NodeFunction: Send + Sync {
    fn name(&self) -> &str;

    async fn call(&self, args: Context) -> Result<Value, Box<dyn Error + Send + Sync>>;
}
