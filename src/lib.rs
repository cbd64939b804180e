// SPDX-License-Identifier: MIT

//! Declarative workflow orchestration.
//!
//! A workflow is a directed graph of named nodes built fluently through
//! [`WorkflowBuilder`] or loaded from a YAML document through
//! [`Manager`]. The async [`Engine`] executes it frontier by frontier
//! with per-node retry, backoff, and timeout policy; [`validator`]
//! checks the static structure before execution; [`diagram`] renders it
//! as a Mermaid flowchart.
//!
//! ```rust,ignore
//! let mut registry = Registry::new();
//! registry.define(Node::function("classify", "classify_fn").with_output("intent"));
//! registry.register_function(Arc::new(ClassifyFn));
//!
//! let engine = WorkflowBuilder::new(Arc::new(registry), "classify")
//!     .node("classify")
//!     .then_if("search", Predicate::parse("intent == 'search'"))
//!     .build()?;
//! let state = engine.run(initial_context).await?;
//! ```

pub mod builder;
pub mod condition;
pub mod diagram;
pub mod document;
pub mod engine;
pub mod error;
pub mod manager;
pub mod node;
pub mod registry;
pub mod state;
pub mod validator;

pub use builder::{Transition, Workflow, WorkflowBuilder};
pub use condition::Predicate;
pub use engine::Engine;
pub use error::{EngineError, ManagerError, TrellisError, WorkflowError};
pub use manager::Manager;
pub use node::{Node, NodeFunction, NodePayload, WorkflowRef};
pub use registry::Registry;
pub use state::{Context, NodeStatus, WorkflowState};
pub use validator::{validate, Issue, IssueKind};
