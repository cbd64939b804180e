// SPDX-License-Identifier: MIT

//! Runtime workflow engine
//!
//! The engine drives a step loop over the frontier of active nodes:
//! every frontier node executes concurrently, the step joins at a
//! strict barrier, write-sets merge into the shared context, and the
//! next frontier is the union of all transition targets whose
//! conditions hold against the updated context. The run ends when the
//! frontier empties; the first fatal node error aborts the run and
//! drops the sibling executions of that step.

use futures::future::try_join_all;
use std::collections::BTreeSet;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use crate::builder::Workflow;
use crate::error::EngineError;
use crate::node::{Node, NodePayload};
use crate::registry::Registry;
use crate::state::{Context, NodeStatus, WorkflowState};

/// Executes a built workflow against a registry of functions and
/// predicates
pub struct Engine {
    workflow: Arc<Workflow>,
    registry: Arc<Registry>,
}

/// One attempt's outcome, separating what may be retried from what
/// must not be
enum AttemptFailure {
    /// Never retried: graph/data-flow bugs, not transient faults
    Fatal(EngineError),
    /// The attempt exceeded the node's timeout; retryable
    Timeout,
    /// The node function failed; retryable with backoff
    Function(Box<dyn Error + Send + Sync>),
}

impl Engine {
    pub fn new(workflow: Arc<Workflow>, registry: Arc<Registry>) -> Self {
        Self { workflow, registry }
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Execute the workflow to completion. Returns the final state, or
    /// the first unrecovered node error with the failing node attached.
    pub async fn run(&self, initial_context: Context) -> Result<WorkflowState, EngineError> {
        let mut state = WorkflowState::new(initial_context);
        self.enter_frontier(&mut state, BTreeSet::from([self.workflow.start.clone()]));

        let mut step = 0u32;
        while !state.current_nodes.is_empty() {
            step += 1;
            log::info!(
                "Step {}: executing {} node(s): {:?}",
                step,
                state.current_nodes.len(),
                state.current_nodes
            );

            self.step(&mut state).await?;

            let next = self.next_frontier(&state);
            self.enter_frontier(&mut state, next);
        }

        log::info!(
            "Run {} complete after {} step(s)",
            state.execution_id,
            step
        );
        Ok(state)
    }

    /// Execute every frontier node concurrently, then merge their
    /// write-sets into the context. The first failure drops the other
    /// in-flight executions of this step and aborts the run.
    async fn step(&self, state: &mut WorkflowState) -> Result<(), EngineError> {
        let frontier: Vec<String> = state.current_nodes.iter().cloned().collect();
        for name in &frontier {
            state.set_status(name.clone(), NodeStatus::Running);
        }

        let snapshot = state.context.clone();
        let executions = frontier.iter().map(|name| {
            let context = snapshot.clone();
            async move {
                let node = self
                    .workflow
                    .node(name)
                    .ok_or_else(|| EngineError::UnknownNode { name: name.clone() })?;
                let writes = self.execute_node(node, context).await?;
                Ok::<(String, Context), EngineError>((name.clone(), writes))
            }
        });

        match try_join_all(executions).await {
            Ok(results) => {
                for (name, writes) in results {
                    for (key, value) in writes {
                        state.insert(key, value);
                    }
                    state.set_status(name, NodeStatus::Success);
                }
                Ok(())
            }
            Err(err) => {
                if let Some(node) = err.node_name() {
                    state.set_status(node.to_string(), NodeStatus::Failed);
                }
                Err(err)
            }
        }
    }

    /// Evaluate all outgoing transitions of every frontier node and
    /// union the target sets
    fn next_frontier(&self, state: &WorkflowState) -> BTreeSet<String> {
        let mut next = BTreeSet::new();
        for name in &state.current_nodes {
            for transition in self.workflow.transitions_from(name) {
                if transition
                    .condition
                    .evaluate(&state.context, &self.registry)
                {
                    next.extend(transition.to.iter().cloned());
                }
            }
        }
        next
    }

    fn enter_frontier(&self, state: &mut WorkflowState, frontier: BTreeSet<String>) {
        for name in &frontier {
            state.set_status(name.clone(), NodeStatus::Pending);
        }
        state.set_frontier(frontier);
    }

    /// Run one node through its retry/timeout policy. Returns the
    /// node's write-set (merged by the caller after the step barrier).
    async fn execute_node(&self, node: &Node, context: Context) -> Result<Context, EngineError> {
        let missing: Vec<String> = node
            .inputs
            .iter()
            .filter(|input| !context.contains_key(*input))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::MissingInputs {
                node: node.name.clone(),
                missing,
            });
        }

        let attempts = node.retries.max(1);
        let mut last_failure: Option<AttemptFailure> = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let backoff = node.delay * 2f64.powi(attempt as i32 - 1);
                log::info!(
                    "Node '{}' attempt {}/{} after {:.2}s backoff",
                    node.name,
                    attempt + 1,
                    attempts,
                    backoff
                );
                sleep(Duration::from_secs_f64(backoff)).await;
            }

            match self.attempt(node, context.clone()).await {
                Ok(writes) => return Ok(writes),
                Err(AttemptFailure::Fatal(err)) => return Err(err),
                Err(failure) => {
                    if let AttemptFailure::Function(err) = &failure {
                        log::warn!("Node '{}' attempt {} failed: {}", node.name, attempt + 1, err);
                    } else {
                        log::warn!("Node '{}' attempt {} timed out", node.name, attempt + 1);
                    }
                    last_failure = Some(failure);
                }
            }
        }

        match last_failure {
            Some(AttemptFailure::Timeout) => Err(EngineError::NodeTimeout {
                node: node.name.clone(),
                seconds: node.timeout.unwrap_or_default(),
            }),
            Some(AttemptFailure::Function(source)) => Err(EngineError::NodeFailed {
                node: node.name.clone(),
                attempts,
                source,
            }),
            // unreachable: the loop always runs at least once
            _ => Err(EngineError::NodeFailed {
                node: node.name.clone(),
                attempts,
                source: "node produced no result".into(),
            }),
        }
    }

    /// A single attempt, bounded by the node's timeout when one is set
    async fn attempt(&self, node: &Node, context: Context) -> Result<Context, AttemptFailure> {
        let execution = self.invoke(node, context);
        match node.timeout {
            Some(seconds) => {
                match timeout(Duration::from_secs_f64(seconds), execution).await {
                    Ok(result) => result,
                    Err(_) => Err(AttemptFailure::Timeout),
                }
            }
            None => execution.await,
        }
    }

    async fn invoke(&self, node: &Node, context: Context) -> Result<Context, AttemptFailure> {
        match &node.payload {
            NodePayload::Function(function_name) => {
                let function = self.registry.function(function_name).ok_or_else(|| {
                    AttemptFailure::Fatal(EngineError::FunctionNotFound {
                        node: node.name.clone(),
                        function: function_name.clone(),
                    })
                })?;

                let args: Context = node
                    .inputs
                    .iter()
                    .filter_map(|input| context.get(input).map(|v| (input.clone(), v.clone())))
                    .collect();

                log::info!("Executing node: {}", node.name);
                let value = function.call(args).await.map_err(AttemptFailure::Function)?;

                let mut writes = Context::new();
                if let Some(output) = &node.output {
                    writes.insert(output.clone(), value);
                }
                Ok(writes)
            }
            NodePayload::SubWorkflow(subflow_ref) => {
                let subflow = self.workflow.subflow(*subflow_ref).ok_or_else(|| {
                    AttemptFailure::Fatal(EngineError::InvalidSubWorkflowRef {
                        node: node.name.clone(),
                        index: subflow_ref.0,
                    })
                })?;

                log::info!("Entering sub-workflow node: {}", node.name);
                let nested = Engine::new(Arc::new(subflow.clone()), self.registry.clone());
                let seed = context.clone();
                let final_state = Box::pin(nested.run(context))
                    .await
                    .map_err(|err| AttemptFailure::Function(Box::new(err)))?;

                if let Some(output) = &node.output {
                    if !final_state.context.contains_key(output) {
                        return Err(AttemptFailure::Fatal(
                            EngineError::SubWorkflowOutputMissing {
                                node: node.name.clone(),
                                key: output.clone(),
                            },
                        ));
                    }
                }
                // Only keys the inner run added or changed relative to
                // its seed merge back; untouched snapshot keys must not
                // stomp a fan-out sibling's fresh write.
                let writes: Context = final_state
                    .context
                    .into_iter()
                    .filter(|(key, value)| seed.get(key) != Some(value))
                    .collect();
                Ok(writes)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::WorkflowBuilder;
    use crate::condition::Predicate;
    use crate::node::NodeFunction;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Instant;

    /// Returns a fixed value and records each invocation
    struct RecordingFunction {
        name: String,
        value: Value,
        calls: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl NodeFunction for RecordingFunction {
        fn name(&self) -> &str {
            &self.name
        }

        async fn call(&self, _args: Context) -> Result<Value, Box<dyn Error + Send + Sync>> {
            self.calls.lock().unwrap().push(self.name.clone());
            Ok(self.value.clone())
        }
    }

    /// Fails the first `fail_count` invocations, then succeeds
    struct FlakyFunction {
        name: String,
        fail_count: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl NodeFunction for FlakyFunction {
        fn name(&self) -> &str {
            &self.name
        }

        async fn call(&self, _args: Context) -> Result<Value, Box<dyn Error + Send + Sync>> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
            if attempt < self.fail_count {
                Err(format!("transient failure {}", attempt + 1).into())
            } else {
                Ok(json!("recovered"))
            }
        }
    }

    /// Never returns
    struct HangingFunction {
        name: String,
    }

    #[async_trait]
    impl NodeFunction for HangingFunction {
        fn name(&self) -> &str {
            &self.name
        }

        async fn call(&self, _args: Context) -> Result<Value, Box<dyn Error + Send + Sync>> {
            sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        }
    }

    /// Echoes its received arguments back as its output
    struct EchoArgsFunction {
        name: String,
    }

    #[async_trait]
    impl NodeFunction for EchoArgsFunction {
        fn name(&self) -> &str {
            &self.name
        }

        async fn call(&self, args: Context) -> Result<Value, Box<dyn Error + Send + Sync>> {
            Ok(serde_json::to_value(args)?)
        }
    }

    fn recording(
        registry: &mut Registry,
        name: &str,
        value: Value,
        calls: &Arc<Mutex<Vec<String>>>,
    ) {
        registry.register_function(Arc::new(RecordingFunction {
            name: name.to_string(),
            value,
            calls: calls.clone(),
        }));
    }

    #[tokio::test]
    async fn test_linear_chain_runs_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        recording(&mut registry, "fn_a", json!("va"), &calls);
        recording(&mut registry, "fn_b", json!("vb"), &calls);
        recording(&mut registry, "fn_c", json!("vc"), &calls);
        registry.define(Node::function("a", "fn_a").with_output("out_a"));
        registry.define(Node::function("b", "fn_b").with_output("out_b"));
        registry.define(Node::function("c", "fn_c").with_output("out_c"));

        let engine = WorkflowBuilder::new(Arc::new(registry), "a")
            .sequence(["a", "b", "c"])
            .build()
            .unwrap();

        let state = engine.run(Context::new()).await.unwrap();

        assert_eq!(*calls.lock().unwrap(), vec!["fn_a", "fn_b", "fn_c"]);
        assert_eq!(state.context.get("out_a"), Some(&json!("va")));
        assert_eq!(state.context.get("out_b"), Some(&json!("vb")));
        assert_eq!(state.context.get("out_c"), Some(&json!("vc")));
        assert!(state.current_nodes.is_empty());
        assert_eq!(state.status.get("c"), Some(&NodeStatus::Success));
    }

    #[tokio::test]
    async fn test_retry_recovers_with_backoff() {
        let mut registry = Registry::new();
        registry.register_function(Arc::new(FlakyFunction {
            name: "flaky".to_string(),
            fail_count: 2,
            calls: AtomicU32::new(0),
        }));
        registry.define(
            Node::function("a", "flaky")
                .with_output("out")
                .with_retries(3)
                .with_delay(0.05),
        );

        let engine = WorkflowBuilder::new(Arc::new(registry), "a")
            .node("a")
            .build()
            .unwrap();

        let started = Instant::now();
        let state = engine.run(Context::new()).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(state.context.get("out"), Some(&json!("recovered")));
        // two backoff sleeps: delay, then 2*delay
        assert!(elapsed >= Duration::from_secs_f64(0.05 + 0.10));
        assert!(elapsed < Duration::from_secs_f64(1.0));
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        let mut registry = Registry::new();
        registry.register_function(Arc::new(FlakyFunction {
            name: "flaky".to_string(),
            fail_count: 10,
            calls: AtomicU32::new(0),
        }));
        registry.define(
            Node::function("a", "flaky")
                .with_output("out")
                .with_retries(2)
                .with_delay(0.01),
        );

        let engine = WorkflowBuilder::new(Arc::new(registry), "a")
            .node("a")
            .build()
            .unwrap();

        let err = engine.run(Context::new()).await.unwrap_err();
        match err {
            EngineError::NodeFailed { node, attempts, .. } => {
                assert_eq!(node, "a");
                assert_eq!(attempts, 2);
            }
            other => panic!("expected NodeFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_timeout_bounds_the_attempt() {
        let mut registry = Registry::new();
        registry.register_function(Arc::new(HangingFunction {
            name: "hang".to_string(),
        }));
        registry.define(
            Node::function("a", "hang")
                .with_retries(1)
                .with_timeout(0.05),
        );

        let engine = WorkflowBuilder::new(Arc::new(registry), "a")
            .node("a")
            .build()
            .unwrap();

        let started = Instant::now();
        let err = engine.run(Context::new()).await.unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, EngineError::NodeTimeout { ref node, .. } if node == "a"));
        assert!(elapsed < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_missing_inputs_fails_without_retry() {
        let mut registry = Registry::new();
        let flaky = Arc::new(FlakyFunction {
            name: "counted".to_string(),
            fail_count: 0,
            calls: AtomicU32::new(0),
        });
        registry.register_function(flaky.clone());
        registry.define(
            Node::function("a", "counted")
                .with_inputs(["text", "lang"])
                .with_retries(5),
        );

        let engine = WorkflowBuilder::new(Arc::new(registry), "a")
            .node("a")
            .build()
            .unwrap();

        let mut initial = Context::new();
        initial.insert("text".to_string(), json!("hello"));
        let err = engine.run(initial).await.unwrap_err();

        match err {
            EngineError::MissingInputs { node, missing } => {
                assert_eq!(node, "a");
                assert_eq!(missing, vec!["lang"]);
            }
            other => panic!("expected MissingInputs, got {:?}", other),
        }
        // the function was never invoked
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_parallel_fan_out_shares_one_frontier() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        recording(&mut registry, "fn_a", json!("va"), &calls);
        recording(&mut registry, "fn_x", json!("vx"), &calls);
        recording(&mut registry, "fn_y", json!("vy"), &calls);
        recording(&mut registry, "fn_join", json!("vj"), &calls);
        registry.define(Node::function("a", "fn_a"));
        registry.define(Node::function("x", "fn_x").with_output("out_x"));
        registry.define(Node::function("y", "fn_y").with_output("out_y"));
        registry.define(
            Node::function("join", "fn_join")
                .with_inputs(["out_x", "out_y"])
                .with_output("out_join"),
        );

        let registry = Arc::new(registry);
        let engine = WorkflowBuilder::new(registry, "a")
            .node("a")
            .parallel(["x", "y"])
            .node("x")
            .then("join")
            .node("y")
            .then("join")
            .build()
            .unwrap();

        let state = engine.run(Context::new()).await.unwrap();

        // both fan-out outputs landed before join's inputs were read,
        // otherwise join would have failed MissingInputs
        assert_eq!(state.context.get("out_join"), Some(&json!("vj")));

        let calls = calls.lock().unwrap();
        assert_eq!(calls[0], "fn_a");
        assert!(calls[1..3].contains(&"fn_x".to_string()));
        assert!(calls[1..3].contains(&"fn_y".to_string()));
        // the convergence node ran once even with two incoming edges
        assert_eq!(calls.iter().filter(|c| *c == "fn_join").count(), 1);
    }

    #[tokio::test]
    async fn test_conditional_branch_selects_one_path() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        recording(&mut registry, "fn_classify", json!("search"), &calls);
        recording(&mut registry, "fn_search", json!("s"), &calls);
        recording(&mut registry, "fn_code", json!("c"), &calls);
        registry.define(Node::function("classify", "fn_classify").with_output("intent"));
        registry.define(Node::function("search", "fn_search").with_output("out_s"));
        registry.define(Node::function("code", "fn_code").with_output("out_c"));

        let engine = WorkflowBuilder::new(Arc::new(registry), "classify")
            .node("classify")
            .then_if("search", Predicate::parse("intent == 'search'"))
            .node("classify")
            .then_if("code", Predicate::parse("intent == 'code'"))
            .build()
            .unwrap();

        let state = engine.run(Context::new()).await.unwrap();

        assert_eq!(state.context.get("out_s"), Some(&json!("s")));
        assert!(!state.context.contains_key("out_c"));
        assert!(!calls.lock().unwrap().contains(&"fn_code".to_string()));
    }

    #[tokio::test]
    async fn test_loop_until_condition_flips() {
        // counter increments each pass; loop back while counter < 3
        struct CountingFunction {
            name: String,
        }

        #[async_trait]
        impl NodeFunction for CountingFunction {
            fn name(&self) -> &str {
                &self.name
            }

            async fn call(&self, args: Context) -> Result<Value, Box<dyn Error + Send + Sync>> {
                let current = args.get("counter").and_then(|v| v.as_i64()).unwrap_or(0);
                Ok(json!(current + 1))
            }
        }

        let mut registry = Registry::new();
        registry.register_function(Arc::new(CountingFunction {
            name: "count".to_string(),
        }));
        registry.define(
            Node::function("tick", "count")
                .with_inputs(["counter"])
                .with_output("counter"),
        );

        let engine = WorkflowBuilder::new(Arc::new(registry), "tick")
            .node("tick")
            .loop_to("tick", "tick", Predicate::parse("counter < 3"))
            .build()
            .unwrap();

        let mut initial = Context::new();
        initial.insert("counter".to_string(), json!(0));
        let state = engine.run(initial).await.unwrap();

        assert_eq!(state.context.get("counter"), Some(&json!(3)));
    }

    #[tokio::test]
    async fn test_sub_workflow_shares_context() {
        let mut registry = Registry::new();
        registry.register_function(Arc::new(EchoArgsFunction {
            name: "echo".to_string(),
        }));
        registry.define(
            Node::function("inner", "echo")
                .with_inputs(["seed"])
                .with_output("inner_out"),
        );
        registry.define(
            Node::function("after", "echo")
                .with_inputs(["inner_out"])
                .with_output("final"),
        );
        let registry = Arc::new(registry);

        let inner = WorkflowBuilder::new(registry.clone(), "inner")
            .node("inner")
            .build_workflow()
            .unwrap();

        let engine = WorkflowBuilder::new(registry, "sub")
            .add_sub_workflow("sub", inner, ["seed"], Some("inner_out"))
            .then("after")
            .build()
            .unwrap();

        let mut initial = Context::new();
        initial.insert("seed".to_string(), json!("s"));
        let state = engine.run(initial).await.unwrap();

        // the inner node's write is visible to the parent run
        assert_eq!(
            state.context.get("inner_out"),
            Some(&json!({"seed": "s"}))
        );
        assert!(state.context.contains_key("final"));
    }

    #[tokio::test]
    async fn test_sub_workflow_sibling_write_survives_merge() {
        // fan out a writing node alongside a sub-workflow that never
        // touches the key; the sibling's write must not be reverted to
        // the value the sub-workflow saw in its snapshot
        let calls = Arc::new(Mutex::new(Vec::new()));
        let mut registry = Registry::new();
        recording(&mut registry, "fn_split", json!(null), &calls);
        recording(&mut registry, "fn_write", json!(1), &calls);
        recording(&mut registry, "fn_noop", json!(null), &calls);
        registry.define(Node::function("split", "fn_split"));
        registry.define(Node::function("writer", "fn_write").with_output("k"));
        registry.define(Node::function("noop", "fn_noop"));
        let registry = Arc::new(registry);

        let inner = WorkflowBuilder::new(registry.clone(), "noop")
            .node("noop")
            .build_workflow()
            .unwrap();

        let engine = WorkflowBuilder::new(registry, "split")
            .add_sub_workflow("sub", inner, Vec::<String>::new(), None)
            .node("split")
            .parallel(["writer", "sub"])
            .build()
            .unwrap();

        let mut initial = Context::new();
        initial.insert("k".to_string(), json!(0));
        let state = engine.run(initial).await.unwrap();

        assert_eq!(state.context.get("k"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_sub_workflow_output_missing_is_fatal() {
        let mut registry = Registry::new();
        registry.register_function(Arc::new(EchoArgsFunction {
            name: "echo".to_string(),
        }));
        // inner node writes nothing
        registry.define(Node::function("inner", "echo"));
        let registry = Arc::new(registry);

        let inner = WorkflowBuilder::new(registry.clone(), "inner")
            .node("inner")
            .build_workflow()
            .unwrap();

        let engine = WorkflowBuilder::new(registry, "sub")
            .add_sub_workflow("sub", inner, Vec::<String>::new(), Some("verdict"))
            .build()
            .unwrap();

        let err = engine.run(Context::new()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::SubWorkflowOutputMissing { ref node, ref key }
                if node == "sub" && key == "verdict"
        ));
    }

    #[tokio::test]
    async fn test_unresolved_function_is_fatal() {
        let mut registry = Registry::new();
        registry.define(Node::function("a", "nowhere").with_retries(5));

        let engine = WorkflowBuilder::new(Arc::new(registry), "a")
            .node("a")
            .build()
            .unwrap();

        let err = engine.run(Context::new()).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::FunctionNotFound { ref function, .. } if function == "nowhere"
        ));
    }
}
