//! Workflow execution.
//!
//! Runs root nodes in dependency order and pushes every successful output
//! into downstream nodes, which are then run in turn. A failure stops its
//! own branch only.

use crate::catalog::NodeKind;
use crate::config::{ExecutorConfig, RootMode};
use crate::error::NodeError;
use crate::graph::{Edge, Graph, SharedGraph};
use crate::node::NodeStatus;
use crate::nodes::trigger;
use crate::observer::{NullObserver, StatusObserver};
use crate::payload::Payload;
use futures_util::future::{join_all, BoxFuture};
use futures_util::FutureExt;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Overall result of `execute_all`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Every invoked node completed
    Success,

    /// At least one node failed; other branches still ran
    Failed,
}

/// Result for a single node within one run
#[derive(Debug, Clone, Serialize)]
pub struct NodeExecutionResult {
    pub node_id: String,

    /// Completed or Error, from the node's last invocation
    pub status: NodeStatus,

    /// How many times the node was invoked (once per completed upstream)
    pub invocations: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Payload>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Report returned by `execute_all`
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub execution_id: String,

    pub status: ExecutionStatus,

    /// Results of every node that was invoked
    pub node_results: HashMap<String, NodeExecutionResult>,

    /// Execution order computed at the start of the run
    pub order: Vec<String>,

    /// Connections that closed a cycle
    pub cycles: Vec<Edge>,
}

impl ExecutionReport {
    pub fn result(&self, node_id: &str) -> Option<&NodeExecutionResult> {
        self.node_results.get(node_id)
    }
}

/// One node invocation
#[derive(Debug, Clone)]
struct Outcome {
    node_id: String,
    result: Result<Payload, NodeError>,
}

/// Bookkeeping shared by every branch of one execution
#[derive(Debug, Default)]
struct RunState {
    /// Nodes that failed; they stay inert for the rest of the execution
    failed: Mutex<HashSet<String>>,
}

impl RunState {
    fn has_failed(&self, node_id: &str) -> bool {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(node_id)
    }

    fn mark_failed(&self, node_id: &str) {
        self.failed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(node_id.to_string());
    }
}

/// Drives a shared workflow graph.
pub struct Executor {
    graph: SharedGraph,
    observer: Arc<dyn StatusObserver>,
    config: ExecutorConfig,
}

impl Executor {
    /// Create an executor with default settings and no observer
    pub fn new(graph: SharedGraph) -> Self {
        Self::with_observer(graph, Arc::new(NullObserver), ExecutorConfig::default())
    }

    pub fn with_observer(
        graph: SharedGraph,
        observer: Arc<dyn StatusObserver>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            graph,
            observer,
            config,
        }
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Execute the whole workflow.
    ///
    /// Root nodes (no incoming connections) are started in execution order;
    /// everything else runs because an upstream node pushed data into it.
    /// Nodes that no root can reach (cycles without an entry) are started
    /// afterwards so that no node is left out.
    pub async fn execute_all(&self) -> ExecutionReport {
        let execution_id = Uuid::new_v4().to_string();
        info!("Starting workflow execution: {}", execution_id);

        let (plan, roots, reachable) = {
            let graph = self.graph.read().await;
            let roots = graph.roots();
            let reachable = reachable_from(&graph, &roots);
            (graph.compute_execution_order(), roots, reachable)
        };
        info!("Execution order: {:?}", plan.order);

        let entries: Vec<String> = plan
            .order
            .iter()
            .filter(|id| roots.contains(id))
            .cloned()
            .collect();

        let run = RunState::default();
        let mut outcomes = match self.config.root_mode {
            RootMode::Sequential => {
                let mut outcomes = Vec::new();
                for root in entries {
                    outcomes.extend(self.propagate(root, Vec::new(), &run).await);
                }
                outcomes
            }
            RootMode::Concurrent => {
                join_all(
                    entries
                        .into_iter()
                        .map(|root| self.propagate(root, Vec::new(), &run)),
                )
                .await
                .into_iter()
                .flatten()
                .collect()
            }
        };

        let mut invoked: HashSet<String> = outcomes.iter().map(|o| o.node_id.clone()).collect();
        for id in &plan.order {
            if reachable.contains(id) || invoked.contains(id) {
                continue;
            }
            let upstream_failed = {
                let graph = self.graph.read().await;
                graph.incoming(id).iter().any(|up| run.has_failed(up))
            };
            if upstream_failed {
                warn!("Node {} not started, an upstream node failed in this run", id);
                continue;
            }
            warn!("Node {} is not reachable from any root, starting it directly", id);
            let branch = self.propagate(id.clone(), Vec::new(), &run).await;
            invoked.extend(branch.iter().map(|o| o.node_id.clone()));
            outcomes.extend(branch);
        }

        let report = build_report(execution_id, plan.order, plan.back_edges, outcomes);
        match report.status {
            ExecutionStatus::Success => info!("Workflow execution completed: {}", report.execution_id),
            ExecutionStatus::Failed => error!(
                "Workflow execution {} finished with failures",
                report.execution_id
            ),
        }
        report
    }

    /// Run a single node.
    ///
    /// With `cascade`, its output is pushed downstream exactly as in
    /// `execute_all`; otherwise downstream nodes are left untouched.
    pub async fn execute_single(&self, node_id: &str, cascade: bool) -> Result<Payload, NodeError> {
        if cascade {
            return self
                .propagate(node_id.to_string(), Vec::new(), &RunState::default())
                .await
                .into_iter()
                .next()
                .map(|outcome| outcome.result)
                .unwrap_or_else(|| Err(NodeError::NotFound(node_id.to_string())));
        }

        let node = self
            .graph
            .read()
            .await
            .node(node_id)
            .ok_or_else(|| NodeError::NotFound(node_id.to_string()))?;
        node.run(&self.observer, Some(self.config.revert_delay())).await
    }

    /// Run `node_id`, then feed and run its downstream nodes.
    ///
    /// `path` holds the nodes of the current branch; a connection back into
    /// the path is a cycle and is not followed. Node ids that disappeared
    /// from the graph mid-run, or that already failed in this run, are
    /// skipped. A node still running for another branch is waited for.
    fn propagate<'a>(
        &'a self,
        node_id: String,
        mut path: Vec<String>,
        run: &'a RunState,
    ) -> BoxFuture<'a, Vec<Outcome>> {
        async move {
            if run.has_failed(&node_id) {
                debug!("Node {} already failed in this run, skipping", node_id);
                return Vec::new();
            }

            let node = self.graph.read().await.node(&node_id);
            let Some(node) = node else {
                warn!("Node {} no longer exists, skipping", node_id);
                return Vec::new();
            };

            let result = node
                .run_queued(&self.observer, Some(self.config.revert_delay()))
                .await;
            if result.is_err() {
                run.mark_failed(&node_id);
            }
            let mut outcomes = vec![Outcome {
                node_id: node_id.clone(),
                result: result.clone(),
            }];

            let Ok(output) = result else {
                return outcomes;
            };

            let targets = self.graph.read().await.outgoing(&node_id);
            path.push(node_id);

            for target in targets {
                if path.contains(&target) {
                    warn!(
                        "Circular dependency detected in workflow, not re-entering {}",
                        target
                    );
                    continue;
                }

                let target_node = self.graph.read().await.node(&target);
                let Some(target_node) = target_node else {
                    warn!("Node {} no longer exists, skipping", target);
                    continue;
                };

                target_node.receive_data(output.clone());
                outcomes.extend(self.propagate(target, path.clone(), run).await);
            }

            outcomes
        }
        .boxed()
    }

    /// Start firing a trigger node on its configured interval.
    ///
    /// Each tick produces a fresh trigger event and cascades downstream. The
    /// repeating task ends on `stop_trigger` or when the node is deleted.
    pub async fn start_trigger(self: &Arc<Self>, node_id: &str) -> Result<(), NodeError> {
        let node = self
            .graph
            .read()
            .await
            .node(node_id)
            .ok_or_else(|| NodeError::NotFound(node_id.to_string()))?;

        if node.kind() != NodeKind::Trigger.as_str() {
            return Err(NodeError::MalformedConfig(format!(
                "Node '{}' is not a trigger",
                node_id
            )));
        }
        let period = trigger::interval_from_config(&node.config())?;

        let token = node.start_ticker();
        let executor = Arc::clone(self);
        let id = node_id.to_string();
        info!("Trigger {} firing every {:?}", id, period);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => executor.fire_trigger(&id).await,
                }
            }

            info!("Trigger {} stopped", id);
        });

        Ok(())
    }

    /// Stop a trigger's repeating task. Returns whether one was running.
    pub async fn stop_trigger(&self, node_id: &str) -> Result<bool, NodeError> {
        let node = self
            .graph
            .read()
            .await
            .node(node_id)
            .ok_or_else(|| NodeError::NotFound(node_id.to_string()))?;
        Ok(node.stop_ticker())
    }

    async fn fire_trigger(&self, node_id: &str) {
        let node = self.graph.read().await.node(node_id);
        let Some(node) = node else {
            return;
        };

        node.invalidate();
        let run = RunState::default();
        for outcome in self.propagate(node_id.to_string(), Vec::new(), &run).await {
            if let Err(err) = outcome.result {
                warn!(
                    "Trigger {} tick: node {} failed: {}",
                    node_id, outcome.node_id, err
                );
            }
        }
    }
}

/// Every node reachable from `roots` (roots included)
fn reachable_from(graph: &Graph, roots: &[String]) -> HashSet<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<String> = roots.iter().cloned().collect();

    while let Some(id) = queue.pop_front() {
        if !seen.insert(id.clone()) {
            continue;
        }
        queue.extend(graph.outgoing(&id));
    }

    seen
}

fn build_report(
    execution_id: String,
    order: Vec<String>,
    cycles: Vec<Edge>,
    outcomes: Vec<Outcome>,
) -> ExecutionReport {
    let mut node_results: HashMap<String, NodeExecutionResult> = HashMap::new();

    for outcome in outcomes {
        // Rejected re-entry is not a result of the node's own work
        if matches!(outcome.result, Err(NodeError::Busy(_))) {
            continue;
        }
        let entry = node_results
            .entry(outcome.node_id.clone())
            .or_insert_with(|| NodeExecutionResult {
                node_id: outcome.node_id.clone(),
                status: NodeStatus::Ready,
                invocations: 0,
                output: None,
                error: None,
            });

        entry.invocations += 1;
        match outcome.result {
            Ok(output) => {
                entry.status = NodeStatus::Completed;
                entry.output = Some(output);
                entry.error = None;
            }
            Err(err) => {
                entry.status = NodeStatus::Error;
                entry.output = None;
                entry.error = Some(err.to_string());
            }
        }
    }

    let failed = node_results
        .values()
        .any(|result| result.status == NodeStatus::Error);

    ExecutionReport {
        execution_id,
        status: if failed {
            ExecutionStatus::Failed
        } else {
            ExecutionStatus::Success
        },
        node_results,
        order,
        cycles,
    }
}
