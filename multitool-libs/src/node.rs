//! Node behavior trait and the runtime handle wrapping it.
//!
//! A node is split in two:
//! 1. **Behavior** (`NodeBehavior`): the variant-specific config and work
//! 2. **Handle** (`NodeHandle`): status machine, cached input/output, rerun
//!    flag and lifetime, shared by the graph and the executor

use crate::error::NodeError;
use crate::observer::StatusObserver;
use crate::payload::Payload;
use async_trait::async_trait;
use futures_util::FutureExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Port capabilities of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRole {
    /// No input port, one output port
    Source,

    /// One input port, one output port
    Transform,

    /// One input port, no output port
    Sink,
}

impl NodeRole {
    /// Whether the node accepts incoming data
    pub fn has_input(self) -> bool {
        !matches!(self, NodeRole::Source)
    }

    /// Whether the node produces data for downstream nodes
    pub fn has_output(self) -> bool {
        !matches!(self, NodeRole::Sink)
    }
}

/// Execution status of a node.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    #[default]
    Ready,
    Running,
    Completed,
    Error,
}

/// Variant-specific logic of a workflow node.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use multitool_libs::{NodeBehavior, NodeError, NodeRole, Payload};
/// use async_trait::async_trait;
///
/// struct Shout;
///
/// #[async_trait]
/// impl NodeBehavior for Shout {
///     fn kind(&self) -> &str {
///         "shout"
///     }
///
///     fn role(&self) -> NodeRole {
///         NodeRole::Transform
///     }
///
///     async fn process(&self, input: Option<&Payload>) -> Result<Payload, NodeError> {
///         let text = input.and_then(Payload::as_text).unwrap_or_default();
///         Ok(Payload::text(text.to_uppercase()))
///     }
/// }
/// ```
#[async_trait]
pub trait NodeBehavior: Send + Sync {
    /// Catalog tag of this behavior (e.g. "http_request")
    fn kind(&self) -> &str;

    /// Port capabilities
    fn role(&self) -> NodeRole;

    /// Current user-editable configuration as JSON
    fn config(&self) -> Value {
        Value::Object(Default::default())
    }

    /// Merges `patch` (a JSON object) into the configuration.
    fn update_config(&mut self, patch: &Value) -> Result<(), NodeError> {
        let _ = patch;
        Err(NodeError::MalformedConfig(format!(
            "{} nodes have no configuration",
            self.kind()
        )))
    }

    /// Quick synchronous check before any work starts.
    ///
    /// Don't access files or the network here.
    fn validate(&self, input: Option<&Payload>) -> Result<(), NodeError> {
        let _ = input;
        Ok(())
    }

    /// Performs the node's work.
    ///
    /// `input` is the most recent value received from upstream; it is always
    /// `None` for source nodes.
    async fn process(&self, input: Option<&Payload>) -> Result<Payload, NodeError>;
}

/// Deserializes a typed config from JSON, using defaults for `null`.
pub fn parse_config<T>(config: &Value) -> Result<T, NodeError>
where
    T: DeserializeOwned + Default,
{
    if config.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(config.clone()).map_err(|e| NodeError::MalformedConfig(e.to_string()))
}

/// Shallow-merges a JSON object patch into a typed config.
pub fn merge_config<T>(current: &T, patch: &Value) -> Result<T, NodeError>
where
    T: Serialize + DeserializeOwned,
{
    let Value::Object(patch) = patch else {
        return Err(NodeError::MalformedConfig(
            "config update must be a JSON object".to_string(),
        ));
    };

    let mut merged =
        serde_json::to_value(current).map_err(|e| NodeError::MalformedConfig(e.to_string()))?;
    if let Value::Object(target) = &mut merged {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }

    serde_json::from_value(merged).map_err(|e| NodeError::MalformedConfig(e.to_string()))
}

/// Point-in-time view of a node, as served to the UI.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSnapshot {
    pub id: String,
    pub kind: String,
    pub role: NodeRole,
    pub status: NodeStatus,
    pub config: Value,
    pub rerun: bool,
    pub executed: bool,
    pub ticking: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_input: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_output: Option<Payload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Mutable bookkeeping, only locked for short non-async sections
#[derive(Default)]
struct NodeData {
    config: Value,
    last_input: Option<Payload>,
    last_output: Option<Payload>,
    last_error: Option<NodeError>,
    rerun: bool,
    /// Input arrived since the last invocation took one
    input_pending: bool,
}

impl NodeData {
    /// Cached output a new invocation may return instead of doing work.
    ///
    /// Sinks render whatever they last received, so fresh input bypasses
    /// their cache.
    fn reusable_output(&self, role: NodeRole) -> Option<Payload> {
        if self.rerun || (role == NodeRole::Sink && self.input_pending) {
            return None;
        }
        self.last_output.clone()
    }
}

/// Runtime wrapper around a `NodeBehavior`.
///
/// `executed` is derived from the cached output: a node has executed iff its
/// last invocation succeeded and its config has not changed since.
pub struct NodeHandle {
    id: String,
    kind: String,
    role: NodeRole,
    /// Held for the whole invocation; a failed `try_lock` means Running
    behavior: tokio::sync::Mutex<Box<dyn NodeBehavior>>,
    data: Mutex<NodeData>,
    status: watch::Sender<NodeStatus>,
    run_seq: AtomicU64,
    lifetime: CancellationToken,
    ticker: Mutex<Option<CancellationToken>>,
}

impl NodeHandle {
    /// Wrap a behavior under the given node id
    pub fn new(id: impl Into<String>, behavior: Box<dyn NodeBehavior>) -> Self {
        let (status, _) = watch::channel(NodeStatus::Ready);
        let data = NodeData {
            config: behavior.config(),
            ..NodeData::default()
        };

        Self {
            id: id.into(),
            kind: behavior.kind().to_string(),
            role: behavior.role(),
            behavior: tokio::sync::Mutex::new(behavior),
            data: Mutex::new(data),
            status,
            run_seq: AtomicU64::new(0),
            lifetime: CancellationToken::new(),
            ticker: Mutex::new(None),
        }
    }

    fn data(&self) -> MutexGuard<'_, NodeData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ticker(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.ticker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn status(&self) -> NodeStatus {
        *self.status.borrow()
    }

    /// Watch status transitions
    pub fn subscribe_status(&self) -> watch::Receiver<NodeStatus> {
        self.status.subscribe()
    }

    pub fn executed(&self) -> bool {
        self.data().last_output.is_some()
    }

    pub fn rerun(&self) -> bool {
        self.data().rerun
    }

    pub fn set_rerun(&self, rerun: bool) {
        self.data().rerun = rerun;
    }

    /// Most recent output, if the node has completed since its last config change
    pub fn output(&self) -> Option<Payload> {
        self.data().last_output.clone()
    }

    /// Most recent value received from upstream
    pub fn input(&self) -> Option<Payload> {
        self.data().last_input.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.data().last_error.as_ref().map(ToString::to_string)
    }

    pub fn config(&self) -> Value {
        self.data().config.clone()
    }

    /// Stores a value pushed from an upstream node. Last write wins.
    pub fn receive_data(&self, value: Payload) {
        debug!("Node {} received {} data", self.id, value.type_name());
        let mut data = self.data();
        data.last_input = Some(value);
        data.input_pending = true;
    }

    /// Updates the configuration and invalidates the cached output.
    ///
    /// Rejected with `Busy` while the node is running.
    pub fn update_config(&self, patch: &Value) -> Result<(), NodeError> {
        let mut behavior = self
            .behavior
            .try_lock()
            .map_err(|_| NodeError::Busy(self.id.clone()))?;
        behavior.update_config(patch)?;

        let mut data = self.data();
        data.config = behavior.config();
        data.last_output = None;
        info!("Node {} reconfigured, cached output cleared", self.id);
        Ok(())
    }

    /// Drops the cached output so the next `run` does fresh work
    pub fn invalidate(&self) {
        self.data().last_output = None;
    }

    /// Runs the node.
    ///
    /// If the node has already executed and `rerun` is not set, the cached
    /// output is returned without any side effects. Otherwise the status goes
    /// Running -> Completed/Error and the observer is notified at each step.
    /// After Completed, the status reverts to Ready once `revert_after` has
    /// elapsed (requires a tokio runtime).
    ///
    /// Fails with `Busy` while another invocation is in flight.
    pub async fn run(
        self: &Arc<Self>,
        observer: &Arc<dyn StatusObserver>,
        revert_after: Option<Duration>,
    ) -> Result<Payload, NodeError> {
        self.invoke(observer, revert_after, false).await
    }

    /// Like `run`, but waits for an in-flight invocation to finish instead
    /// of failing with `Busy`. Its output is reused when still valid.
    pub async fn run_queued(
        self: &Arc<Self>,
        observer: &Arc<dyn StatusObserver>,
        revert_after: Option<Duration>,
    ) -> Result<Payload, NodeError> {
        self.invoke(observer, revert_after, true).await
    }

    async fn invoke(
        self: &Arc<Self>,
        observer: &Arc<dyn StatusObserver>,
        revert_after: Option<Duration>,
        wait: bool,
    ) -> Result<Payload, NodeError> {
        let cached = self.data().reusable_output(self.role);
        if let Some(output) = cached {
            debug!("Node {} already executed, returning cached output", self.id);
            return Ok(output);
        }

        let (behavior, queued) = match self.behavior.try_lock() {
            Ok(behavior) => (behavior, false),
            Err(_) if wait => {
                debug!("Node {} is running, queueing", self.id);
                (self.behavior.lock().await, true)
            }
            Err(_) => return Err(NodeError::Busy(self.id.clone())),
        };

        // The invocation we waited for decides the outcome when still valid
        let input = {
            let mut data = self.data();
            if let Some(output) = data.reusable_output(self.role) {
                debug!("Node {} completed while queued, reusing its output", self.id);
                return Ok(output);
            }
            if let (true, Some(err)) = (queued, &data.last_error) {
                return Err(err.clone());
            }
            data.input_pending = false;
            data.last_input.clone()
        };

        let seq = self.run_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.set_status(NodeStatus::Running, observer.as_ref());
        info!("Running node {} ({})", self.id, self.kind);

        let input = if self.role.has_input() { input } else { None };
        let result = match behavior.validate(input.as_ref()) {
            Ok(()) => AssertUnwindSafe(behavior.process(input.as_ref()))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(NodeError::UpstreamFailure(panic_message(panic)))),
            Err(err) => Err(err),
        };

        // Record the outcome before releasing the lock so queued invocations see it
        {
            let mut data = self.data();
            match &result {
                Ok(output) => {
                    data.last_output = Some(output.clone());
                    data.last_error = None;
                }
                Err(err) => {
                    data.last_output = None;
                    data.last_error = Some(err.clone());
                }
            }
        }
        drop(behavior);

        match result {
            Ok(output) => {
                observer.set_output(&self.id, &output.display_text());
                self.set_status(NodeStatus::Completed, observer.as_ref());
                if let Some(delay) = revert_after {
                    self.schedule_revert(seq, delay, Arc::clone(observer));
                }
                Ok(output)
            }
            Err(err) => {
                warn!("Node {} failed: {}", self.id, err);
                observer.set_output(&self.id, &format!("Error: {}", err));
                self.set_status(NodeStatus::Error, observer.as_ref());
                Err(err)
            }
        }
    }

    fn set_status(&self, status: NodeStatus, observer: &dyn StatusObserver) {
        self.status.send_replace(status);
        observer.set_status(&self.id, status);
    }

    fn schedule_revert(self: &Arc<Self>, seq: u64, delay: Duration, observer: Arc<dyn StatusObserver>) {
        let node = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                _ = node.lifetime.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            if node.run_seq.load(Ordering::SeqCst) != seq {
                return;
            }
            let reverted = node.status.send_if_modified(|status| {
                if *status == NodeStatus::Completed {
                    *status = NodeStatus::Ready;
                    true
                } else {
                    false
                }
            });
            if reverted {
                observer.set_status(&node.id, NodeStatus::Ready);
            }
        });
    }

    /// Token cancelled when the node is deleted
    pub fn lifetime(&self) -> &CancellationToken {
        &self.lifetime
    }

    /// Releases the node's timers. Called when the node leaves the graph.
    pub fn stop(&self) {
        self.lifetime.cancel();
        self.ticker().take();
    }

    pub fn is_stopped(&self) -> bool {
        self.lifetime.is_cancelled()
    }

    /// Installs a fresh repeating-task token, cancelling any previous one.
    pub(crate) fn start_ticker(&self) -> CancellationToken {
        let token = self.lifetime.child_token();
        if let Some(previous) = self.ticker().replace(token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Cancels the repeating task, if any. Returns whether one was active.
    pub fn stop_ticker(&self) -> bool {
        match self.ticker().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker()
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    pub fn snapshot(&self) -> NodeSnapshot {
        let ticking = self.is_ticking();
        let data = self.data();
        NodeSnapshot {
            id: self.id.clone(),
            kind: self.kind.clone(),
            role: self.role,
            status: self.status(),
            config: data.config.clone(),
            rerun: data.rerun,
            executed: data.last_output.is_some(),
            ticking,
            last_input: data.last_input.clone(),
            last_output: data.last_output.clone(),
            last_error: data.last_error.as_ref().map(ToString::to_string),
        }
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("status", &self.status())
            .finish()
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "node work panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::DisplayNode;
    use crate::observer::NullObserver;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    struct EchoNode {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl NodeBehavior for EchoNode {
        fn kind(&self) -> &str {
            "echo"
        }

        fn role(&self) -> NodeRole {
            NodeRole::Transform
        }

        fn validate(&self, input: Option<&Payload>) -> Result<(), NodeError> {
            if input.is_none() {
                return Err(NodeError::MissingRequiredField("input".to_string()));
            }
            Ok(())
        }

        async fn process(&self, input: Option<&Payload>) -> Result<Payload, NodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(input.cloned().unwrap_or_else(|| Payload::text("")))
        }
    }

    struct PanickingNode;

    #[async_trait]
    impl NodeBehavior for PanickingNode {
        fn kind(&self) -> &str {
            "panic"
        }

        fn role(&self) -> NodeRole {
            NodeRole::Source
        }

        async fn process(&self, _input: Option<&Payload>) -> Result<Payload, NodeError> {
            panic!("backend exploded");
        }
    }

    /// Source whose work fails while `fail` is set
    struct SwitchNode {
        fail: Arc<AtomicBool>,
    }

    #[async_trait]
    impl NodeBehavior for SwitchNode {
        fn kind(&self) -> &str {
            "switch"
        }

        fn role(&self) -> NodeRole {
            NodeRole::Source
        }

        async fn process(&self, _input: Option<&Payload>) -> Result<Payload, NodeError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(NodeError::TransportFailure("offline".to_string()));
            }
            Ok(Payload::text("old"))
        }
    }

    fn observer() -> Arc<dyn StatusObserver> {
        Arc::new(NullObserver)
    }

    fn echo() -> (Arc<NodeHandle>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let node = NodeHandle::new(
            "echo-1",
            Box::new(EchoNode {
                calls: Arc::clone(&calls),
            }),
        );
        (Arc::new(node), calls)
    }

    #[test]
    fn test_role_ports() {
        assert!(!NodeRole::Source.has_input());
        assert!(NodeRole::Source.has_output());
        assert!(NodeRole::Transform.has_input() && NodeRole::Transform.has_output());
        assert!(NodeRole::Sink.has_input());
        assert!(!NodeRole::Sink.has_output());
    }

    #[tokio::test]
    async fn test_validation_failure_leaves_node_unexecuted() {
        let (node, calls) = echo();

        let result = node.run(&observer(), None).await;
        assert_eq!(
            result,
            Err(NodeError::MissingRequiredField("input".to_string()))
        );
        assert_eq!(node.status(), NodeStatus::Error);
        assert!(!node.executed());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rerun_flag_forces_execution() {
        let (node, calls) = echo();
        node.receive_data(Payload::text("a"));

        node.run(&observer(), None).await.unwrap();
        node.run(&observer(), None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        node.set_rerun(true);
        node.receive_data(Payload::text("b"));
        let output = node.run(&observer(), None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(output, Payload::text("b"));
    }

    #[tokio::test]
    async fn test_panic_becomes_upstream_failure() {
        let node = Arc::new(NodeHandle::new("boom", Box::new(PanickingNode)));

        let result = node.run(&observer(), None).await;
        assert_eq!(
            result,
            Err(NodeError::UpstreamFailure("backend exploded".to_string()))
        );
        assert_eq!(node.status(), NodeStatus::Error);
        assert_eq!(
            node.last_error().as_deref(),
            Some("Upstream failure: backend exploded")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_reverts_to_ready() {
        let (node, _) = echo();
        node.receive_data(Payload::text("a"));

        node.run(&observer(), Some(Duration::from_millis(2000)))
            .await
            .unwrap();
        assert_eq!(node.status(), NodeStatus::Completed);

        let mut status = node.subscribe_status();
        tokio::time::sleep(Duration::from_millis(2100)).await;
        status.changed().await.ok();
        assert_eq!(node.status(), NodeStatus::Ready);
    }

    #[tokio::test]
    async fn test_failure_drops_cached_output() {
        let fail = Arc::new(AtomicBool::new(false));
        let node = Arc::new(NodeHandle::new(
            "switch",
            Box::new(SwitchNode {
                fail: Arc::clone(&fail),
            }),
        ));

        node.run(&observer(), None).await.unwrap();
        assert!(node.executed());

        fail.store(true, Ordering::SeqCst);
        node.set_rerun(true);
        assert!(node.run(&observer(), None).await.is_err());
        node.set_rerun(false);

        assert!(!node.executed());
        assert_eq!(node.output(), None);
        assert_eq!(
            node.run(&observer(), None).await,
            Err(NodeError::TransportFailure("offline".to_string()))
        );
        assert_eq!(node.status(), NodeStatus::Error);
    }

    #[tokio::test]
    async fn test_sink_renders_new_input() {
        let node = Arc::new(NodeHandle::new("show", Box::new(DisplayNode)));

        node.receive_data(Payload::text("first"));
        node.run(&observer(), None).await.unwrap();
        // nothing new arrived: cached
        assert_eq!(node.run(&observer(), None).await, Ok(Payload::text("first")));

        node.receive_data(Payload::text("second"));
        assert_eq!(node.run(&observer(), None).await, Ok(Payload::text("second")));
        assert_eq!(node.output(), Some(Payload::text("second")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_run_waits_for_in_flight_one() {
        struct SlowNode {
            calls: Arc<AtomicUsize>,
        }

        #[async_trait]
        impl NodeBehavior for SlowNode {
            fn kind(&self) -> &str {
                "slow"
            }

            fn role(&self) -> NodeRole {
                NodeRole::Source
            }

            async fn process(&self, _input: Option<&Payload>) -> Result<Payload, NodeError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok(Payload::text("done"))
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let node = Arc::new(NodeHandle::new(
            "slow",
            Box::new(SlowNode {
                calls: Arc::clone(&calls),
            }),
        ));
        let observer = observer();

        let (first, rejected, queued) = tokio::join!(
            node.run(&observer, None),
            node.run(&observer, None),
            node.run_queued(&observer, None)
        );

        assert_eq!(first, Ok(Payload::text("done")));
        assert_eq!(rejected, Err(NodeError::Busy("slow".to_string())));
        assert_eq!(queued, Ok(Payload::text("done")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_merge_config_rejects_non_object() {
        #[derive(Serialize, Deserialize, Default)]
        struct Cfg {
            url: String,
        }

        let merged: Cfg = merge_config(&Cfg::default(), &serde_json::json!({"url": "x"})).unwrap();
        assert_eq!(merged.url, "x");
        assert!(merge_config(&Cfg::default(), &serde_json::json!("x")).is_err());
    }
}
