//! Side channel from the engine to the presentation layer.

use crate::node::NodeStatus;

/// Receives node status transitions and rendered outputs.
///
/// The engine calls this at every documented transition point (Running at
/// the start of an invocation, Completed/Error at the end, Ready after the
/// revert delay). Implementations must not block.
pub trait StatusObserver: Send + Sync {
    fn set_status(&self, node_id: &str, status: NodeStatus);

    fn set_output(&self, node_id: &str, display: &str);
}

/// Observer that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl StatusObserver for NullObserver {
    fn set_status(&self, _node_id: &str, _status: NodeStatus) {}

    fn set_output(&self, _node_id: &str, _display: &str) {}
}
