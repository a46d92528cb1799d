//! Plain-data description of a workflow, for saving and restoring.
//!
//! Only built-in node kinds can be described; runtime state (status,
//! cached outputs) is not part of a definition.

use crate::catalog::{NodeKind, NodeServices};
use crate::error::AppError;
use crate::graph::{Edge, Graph};
use crate::node::NodeHandle;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

/// A node instance in a saved workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub id: String,

    pub kind: NodeKind,

    #[serde(default)]
    pub config: Value,

    #[serde(default)]
    pub rerun: bool,
}

/// Nodes and connections of a workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub nodes: Vec<NodeDefinition>,

    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl WorkflowDefinition {
    /// Describe the built-in nodes of a graph. Custom behaviors are skipped.
    pub fn from_graph(graph: &Graph) -> Self {
        let nodes: Vec<NodeDefinition> = graph
            .nodes()
            .filter_map(|node| match node.kind().parse::<NodeKind>() {
                Ok(kind) => Some(NodeDefinition {
                    id: node.id().to_string(),
                    kind,
                    config: node.config(),
                    rerun: node.rerun(),
                }),
                Err(_) => {
                    warn!("Node {} has custom kind '{}', not saved", node.id(), node.kind());
                    None
                }
            })
            .collect();

        let edges = graph
            .edges()
            .iter()
            .filter(|edge| nodes.iter().any(|n| n.id == edge.from) && nodes.iter().any(|n| n.id == edge.to))
            .cloned()
            .collect();

        Self { nodes, edges }
    }

    /// Build a fresh graph, validating every node config and connection
    pub fn build_graph(&self, services: &NodeServices) -> Result<Graph, AppError> {
        let mut graph = Graph::new();

        for node in &self.nodes {
            let behavior = node.kind.build(&node.config, services)?;
            let handle = NodeHandle::new(node.id.clone(), behavior);
            handle.set_rerun(node.rerun);
            graph.add_node(handle)?;
        }

        for edge in &self.edges {
            graph.add_edge(&edge.from, &edge.to)?;
        }

        Ok(graph)
    }
}
