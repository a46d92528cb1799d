//! Workflow graph: nodes, connections and dependency analysis.

use crate::error::GraphError;
use crate::node::{NodeBehavior, NodeHandle, NodeSnapshot};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Graph shared between the executor and whoever edits it.
///
/// The lock is only held for lookups and edits, never across a node run.
pub type SharedGraph = Arc<RwLock<Graph>>;

/// Directed connection from one node's output to another node's input
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Neighbor lists of one node, derived from the edge set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Neighbors {
    pub incoming: Vec<String>,
    pub outgoing: Vec<String>,
}

/// Result of the topological sort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionOrder {
    /// Every node exactly once; upstream before downstream when acyclic
    pub order: Vec<String>,

    /// Edges that closed a cycle during traversal
    pub back_edges: Vec<Edge>,
}

impl ExecutionOrder {
    pub fn has_cycle(&self) -> bool {
        !self.back_edges.is_empty()
    }
}

/// Serializable view of the whole graph
#[derive(Debug, Clone, Serialize)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeSnapshot>,
    pub edges: Vec<Edge>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// The set of all nodes and connections of a workflow.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: HashMap<String, Arc<NodeHandle>>,
    /// Node ids in insertion order, for deterministic traversal
    node_order: Vec<String>,
    /// Connections in creation order
    edges: Vec<Edge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap the graph for sharing with an executor
    pub fn into_shared(self) -> SharedGraph {
        Arc::new(RwLock::new(self))
    }

    /// Add a node
    ///
    /// # Returns
    ///
    /// * `Ok(Arc<NodeHandle>)` - the inserted node
    /// * `Err(GraphError::DuplicateNode)` - the id is taken
    pub fn add_node(&mut self, node: NodeHandle) -> Result<Arc<NodeHandle>, GraphError> {
        let id = node.id().to_string();
        if self.nodes.contains_key(&id) {
            return Err(GraphError::DuplicateNode(id));
        }

        let node = Arc::new(node);
        self.nodes.insert(id.clone(), Arc::clone(&node));
        self.node_order.push(id.clone());
        info!("Added node {} ({})", id, node.kind());
        Ok(node)
    }

    /// Add a node built from a behavior
    pub fn add_behavior(
        &mut self,
        id: impl Into<String>,
        behavior: Box<dyn NodeBehavior>,
    ) -> Result<Arc<NodeHandle>, GraphError> {
        self.add_node(NodeHandle::new(id, behavior))
    }

    /// Remove a node, every connection touching it, and stop its timers
    pub fn remove_node(&mut self, id: &str) -> Result<Arc<NodeHandle>, GraphError> {
        let node = self
            .nodes
            .remove(id)
            .ok_or_else(|| GraphError::UnknownNode(id.to_string()))?;

        self.node_order.retain(|existing| existing != id);
        let before = self.edges.len();
        self.edges.retain(|edge| edge.from != id && edge.to != id);
        node.stop();

        info!(
            "Removed node {} and {} connection(s)",
            id,
            before - self.edges.len()
        );
        Ok(node)
    }

    /// Connect `from`'s output to `to`'s input.
    ///
    /// Rejects self-loops, duplicates, unknown endpoints and endpoints
    /// without the needed port. Cycles are accepted here and detected at
    /// execution time.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        if from == to {
            return Err(GraphError::SelfLoop(from.to_string()));
        }

        let source = self
            .nodes
            .get(from)
            .ok_or_else(|| GraphError::UnknownNode(from.to_string()))?;
        let target = self
            .nodes
            .get(to)
            .ok_or_else(|| GraphError::UnknownNode(to.to_string()))?;

        if !source.role().has_output() {
            return Err(GraphError::MissingPort {
                node: from.to_string(),
                direction: "output".to_string(),
            });
        }
        if !target.role().has_input() {
            return Err(GraphError::MissingPort {
                node: to.to_string(),
                direction: "input".to_string(),
            });
        }

        if self.has_edge(from, to) {
            return Err(GraphError::DuplicateEdge {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        self.edges.push(Edge::new(from, to));
        Ok(())
    }

    pub fn remove_edge(&mut self, from: &str, to: &str) -> Result<(), GraphError> {
        let position = self
            .edges
            .iter()
            .position(|edge| edge.from == from && edge.to == to)
            .ok_or_else(|| GraphError::MissingEdge {
                from: from.to_string(),
                to: to.to_string(),
            })?;

        self.edges.remove(position);
        Ok(())
    }

    pub fn has_edge(&self, from: &str, to: &str) -> bool {
        self.edges
            .iter()
            .any(|edge| edge.from == from && edge.to == to)
    }

    pub fn node(&self, id: &str) -> Option<Arc<NodeHandle>> {
        self.nodes.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Arc<NodeHandle>> + '_ {
        self.node_order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn node_ids(&self) -> Vec<String> {
        self.node_order.clone()
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Downstream neighbors of `id`, in connection order
    pub fn outgoing(&self, id: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|edge| edge.from == id)
            .map(|edge| edge.to.clone())
            .collect()
    }

    /// Upstream neighbors of `id`, in connection order
    pub fn incoming(&self, id: &str) -> Vec<String> {
        self.edges
            .iter()
            .filter(|edge| edge.to == id)
            .map(|edge| edge.from.clone())
            .collect()
    }

    /// Incoming/outgoing lists for every node, recomputed from the edges
    pub fn neighbors(&self) -> HashMap<String, Neighbors> {
        let mut neighbors: HashMap<String, Neighbors> = self
            .node_order
            .iter()
            .map(|id| (id.clone(), Neighbors::default()))
            .collect();

        for edge in &self.edges {
            if !self.nodes.contains_key(&edge.from) || !self.nodes.contains_key(&edge.to) {
                continue;
            }
            if let Some(entry) = neighbors.get_mut(&edge.from) {
                entry.outgoing.push(edge.to.clone());
            }
            if let Some(entry) = neighbors.get_mut(&edge.to) {
                entry.incoming.push(edge.from.clone());
            }
        }

        neighbors
    }

    /// Nodes without incoming connections, in insertion order
    pub fn roots(&self) -> Vec<String> {
        self.node_order
            .iter()
            .filter(|id| !self.edges.iter().any(|edge| &edge.to == *id))
            .cloned()
            .collect()
    }

    /// Topological order of all nodes.
    ///
    /// Depth-first from every root, then from every node not reached yet.
    /// A node is placed in front of the result once all its descendants are
    /// done. Reaching a node that is still in progress means a cycle: the
    /// edge is recorded and not followed, so every node still appears
    /// exactly once.
    pub fn compute_execution_order(&self) -> ExecutionOrder {
        let neighbors = self.neighbors();
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut post_order: Vec<String> = Vec::with_capacity(self.nodes.len());
        let mut back_edges = Vec::new();

        fn visit<'a>(
            node_id: &'a str,
            parent: Option<&'a str>,
            neighbors: &'a HashMap<String, Neighbors>,
            marks: &mut HashMap<&'a str, Mark>,
            post_order: &mut Vec<String>,
            back_edges: &mut Vec<Edge>,
        ) {
            match marks.get(node_id) {
                Some(Mark::Done) => return,
                Some(Mark::InProgress) => {
                    if let Some(parent) = parent {
                        warn!(
                            "Circular dependency detected in workflow: {} -> {}",
                            parent, node_id
                        );
                        back_edges.push(Edge::new(parent, node_id));
                    }
                    return;
                }
                None => {}
            }

            marks.insert(node_id, Mark::InProgress);

            if let Some(entry) = neighbors.get(node_id) {
                for next in &entry.outgoing {
                    visit(next, Some(node_id), neighbors, marks, post_order, back_edges);
                }
            }

            marks.insert(node_id, Mark::Done);
            post_order.push(node_id.to_string());
        }

        // Start with nodes that have no inputs
        for id in &self.node_order {
            let is_root = neighbors
                .get(id)
                .is_some_and(|entry| entry.incoming.is_empty());
            if is_root {
                visit(id, None, &neighbors, &mut marks, &mut post_order, &mut back_edges);
            }
        }

        // Handle remaining nodes (islands made only of cycles)
        for id in &self.node_order {
            if !marks.contains_key(id.as_str()) {
                visit(id, None, &neighbors, &mut marks, &mut post_order, &mut back_edges);
            }
        }

        post_order.reverse();
        ExecutionOrder {
            order: post_order,
            back_edges,
        }
    }

    /// Remove everything, stopping every node's timers
    pub fn clear(&mut self) {
        for node in self.nodes.values() {
            node.stop();
        }
        self.nodes.clear();
        self.node_order.clear();
        self.edges.clear();
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot {
            nodes: self.nodes().map(|node| node.snapshot()).collect(),
            edges: self.edges.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::{DisplayNode, TextInputNode};

    fn source(graph: &mut Graph, id: &str) {
        graph
            .add_behavior(id, Box::new(TextInputNode::new(id)))
            .unwrap();
    }

    fn sink(graph: &mut Graph, id: &str) {
        graph.add_behavior(id, Box::new(DisplayNode)).unwrap();
    }

    #[test]
    fn test_build_execution_order_simple() {
        let mut graph = Graph::new();
        source(&mut graph, "node1");
        sink(&mut graph, "node2");
        graph.add_edge("node1", "node2").unwrap();

        let order = graph.compute_execution_order();
        assert_eq!(order.order, vec!["node1", "node2"]);
        assert!(!order.has_cycle());
    }

    #[test]
    fn test_duplicate_node_id() {
        let mut graph = Graph::new();
        source(&mut graph, "a");
        let err = graph
            .add_behavior("a", Box::new(DisplayNode))
            .unwrap_err();
        assert_eq!(err, GraphError::DuplicateNode("a".to_string()));
    }

    #[test]
    fn test_port_capabilities() {
        let mut graph = Graph::new();
        source(&mut graph, "src");
        sink(&mut graph, "out");
        source(&mut graph, "other");

        assert!(matches!(
            graph.add_edge("out", "src"),
            Err(GraphError::MissingPort { .. })
        ));
        assert!(matches!(
            graph.add_edge("other", "src"),
            Err(GraphError::MissingPort { .. })
        ));
        assert!(graph.edges().is_empty());
    }

    #[test]
    fn test_unknown_endpoint() {
        let mut graph = Graph::new();
        source(&mut graph, "a");
        assert_eq!(
            graph.add_edge("a", "ghost"),
            Err(GraphError::UnknownNode("ghost".to_string()))
        );
    }

    #[test]
    fn test_remove_edge() {
        let mut graph = Graph::new();
        source(&mut graph, "a");
        sink(&mut graph, "b");
        graph.add_edge("a", "b").unwrap();

        graph.remove_edge("a", "b").unwrap();
        assert!(graph.edges().is_empty());
        assert!(matches!(
            graph.remove_edge("a", "b"),
            Err(GraphError::MissingEdge { .. })
        ));
    }

    #[test]
    fn test_neighbors_and_roots() {
        let mut graph = Graph::new();
        source(&mut graph, "a");
        source(&mut graph, "b");
        sink(&mut graph, "c");
        graph.add_edge("a", "c").unwrap();
        graph.add_edge("b", "c").unwrap();

        let neighbors = graph.neighbors();
        assert_eq!(neighbors["c"].incoming, vec!["a", "b"]);
        assert_eq!(neighbors["a"].outgoing, vec!["c"]);
        assert_eq!(graph.roots(), vec!["a", "b"]);
    }

    #[test]
    fn test_remove_node_stops_it() {
        let mut graph = Graph::new();
        source(&mut graph, "a");
        let removed = graph.remove_node("a").unwrap();
        assert!(removed.is_stopped());
        assert!(graph.is_empty());
        assert!(graph.remove_node("a").is_err());
    }
}
