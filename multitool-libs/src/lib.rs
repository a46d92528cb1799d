//! # Multitool Libraries
//!
//! Core of the Multitool workflow engine: a graph of nodes where each node
//! performs one unit of work and pushes its output to downstream nodes.
//! This crate is UI-agnostic; `multitool-hermes` exposes it over HTTP.
//!
//! ## Main Components
//!
//! - `NodeBehavior` trait: the work a node variant performs
//! - `NodeHandle`: runtime state around a behavior (status, cached output, rerun)
//! - `Graph`: nodes, connections and execution order
//! - `Executor`: runs the graph and propagates outputs downstream
//! - `NodeKind`: catalog of built-in node variants
//! - `AppError` / `NodeError` / `GraphError`: error handling
//! - `ServiceConfig`: YAML configuration of the service

pub mod catalog;
pub mod config;
pub mod definition;
pub mod error;
pub mod executor;
pub mod graph;
pub mod llm;
pub mod node;
pub mod nodes;
pub mod observer;
pub mod payload;

// Re-export main types for convenience
pub use catalog::{NodeKind, NodeServices, NodeSpec};
pub use config::{
    load_service_config, parse_service_config, ChatProviderConfig, ExecutorConfig,
    InputFieldConfig, InputFieldType, RootMode, ServiceConfig,
};
pub use definition::{NodeDefinition, WorkflowDefinition};
pub use error::{AppError, GraphError, NodeError};
pub use executor::{ExecutionReport, ExecutionStatus, Executor, NodeExecutionResult};
pub use graph::{Edge, ExecutionOrder, Graph, GraphSnapshot, Neighbors, SharedGraph};
pub use llm::{ChatBackend, ChatMessage, ChatRole};
pub use node::{NodeBehavior, NodeHandle, NodeRole, NodeSnapshot, NodeStatus};
pub use observer::{NullObserver, StatusObserver};
pub use payload::Payload;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;
