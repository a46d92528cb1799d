//! # Multitool Hermes - The Workflow Service
//!
//! HTTP front of the Multitool workflow engine. Responsible for:
//! - Editing the in-memory workflow (nodes, connections, configs)
//! - Running the whole workflow, single nodes and periodic triggers
//! - Streaming node status changes to WebSocket clients
//! - Saving and loading workflows in the nexus directory
//!
//! ## Architecture
//!
//! Hermes owns a single shared `Graph` and an `Executor` driving it:
//! 1. Loads `config.yaml` (port, nexus directory, executor, chat provider)
//! 2. Builds nodes from the built-in catalog on request
//! 3. Reports every status transition through the `Broadcaster`
//! 4. Persists workflow definitions through the `WorkspaceManager`

mod broadcaster;
mod models;
mod workspace;

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use multitool_libs::{
    load_service_config, AppError, ChatBackend, Edge, ExecutionOrder, ExecutionReport, Executor,
    GraphError, GraphSnapshot, NodeError, NodeHandle, NodeKind, NodeServices, NodeSnapshot,
    NodeSpec, Payload, ServiceConfig, SharedGraph, WorkflowDefinition,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use broadcaster::{websocket_handler, Broadcaster};
use models::OpenAiChatBackend;
use workspace::{SaveWorkspaceRequest, WorkspaceListResponse, WorkspaceManager};

/// Main application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    /// The workflow being edited
    graph: SharedGraph,
    /// Runs the workflow and reports to the broadcaster
    executor: Arc<Executor>,
    /// WebSocket fan-out of status events
    broadcaster: Broadcaster,
    /// Workspace manager for persistence
    workspace_manager: Arc<WorkspaceManager>,
    /// Collaborators handed to new nodes
    services: NodeServices,
}

impl AppState {
    /// Build the state from the service config
    ///
    /// # Arguments
    ///
    /// * `config` - Loaded service configuration
    /// * `chat` - LLM backend for chat nodes, if one is configured
    fn new(config: &ServiceConfig, chat: Option<Arc<dyn ChatBackend>>, http: reqwest::Client) -> Self {
        let graph = multitool_libs::Graph::new().into_shared();
        let broadcaster = Broadcaster::new();
        let executor = Executor::with_observer(
            Arc::clone(&graph),
            Arc::new(broadcaster.clone()),
            config.executor.clone(),
        );

        Self {
            graph,
            executor: Arc::new(executor),
            broadcaster,
            workspace_manager: Arc::new(WorkspaceManager::new(&config.nexus_dir)),
            services: NodeServices { http, chat },
        }
    }

    async fn node(&self, node_id: &str) -> Result<Arc<NodeHandle>, AppError> {
        self.graph
            .read()
            .await
            .node(node_id)
            .ok_or_else(|| NodeError::NotFound(node_id.to_string()).into())
    }
}

// === API Handlers ===

/// Handler for GET /health - Simple health check endpoint
async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Handler for GET /nodes/catalog - Built-in node kinds and their fields
async fn get_catalog() -> Json<Vec<NodeSpec>> {
    Json(NodeKind::catalog())
}

/// Handler for GET /workflow - Snapshot of nodes and connections
async fn get_workflow(State(state): State<AppState>) -> Json<GraphSnapshot> {
    Json(state.graph.read().await.snapshot())
}

/// Handler for DELETE /workflow - Remove everything
async fn clear_workflow(State(state): State<AppState>) -> StatusCode {
    state.graph.write().await.clear();
    info!("Workflow cleared");
    StatusCode::NO_CONTENT
}

/// Request body for POST /workflow/nodes
#[derive(Debug, Deserialize)]
struct AddNodeRequest {
    kind: NodeKind,
    #[serde(default)]
    config: Value,
    /// Generated when omitted
    id: Option<String>,
}

#[derive(Debug, Serialize)]
struct AddNodeResponse {
    id: String,
}

/// Handler for POST /workflow/nodes - Create a node from the catalog
async fn add_node(
    State(state): State<AppState>,
    Json(request): Json<AddNodeRequest>,
) -> Result<(StatusCode, Json<AddNodeResponse>), AppError> {
    let id = request
        .id
        .unwrap_or_else(|| format!("{}-{}", request.kind, Uuid::new_v4()));
    let behavior = request.kind.build(&request.config, &state.services)?;

    state
        .graph
        .write()
        .await
        .add_node(NodeHandle::new(id.clone(), behavior))?;

    Ok((StatusCode::CREATED, Json(AddNodeResponse { id })))
}

/// Handler for DELETE /workflow/nodes/:id - Remove a node and its connections
async fn delete_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .graph
        .write()
        .await
        .remove_node(&node_id)
        .map_err(|err| match err {
            GraphError::UnknownNode(id) => AppError::Node(NodeError::NotFound(id)),
            other => other.into(),
        })?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for PATCH /workflow/nodes/:id/config - Merge into the node's config
async fn update_node_config(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<NodeSnapshot>, AppError> {
    let node = state.node(&node_id).await?;
    node.update_config(&patch)?;
    Ok(Json(node.snapshot()))
}

#[derive(Debug, Deserialize)]
struct RerunRequest {
    rerun: bool,
}

/// Handler for PUT /workflow/nodes/:id/rerun - Toggle the rerun flag
async fn set_node_rerun(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Json(request): Json<RerunRequest>,
) -> Result<Json<NodeSnapshot>, AppError> {
    let node = state.node(&node_id).await?;
    node.set_rerun(request.rerun);
    Ok(Json(node.snapshot()))
}

#[derive(Debug, Default, Deserialize)]
struct RunParams {
    #[serde(default)]
    cascade: bool,
}

/// Handler for POST /workflow/nodes/:id/run - Run one node
async fn run_node(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
    Query(params): Query<RunParams>,
) -> Result<Json<Payload>, AppError> {
    info!("Running node {} (cascade: {})", node_id, params.cascade);
    let output = state.executor.execute_single(&node_id, params.cascade).await?;
    Ok(Json(output))
}

/// Handler for POST /workflow/nodes/:id/trigger/start
async fn start_trigger(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.executor.start_trigger(&node_id).await?;
    Ok(StatusCode::OK)
}

/// Handler for POST /workflow/nodes/:id/trigger/stop
async fn stop_trigger(
    State(state): State<AppState>,
    Path(node_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let stopped = state.executor.stop_trigger(&node_id).await?;
    Ok(Json(json!({ "stopped": stopped })))
}

/// Handler for POST /workflow/edges - Connect two nodes
async fn add_edge(
    State(state): State<AppState>,
    Json(edge): Json<Edge>,
) -> Result<StatusCode, AppError> {
    state.graph.write().await.add_edge(&edge.from, &edge.to)?;
    Ok(StatusCode::CREATED)
}

/// Handler for DELETE /workflow/edges - Disconnect two nodes
async fn delete_edge(
    State(state): State<AppState>,
    Json(edge): Json<Edge>,
) -> Result<StatusCode, AppError> {
    state.graph.write().await.remove_edge(&edge.from, &edge.to)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for GET /workflow/order - Current execution order
async fn get_order(State(state): State<AppState>) -> Json<ExecutionOrder> {
    Json(state.graph.read().await.compute_execution_order())
}

/// Handler for POST /workflow/run - Execute the whole workflow
async fn run_workflow(State(state): State<AppState>) -> Json<ExecutionReport> {
    info!("Received workflow execution request");
    Json(state.executor.execute_all().await)
}

/// Handler for POST /nexus/save - Save the current workflow
async fn save_workspace(
    State(state): State<AppState>,
    Json(request): Json<SaveWorkspaceRequest>,
) -> Result<StatusCode, AppError> {
    let definition = WorkflowDefinition::from_graph(&*state.graph.read().await);
    state
        .workspace_manager
        .save_workspace(&request.name, &definition)
        .await?;
    Ok(StatusCode::OK)
}

/// Handler for POST /nexus/load/:name - Replace the workflow with a saved one
async fn load_workspace(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<GraphSnapshot>, AppError> {
    let definition = state.workspace_manager.load_workspace(&name).await?;
    let loaded = definition.build_graph(&state.services)?;

    let mut graph = state.graph.write().await;
    graph.clear();
    *graph = loaded;
    info!("Workspace '{}' loaded with {} nodes", name, graph.len());
    Ok(Json(graph.snapshot()))
}

/// Handler for GET /nexus/list - List all workspaces
async fn list_workspaces(
    State(state): State<AppState>,
) -> Result<Json<WorkspaceListResponse>, AppError> {
    let workspaces = state.workspace_manager.list_workspaces().await?;
    Ok(Json(WorkspaceListResponse { workspaces }))
}

/// Handler for DELETE /nexus/:name - Delete a saved workspace
async fn delete_workspace(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, AppError> {
    state.workspace_manager.delete_workspace(&name).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Create the main HTTP router with all endpoints
fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/nodes/catalog", get(get_catalog))
        .route("/workflow", get(get_workflow).delete(clear_workflow))
        .route("/workflow/nodes", post(add_node))
        .route("/workflow/nodes/:node_id", delete(delete_node))
        .route("/workflow/nodes/:node_id/config", patch(update_node_config))
        .route("/workflow/nodes/:node_id/rerun", put(set_node_rerun))
        .route("/workflow/nodes/:node_id/run", post(run_node))
        .route("/workflow/nodes/:node_id/trigger/start", post(start_trigger))
        .route("/workflow/nodes/:node_id/trigger/stop", post(stop_trigger))
        .route("/workflow/edges", post(add_edge).delete(delete_edge))
        .route("/workflow/order", get(get_order))
        .route("/workflow/run", post(run_workflow))
        .route("/nexus/save", post(save_workspace))
        .route("/nexus/load/:name", post(load_workspace))
        .route("/nexus/list", get(list_workspaces))
        .route("/nexus/:name", delete(delete_workspace))
        .route("/ws", get(websocket_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Load `config.yaml`, falling back to defaults when it does not exist
fn load_config(path: &str) -> Result<ServiceConfig> {
    if !std::path::Path::new(path).exists() {
        warn!("Config file {} not found, using defaults", path);
        return Ok(ServiceConfig::default());
    }
    Ok(load_service_config(path)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "multitool_hermes=info,multitool_libs=info,tower_http=info".into()
            }),
        )
        .init();

    info!("Starting Multitool Hermes");

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
    let config = load_config(&config_path)?;

    let http = reqwest::Client::new();
    let chat: Option<Arc<dyn ChatBackend>> = match &config.chat {
        Some(chat) => {
            info!("Chat nodes use {} at {}", chat.model, chat.base_url);
            Some(Arc::new(OpenAiChatBackend::from_config(chat, http.clone())))
        }
        None => {
            warn!("No chat provider configured, chat nodes will fail");
            None
        }
    };

    let state = AppState::new(&config, chat, http);
    let app = create_router(state);

    // PORT overrides the configured port
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.port);

    let addr = format!("0.0.0.0:{}", port);
    info!("Starting Hermes API server on {}", addr);

    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_app(nexus: &TempDir) -> Router {
        let config = ServiceConfig {
            nexus_dir: nexus.path().to_path_buf(),
            ..ServiceConfig::default()
        };
        create_router(AppState::new(&config, None, reqwest::Client::new()))
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn build_hello_workflow(app: &Router) {
        let (status, _) = send(
            app,
            Method::POST,
            "/workflow/nodes",
            Some(json!({"id": "a", "kind": "text_input", "config": {"text": "hello"}})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(
            app,
            Method::POST,
            "/workflow/nodes",
            Some(json!({"id": "b", "kind": "display"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(
            app,
            Method::POST,
            "/workflow/edges",
            Some(json!({"from": "a", "to": "b"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_health_and_catalog() {
        let nexus = TempDir::new().unwrap();
        let app = test_app(&nexus);

        let (status, _) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, catalog) = send(&app, Method::GET, "/nodes/catalog", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(catalog.as_array().unwrap().len(), NodeKind::ALL.len());
    }

    #[tokio::test]
    async fn test_build_and_run_workflow() {
        let nexus = TempDir::new().unwrap();
        let app = test_app(&nexus);
        build_hello_workflow(&app).await;

        let (_, order) = send(&app, Method::GET, "/workflow/order", None).await;
        assert_eq!(order["order"], json!(["a", "b"]));

        let (status, report) = send(&app, Method::POST, "/workflow/run", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["status"], "success");
        assert_eq!(
            report["node_results"]["b"]["output"],
            json!({"type": "text", "response": "hello"})
        );

        let (_, snapshot) = send(&app, Method::GET, "/workflow", None).await;
        let b = snapshot["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .find(|n| n["id"] == "b")
            .unwrap()
            .clone();
        assert_eq!(b["last_input"]["response"], "hello");
        assert_eq!(b["executed"], true);
    }

    #[tokio::test]
    async fn test_edit_errors() {
        let nexus = TempDir::new().unwrap();
        let app = test_app(&nexus);
        build_hello_workflow(&app).await;

        let (status, _) = send(
            &app,
            Method::POST,
            "/workflow/edges",
            Some(json!({"from": "a", "to": "b"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            Method::POST,
            "/workflow/nodes",
            Some(json!({"kind": "teleporter"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = send(&app, Method::POST, "/workflow/nodes/ghost/run", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, Method::DELETE, "/workflow/nodes/ghost", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_run_single_node_and_reconfigure() {
        let nexus = TempDir::new().unwrap();
        let app = test_app(&nexus);
        build_hello_workflow(&app).await;

        let (status, output) = send(&app, Method::POST, "/workflow/nodes/a/run", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(output["response"], "hello");

        let (status, node) = send(
            &app,
            Method::PATCH,
            "/workflow/nodes/a/config",
            Some(json!({"text": "bye"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(node["executed"], false);

        let (_, output) = send(
            &app,
            Method::POST,
            "/workflow/nodes/a/run?cascade=true",
            None,
        )
        .await;
        assert_eq!(output["response"], "bye");

        let (_, snapshot) = send(&app, Method::GET, "/workflow", None).await;
        let b = snapshot["nodes"]
            .as_array()
            .unwrap()
            .iter()
            .find(|n| n["id"] == "b")
            .unwrap()
            .clone();
        assert_eq!(b["last_input"]["response"], "bye");

        let (status, node) = send(
            &app,
            Method::PUT,
            "/workflow/nodes/b/rerun",
            Some(json!({"rerun": true})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(node["rerun"], true);
    }

    #[tokio::test]
    async fn test_missing_url_is_unprocessable() {
        let nexus = TempDir::new().unwrap();
        let app = test_app(&nexus);

        send(
            &app,
            Method::POST,
            "/workflow/nodes",
            Some(json!({"id": "u", "kind": "url"})),
        )
        .await;

        let (status, body) = send(&app, Method::POST, "/workflow/nodes/u/run", None).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("url"));
    }

    #[tokio::test]
    async fn test_save_and_load_workspace() {
        let nexus = TempDir::new().unwrap();
        let app = test_app(&nexus);
        build_hello_workflow(&app).await;

        let (status, _) = send(&app, Method::POST, "/nexus/save", Some(json!({"name": "demo"}))).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send(&app, Method::DELETE, "/workflow", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (_, snapshot) = send(&app, Method::GET, "/workflow", None).await;
        assert!(snapshot["nodes"].as_array().unwrap().is_empty());

        let (status, snapshot) = send(&app, Method::POST, "/nexus/load/demo", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(snapshot["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(snapshot["edges"], json!([{"from": "a", "to": "b"}]));

        let (_, list) = send(&app, Method::GET, "/nexus/list", None).await;
        assert_eq!(list["workspaces"], json!(["demo"]));

        let (status, _) = send(&app, Method::DELETE, "/nexus/demo", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::POST, "/nexus/load/demo", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_trigger_endpoints() {
        let nexus = TempDir::new().unwrap();
        let app = test_app(&nexus);

        send(
            &app,
            Method::POST,
            "/workflow/nodes",
            Some(json!({"id": "t", "kind": "trigger", "config": {"interval_ms": 60000}})),
        )
        .await;

        let (status, _) = send(&app, Method::POST, "/workflow/nodes/t/trigger/start", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, Method::POST, "/workflow/nodes/t/trigger/stop", None).await;
        assert_eq!(body["stopped"], true);
    }
}
