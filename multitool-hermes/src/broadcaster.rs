//! WebSocket status feed
//!
//! The engine reports node status transitions and rendered outputs to the
//! `Broadcaster`, which fans them out as JSON events to every connected
//! WebSocket client.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures_util::{sink::SinkExt, stream::StreamExt};
use multitool_libs::{NodeStatus, StatusObserver};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::AppState;

/// Capacity for the broadcast channel
const BROADCAST_CAPACITY: usize = 100;

/// Broadcaster for sending messages to all connected WebSocket clients
#[derive(Clone)]
pub struct Broadcaster {
    /// Broadcast channel sender
    tx: Arc<broadcast::Sender<String>>,
}

impl Broadcaster {
    /// Create a new broadcaster
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self { tx: Arc::new(tx) }
    }

    /// Broadcast a JSON message to all connected clients
    ///
    /// # Arguments
    ///
    /// * `message` - JSON value to broadcast
    pub fn broadcast_json(&self, message: &Value) {
        if let Ok(msg_str) = serde_json::to_string(message) {
            // No receivers is fine
            let _ = self.tx.send(msg_str);
        }
    }

    /// Subscribe to broadcast messages
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusObserver for Broadcaster {
    fn set_status(&self, node_id: &str, status: NodeStatus) {
        debug!("Node {} -> {:?}", node_id, status);
        self.broadcast_json(&json!({
            "type": "status",
            "node_id": node_id,
            "status": status,
        }));
    }

    fn set_output(&self, node_id: &str, display: &str) {
        self.broadcast_json(&json!({
            "type": "output",
            "node_id": node_id,
            "display": display,
        }));
    }
}

/// Handler for GET /ws - WebSocket upgrade
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state.broadcaster))
}

/// Handle an individual WebSocket connection
///
/// # Arguments
///
/// * `socket` - The WebSocket connection
/// * `broadcaster` - Source of the events forwarded to this client
async fn handle_socket(socket: WebSocket, broadcaster: Broadcaster) {
    let client_id = Uuid::new_v4();
    info!("New WebSocket client connected: {}", client_id);

    let (mut sender, mut receiver) = socket.split();
    let mut rx = broadcaster.subscribe();

    let welcome = json!({
        "type": "connected",
        "client_id": client_id.to_string(),
    });
    if sender.send(Message::Text(welcome.to_string())).await.is_err() {
        warn!("Failed to send welcome message to client {}", client_id);
        return;
    }

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if sender.send(Message::Text(msg)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Client {} lagging, skipped {} events", client_id, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Clients only talk to us to close the connection
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                info!("Client {} requested close", client_id);
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => {
            recv_task.abort();
        },
        _ = &mut recv_task => {
            send_task.abort();
        }
    }

    info!("WebSocket client disconnected: {}", client_id);
}
