use crate::api::ApiState;
use crate::controller::{ControllerHandle, DerivedUpdate};
use crate::device::SourceBinding;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Client → server messages
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Only forward updates for these ids (all updates when none are watched)
    Watch { id: String },
    Unwatch { id: String },
    /// Hold a binding's topic while an edit form is open
    OpenDraft { binding: SourceBinding },
    CloseDraft { topic: String },
}

/// Server → client replies to draft requests
#[derive(Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    DraftOpened { topic: String },
    DraftRejected { device_id: String },
}

/// GET /api/ws - Stream derived value changes
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(|socket| handle_socket(socket, state.controller))
}

/// Create WebSocket router
pub fn create_ws_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/ws", get(ws_handler))
        .with_state(state)
}

async fn handle_socket(socket: WebSocket, controller: ControllerHandle) {
    let updates = match controller.subscribe().await {
        Ok(rx) => rx,
        Err(e) => {
            error!(error = %e, "Cannot stream updates, controller unavailable");
            return;
        }
    };

    Connection::new(controller).run(socket, updates).await;
}

/// One WebSocket client: its watch filter and the drafts it holds open
struct Connection {
    controller: ControllerHandle,
    watched: HashSet<String>,
    drafts: Vec<String>,
}

impl Connection {
    fn new(controller: ControllerHandle) -> Self {
        Self {
            controller,
            watched: HashSet::new(),
            drafts: Vec::new(),
        }
    }

    async fn run(mut self, mut socket: WebSocket, mut updates: broadcast::Receiver<DerivedUpdate>) {
        info!("WebSocket connection established");

        loop {
            tokio::select! {
                msg = socket.recv() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            match self.handle_client_message(&text).await {
                                Ok(Some(reply)) => {
                                    if let Err(e) = send_json(&mut socket, &reply).await {
                                        error!(error = %e, "Failed to send reply");
                                        break;
                                    }
                                }
                                Ok(None) => {}
                                Err(e) => warn!(error = %e, "Error handling client message"),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("WebSocket client disconnected");
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if socket.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                    }
                }

                result = updates.recv() => {
                    match result {
                        Ok(update) if self.should_forward(&update) => {
                            if let Err(e) = send_json(&mut socket, &update).await {
                                error!(error = %e, "Failed to send update");
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped = skipped, "WebSocket lagged, skipped updates");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Controller stopped, closing WebSocket");
                            break;
                        }
                    }
                }
            }
        }

        self.release_drafts().await;
        info!("WebSocket connection closed");
    }

    /// Apply one client message, returning the reply to send if any
    async fn handle_client_message(&mut self, text: &str) -> anyhow::Result<Option<ServerMessage>> {
        let msg: ClientMessage = serde_json::from_str(text)?;

        match msg {
            ClientMessage::Watch { id } => {
                self.watched.insert(id);
            }
            ClientMessage::Unwatch { id } => {
                self.watched.remove(&id);
            }
            ClientMessage::OpenDraft { binding } => {
                let device_id = binding.device_id.clone();
                let reply = match self.controller.open_draft(binding).await? {
                    Some(topic) => {
                        self.drafts.push(topic.clone());
                        ServerMessage::DraftOpened { topic }
                    }
                    None => ServerMessage::DraftRejected { device_id },
                };
                return Ok(Some(reply));
            }
            ClientMessage::CloseDraft { topic } => {
                // Only release what this connection acquired
                if let Some(pos) = self.drafts.iter().position(|t| *t == topic) {
                    self.drafts.swap_remove(pos);
                    self.controller.close_draft(topic).await?;
                }
            }
        }

        Ok(None)
    }

    fn should_forward(&self, update: &DerivedUpdate) -> bool {
        self.watched.is_empty() || self.watched.contains(update.id())
    }

    /// Drafts left open by a vanished client must not pin their topics
    async fn release_drafts(&mut self) {
        for topic in self.drafts.drain(..) {
            if self.controller.close_draft(topic).await.is_err() {
                break;
            }
        }
    }
}

async fn send_json<T: Serialize>(socket: &mut WebSocket, msg: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string(msg)?;
    socket.send(Message::Text(json)).await?;
    Ok(())
}
