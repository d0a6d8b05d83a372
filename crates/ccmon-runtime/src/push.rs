//! Push channel: WebSocket fan-out of registry changes to dashboard viewers.
//!
//! Each subscriber gets a bounded queue. A subscriber is registered and its
//! `init` snapshot built under the registry lock, so the snapshot and the
//! change stream that follows neither overlap nor leave a gap.
//!
//! Allowed origins:
//! - Absent origin header (non-browser clients like curl, native apps)
//! - `null`, `tauri://*`, and `http://` on host `localhost` or `127.0.0.1`
//!   with any port
//!
//! All other origins are rejected with HTTP 403.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, Uri, header};
use axum::response::Response;
use ccmon_core::{ChangeListener, RegistryChange, Session, SessionEvent, ToolCall, UserPrompt};
use chrono::Utc;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::ApiError;
use crate::state::AppState;

/// Per-subscriber queue depth; a subscriber that falls this far behind is
/// dropped and has to reconnect.
pub const SUBSCRIBER_QUEUE: usize = 1024;

// ─── Wire messages ────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushMessage {
    Init {
        sessions: Vec<Session>,
        events: Vec<SessionEvent>,
    },
    SessionUpdate {
        session: Session,
    },
    SessionRemoved {
        pid: u32,
    },
    NewEvent {
        event: SessionEvent,
    },
    #[serde(rename_all = "camelCase")]
    NewPrompt {
        session_id: u32,
        prompt: UserPrompt,
    },
    #[serde(rename_all = "camelCase")]
    ToolStart {
        session_id: u32,
        tool_call: ToolCall,
    },
    #[serde(rename_all = "camelCase")]
    ToolEnd {
        session_id: u32,
        tool_call_id: String,
        duration: i64,
        success: bool,
    },
}

impl From<&RegistryChange> for PushMessage {
    fn from(change: &RegistryChange) -> Self {
        match change {
            RegistryChange::SessionUpserted(session) => Self::SessionUpdate {
                session: session.clone(),
            },
            RegistryChange::SessionRemoved { pid } => Self::SessionRemoved { pid: *pid },
            RegistryChange::EventAppended(event) => Self::NewEvent {
                event: event.clone(),
            },
            RegistryChange::PromptAdded { pid, prompt } => Self::NewPrompt {
                session_id: *pid,
                prompt: prompt.clone(),
            },
            RegistryChange::ToolStarted { pid, tool_call } => Self::ToolStart {
                session_id: *pid,
                tool_call: tool_call.clone(),
            },
            RegistryChange::ToolEnded {
                pid,
                tool_call_id,
                duration_ms,
                success,
            } => Self::ToolEnd {
                session_id: *pid,
                tool_call_id: tool_call_id.clone(),
                duration: *duration_ms,
                success: *success,
            },
        }
    }
}

/// Client → server commands.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    KillSession {
        pid: u32,
    },
    /// Accepted for compatibility; every subscriber receives every change.
    #[serde(rename_all = "camelCase")]
    Subscribe {
        #[serde(default)]
        session_ids: Option<Vec<u32>>,
    },
}

// ─── Hub ──────────────────────────────────────────────────────────

pub type SubscriberId = u64;

pub struct PushHub {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<PushMessage>>>,
    next_id: AtomicU64,
    queue_capacity: usize,
}

impl Default for PushHub {
    fn default() -> Self {
        Self::new()
    }
}

impl PushHub {
    pub fn new() -> Self {
        Self::with_queue_capacity(SUBSCRIBER_QUEUE)
    }

    pub fn with_queue_capacity(queue_capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            queue_capacity: queue_capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, mpsc::Sender<PushMessage>>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<PushMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        self.lock().insert(id, tx);
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        self.lock().remove(&id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Queue `message` for every subscriber without blocking. Disconnected
    /// and backed-up subscribers are dropped.
    pub fn broadcast(&self, message: &PushMessage) {
        self.lock().retain(|id, tx| match tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Closed(_)) => {
                tracing::debug!(subscriber = id, "pruning disconnected subscriber");
                false
            }
            Err(TrySendError::Full(_)) => {
                tracing::warn!(subscriber = id, "subscriber queue full, disconnecting");
                false
            }
        });
    }

    /// Drop every subscriber; their socket tasks send a Close frame.
    pub fn close_all(&self) {
        let mut subscribers = self.lock();
        let n = subscribers.len();
        subscribers.clear();
        tracing::info!(subscribers = n, "push channel closed");
    }
}

impl ChangeListener for PushHub {
    fn on_change(&self, change: &RegistryChange) {
        self.broadcast(&PushMessage::from(change));
    }
}

// ─── WebSocket handler ────────────────────────────────────────────

/// Hosts are compared exactly, so `http://localhost.evil.example` is not
/// a loopback origin.
fn origin_allowed(origin: &str) -> bool {
    if origin == "null" {
        return true;
    }
    let Ok(uri) = origin.parse::<Uri>() else {
        return false;
    };
    match uri.scheme_str() {
        Some("tauri") => true,
        Some("http") => matches!(uri.host(), Some("localhost" | "127.0.0.1")),
        _ => false,
    }
}

pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // No origin header = non-browser client, allow.
    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or("");
        if !origin_allowed(origin) {
            tracing::warn!(origin = %origin, "ws: rejected connection from disallowed origin");
            return Err(ApiError::ForbiddenOrigin(origin.to_owned()));
        }
    }
    Ok(ws.on_upgrade(move |socket| handle_subscriber(socket, state)))
}

async fn handle_subscriber(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let (id, mut queue, snapshot) = {
        let registry = state.registry.lock().await;
        let (id, queue) = state.hub.subscribe();
        let snapshot = PushMessage::Init {
            sessions: registry.all(),
            events: registry.events(),
        };
        (id, queue, snapshot)
    };
    tracing::info!(
        subscriber = id,
        total = state.hub.subscriber_count(),
        "push subscriber connected"
    );

    if send_message(&mut ws_tx, &snapshot).await.is_ok() {
        loop {
            tokio::select! {
                outbound = queue.recv() => {
                    let Some(message) = outbound else {
                        // Dropped by the hub (shutdown or slow consumer).
                        let _ = ws_tx.send(Message::Close(None)).await;
                        break;
                    };
                    if let Err(e) = send_message(&mut ws_tx, &message).await {
                        tracing::debug!(subscriber = id, error = %e, "push write failed");
                        break;
                    }
                }
                inbound = ws_rx.next() => match inbound {
                    Some(Ok(Message::Text(text))) => handle_client_message(&state, text.as_str()).await,
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::debug!(subscriber = id, error = %e, "push read error");
                        break;
                    }
                },
            }
        }
    }

    state.hub.unsubscribe(id);
    tracing::info!(subscriber = id, "push subscriber disconnected");
}

async fn send_message(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    message: &PushMessage,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(message) {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode push message");
            return Ok(());
        }
    };
    ws_tx.send(Message::Text(json.into())).await
}

async fn handle_client_message(state: &AppState, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::KillSession { pid }) => {
            if state.registry.lock().await.kill(pid, Utc::now()) {
                tracing::info!(pid, "session killed from dashboard");
            } else {
                tracing::debug!(pid, "kill_session for unknown pid ignored");
            }
        }
        Ok(ClientMessage::Subscribe { session_ids }) => {
            tracing::debug!(?session_ids, "subscribe hint received");
        }
        Err(e) => tracing::debug!(error = %e, "ignoring malformed push message"),
    }
}

// ─── Tests ────────────────────────────────────────────────────────
