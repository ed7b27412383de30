use crate::session::{JoinError, Participant, SessionRegistry};
use crate::signaling::SignalingService;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use telecare_core::{ClientMessage, ParticipantId, ServerMessage, SessionKey};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Clone)]
pub struct RelayState {
    pub service: SignalingService,
    pub registry: Arc<SessionRegistry>,
}

impl RelayState {
    pub fn new(service: SignalingService) -> Self {
        let registry = Arc::new(SessionRegistry::new(Arc::new(service.clone())));
        Self { service, registry }
    }
}

/// Signaling endpoint. `user_id` is the caller identity the auth layer put on
/// the path; each socket gets a fresh transient [`ParticipantId`] of its own.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Path(user_id): Path<String>,
    State(state): State<RelayState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, user_id, state))
}

async fn handle_socket(socket: WebSocket, user_id: String, state: RelayState) {
    let id = ParticipantId::new();
    info!(participant = %id, user = %user_id, "new signaling connection");

    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();

    state.service.add_peer(id.clone(), tx);
    state.service.send_signal(
        &id,
        &ServerMessage::Welcome {
            participant_id: id.clone(),
        },
    );
    state.service.send_signal(
        &id,
        &ServerMessage::IceConfig {
            ice_servers: state.service.ice_servers(),
        },
    );

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Reader runs inline so the disposal path below is reached no matter how
    // the connection ends.
    let mut joined: Option<SessionKey> = None;
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    handle_message(&state, &id, &user_id, &mut joined, message).await;
                }
                Err(e) => warn!(participant = %id, "invalid client message: {e:?}"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    if let Some(key) = joined.take() {
        state.registry.leave(&key, &id).await;
    }
    state.service.remove_peer(&id);
    send_task.abort();
    info!(participant = %id, "signaling connection closed");
}

async fn handle_message(
    state: &RelayState,
    id: &ParticipantId,
    user_id: &str,
    joined: &mut Option<SessionKey>,
    message: ClientMessage,
) {
    match message {
        ClientMessage::JoinRoom { session_key } => {
            if joined.as_ref() == Some(&session_key) {
                debug!(participant = %id, session = %session_key, "already joined");
                return;
            }
            // A connection belongs to at most one session at a time.
            if let Some(previous) = joined.take() {
                state.registry.leave(&previous, id).await;
            }

            let participant = Participant::new(id.clone(), Some(user_id.to_owned()));
            match state.registry.join(&session_key, participant).await {
                Ok(()) => *joined = Some(session_key),
                Err(e @ JoinError::RoomFull(_)) => {
                    state.service.send_signal(
                        id,
                        &ServerMessage::RoomError {
                            message: e.to_string(),
                        },
                    );
                }
            }
        }
        ClientMessage::LeaveRoom { session_key } => {
            if joined.as_ref() == Some(&session_key) {
                joined.take();
                state.registry.leave(&session_key, id).await;
            } else {
                debug!(participant = %id, session = %session_key, "leave for unjoined session ignored");
            }
        }
        relayable => {
            if let Some(key) = joined.as_ref() {
                state.registry.relay(key, id, relayable).await;
            } else {
                debug!(participant = %id, "signal from participant outside any session dropped");
            }
        }
    }
}
