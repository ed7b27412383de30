use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use std::sync::Arc;
use telecare_core::{IceServerConfig, ParticipantId, ServerMessage};
use tokio::sync::mpsc;
use tracing::{error, warn};

struct SignalingInner {
    peers: DashMap<ParticipantId, mpsc::UnboundedSender<Message>>,
    ice_servers: Vec<IceServerConfig>,
}

/// Holds the outbound half of every live signaling connection plus the ICE
/// server list handed to clients at connect time.
#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl SignalingService {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self {
            inner: Arc::new(SignalingInner {
                peers: DashMap::new(),
                ice_servers,
            }),
        }
    }

    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.clone()
    }

    pub fn add_peer(&self, id: ParticipantId, tx: mpsc::UnboundedSender<Message>) {
        self.inner.peers.insert(id, tx);
    }

    pub fn remove_peer(&self, id: &ParticipantId) {
        self.inner.peers.remove(id);
    }

    pub fn send_signal(&self, target: &ParticipantId, message: &ServerMessage) {
        if let Some(peer) = self.inner.peers.get(target) {
            match serde_json::to_string(message) {
                Ok(json) => {
                    if let Err(e) = peer.send(Message::Text(json.into())) {
                        error!("failed to queue message for {target}: {e:?}");
                    }
                }
                Err(e) => error!("failed to serialize server message: {e}"),
            }
        } else {
            warn!("attempted to signal disconnected participant {target}");
        }
    }
}

#[async_trait]
impl SignalingOutput for SignalingService {
    async fn send_to(&self, target: &ParticipantId, message: ServerMessage) {
        self.send_signal(target, &message);
    }
}
