use crate::error::SignalingError;
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use telecare_core::{ClientMessage, ServerMessage};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};
use url::Url;

/// The orchestrator's view of the signaling path. Injected at construction so
/// a call can be driven without a live network.
#[async_trait]
pub trait SignalingChannel: Send {
    async fn send(&mut self, message: ClientMessage) -> Result<(), SignalingError>;
    /// Next message from the relay; `None` once the channel is gone.
    async fn recv(&mut self) -> Option<ServerMessage>;
}

/// Production signaling channel: one WebSocket to the relay, with a writer
/// task draining an outbound queue and a reader task decoding inbound frames.
pub struct WsSignaling {
    outbound_tx: mpsc::UnboundedSender<ClientMessage>,
    inbound_rx: mpsc::UnboundedReceiver<ServerMessage>,
    tasks: Vec<JoinHandle<()>>,
}

impl WsSignaling {
    /// Connect to `base_url` (http(s) or ws(s)) as `user_id`. Identity is set
    /// once here and never mutated afterwards.
    pub async fn connect(base_url: &str, user_id: &str) -> Result<Self, SignalingError> {
        let url = signaling_url(base_url, user_id)?;
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SignalingError::Connect(e.to_string()))?;
        debug!(url = %url, "signaling websocket connected");

        let (mut write, mut read) = stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<ServerMessage>();

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let Ok(json) = serde_json::to_string(&message) else {
                    continue;
                };
                if write.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            let _ = write.send(Message::Close(None)).await;
        });

        let reader = tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => {
                            if inbound_tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!("undecodable server message: {e}"),
                    },
                    Ok(Message::Close(_)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        });

        Ok(Self {
            outbound_tx,
            inbound_rx,
            tasks: vec![writer, reader],
        })
    }
}

#[async_trait]
impl SignalingChannel for WsSignaling {
    async fn send(&mut self, message: ClientMessage) -> Result<(), SignalingError> {
        self.outbound_tx
            .send(message)
            .map_err(|_| SignalingError::Closed)
    }

    async fn recv(&mut self) -> Option<ServerMessage> {
        self.inbound_rx.recv().await
    }
}

impl Drop for WsSignaling {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

fn signaling_url(base_url: &str, user_id: &str) -> Result<Url, SignalingError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| SignalingError::Connect(format!("invalid relay url {base_url}: {e}")))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(SignalingError::Connect(format!(
                "unsupported relay scheme: {other}"
            )));
        }
    };
    url.set_scheme(scheme)
        .map_err(|_| SignalingError::Connect("invalid websocket scheme".into()))?;
    url.set_path(&format!("/ws/{user_id}"));
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}
