use async_trait::async_trait;
use telecare_core::{ParticipantId, ServerMessage};

/// Seam between the session registry and whatever carries messages to
/// clients. Production uses the WebSocket-backed [`SignalingService`];
/// tests substitute a capturing mock.
///
/// [`SignalingService`]: crate::signaling::SignalingService
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Deliver `message` to one connected participant. Delivery to a
    /// participant that is no longer connected is a no-op.
    async fn send_to(&self, target: &ParticipantId, message: ServerMessage);
}
