use crate::session::session::{Participant, Session};
use crate::signaling::SignalingOutput;
use dashmap::DashMap;
use std::sync::Arc;
use telecare_core::{ClientMessage, ParticipantId, ServerMessage, SessionKey};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum JoinError {
    #[error("session {0} already has two participants")]
    RoomFull(SessionKey),
}

/// In-memory session table. Sessions appear on first join and vanish with the
/// last leave; per-session mutation is serialized under the map entry. Entry
/// guards are never held across an await: outbound notifications are computed
/// first and sent after the guard is released.
pub struct SessionRegistry {
    sessions: DashMap<SessionKey, Session>,
    output: Arc<dyn SignalingOutput>,
}

impl SessionRegistry {
    pub fn new(output: Arc<dyn SignalingOutput>) -> Self {
        Self {
            sessions: DashMap::new(),
            output,
        }
    }

    pub fn session_len(&self, key: &SessionKey) -> usize {
        self.sessions.get(key).map(|s| s.len()).unwrap_or(0)
    }

    /// Adds `participant` to the session, creating it if needed. When the
    /// session reaches two members, the participant that was already present
    /// is told about the newcomer (it becomes the negotiation initiator);
    /// the joiner itself gets nothing and waits for an offer.
    pub async fn join(&self, key: &SessionKey, participant: Participant) -> Result<(), JoinError> {
        let joiner = participant.id.clone();

        let notify = {
            let mut entry = self
                .sessions
                .entry(key.clone())
                .or_insert_with(Session::new);
            let session = entry.value_mut();

            if session.contains(&joiner) {
                debug!(session = %key, participant = %joiner, "duplicate join ignored");
                return Ok(());
            }
            if session.is_full() {
                warn!(session = %key, participant = %joiner, "join refused: session full");
                return Err(JoinError::RoomFull(key.clone()));
            }

            session.push(participant);
            info!(session = %key, participant = %joiner, members = session.len(), "participant joined");
            session.earlier_than(&joiner).map(|p| p.id.clone())
        };

        if let Some(existing) = notify {
            self.output
                .send_to(
                    &existing,
                    ServerMessage::UserJoined {
                        peer_id: joiner.clone(),
                    },
                )
                .await;
        }
        Ok(())
    }

    /// Removes `id` from the session. A remaining participant is notified so
    /// it can fall back to waiting; an emptied session is destroyed.
    pub async fn leave(&self, key: &SessionKey, id: &ParticipantId) {
        let survivor = {
            let Some(mut entry) = self.sessions.get_mut(key) else {
                debug!(session = %key, participant = %id, "leave for unknown session ignored");
                return;
            };
            let session = entry.value_mut();
            if !session.remove(id) {
                debug!(session = %key, participant = %id, "leave for non-member ignored");
                return;
            }
            info!(session = %key, participant = %id, members = session.len(), "participant left");
            session.remaining().map(|p| p.id.clone())
        };

        self.sessions.remove_if(key, |_, session| session.is_empty());

        if let Some(survivor) = survivor {
            self.output
                .send_to(&survivor, ServerMessage::PeerLeft { peer_id: id.clone() })
                .await;
        }
    }

    /// Forwards a negotiation message. Delivery happens only when sender and
    /// target are the two current participants of `key`; anything else is a
    /// late or misaddressed message and is dropped with a log line, never
    /// surfaced to clients.
    pub async fn relay(&self, key: &SessionKey, sender: &ParticipantId, message: ClientMessage) {
        let (target, outbound) = match message {
            ClientMessage::Offer { target, payload } => (
                target,
                ServerMessage::Offer {
                    from: sender.clone(),
                    payload,
                },
            ),
            ClientMessage::Answer { target, payload } => (
                target,
                ServerMessage::Answer {
                    from: sender.clone(),
                    payload,
                },
            ),
            ClientMessage::IceCandidate { target, payload } => (
                target,
                ServerMessage::IceCandidate {
                    from: sender.clone(),
                    payload,
                },
            ),
            other => {
                debug!(session = %key, from = %sender, "non-relayable message: {other:?}");
                return;
            }
        };

        let deliverable = self
            .sessions
            .get(key)
            .map(|session| {
                session.contains(sender) && session.contains(&target) && sender != &target
            })
            .unwrap_or(false);

        if !deliverable {
            debug!(session = %key, from = %sender, to = %target, "dropping stale signal");
            return;
        }

        self.output.send_to(&target, outbound).await;
    }
}
