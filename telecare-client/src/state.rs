/// Where the call is in its lifecycle.
///
/// ```text
/// Idle -> AcquiringMedia -> Joining -> WaitingForPeer -> Negotiating
///      -> Connected <-> Degraded -> Closed
/// ```
/// with error branches `AcquiringMedia -> MediaUnavailable` (retried when a
/// peer arrives) and `Negotiating/Connected -> Failed` once retries are
/// exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Idle,
    AcquiringMedia,
    Joining,
    WaitingForPeer,
    MediaUnavailable,
    Negotiating,
    Connected,
    Degraded,
    Failed,
    Closed,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Failed | CallState::Closed)
    }
}

/// Which half of the handshake this participant drives. The participant that
/// was already present when the second one joined initiates; the joiner
/// responds. Deterministic by construction, so both sides can never offer at
/// once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallRole {
    Initiator,
    Responder,
}

/// What the surrounding application renders: current state plus the last
/// user-facing error, if any.
#[derive(Debug, Clone)]
pub struct CallStatus {
    pub state: CallState,
    pub last_error: Option<String>,
}

impl CallStatus {
    pub fn idle() -> Self {
        Self {
            state: CallState::Idle,
            last_error: None,
        }
    }
}
