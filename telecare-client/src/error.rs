use thiserror::Error;

/// Local device acquisition failures. Non-fatal to the session: the
/// orchestrator reports them and retries when a peer shows up.
#[derive(Debug, Clone, Error)]
pub enum MediaError {
    #[error("media devices unavailable: {0}")]
    Unavailable(String),
}

/// Failures of the signaling transport itself.
#[derive(Debug, Error)]
pub enum SignalingError {
    #[error("signaling connection failed: {0}")]
    Connect(String),
    #[error("signaling channel closed")]
    Closed,
}

/// Everything the surrounding application can see go wrong with a call.
/// Transient conditions are recovered inside the orchestrator and never
/// appear here.
#[derive(Debug, Error)]
pub enum CallError {
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error("consultation room is full: {0}")]
    RoomFull(String),
    #[error("negotiation failed after {attempts} attempts")]
    NegotiationFailed { attempts: u32 },
    #[error(transparent)]
    Signaling(#[from] SignalingError),
    #[error(transparent)]
    Webrtc(#[from] webrtc::Error),
}
