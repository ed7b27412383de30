mod participant;
mod session;
mod signaling;

pub use participant::ParticipantId;
pub use session::SessionKey;
pub use signaling::{
    CandidateInit, ClientMessage, IceServerConfig, ServerMessage, SessionDescription,
};
