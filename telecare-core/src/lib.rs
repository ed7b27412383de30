pub mod model;

pub use model::{
    CandidateInit, ClientMessage, IceServerConfig, ParticipantId, ServerMessage,
    SessionDescription, SessionKey,
};
