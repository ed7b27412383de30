use crate::model::participant::ParticipantId;
use crate::model::session::SessionKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

/// Negotiation payload. The relay forwards it without looking inside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDescription {
    pub sdp: String,
}

/// Network-path candidate payload, field-compatible with RTCIceCandidateInit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateInit {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_m_line_index: Option<u16>,
}

/// Messages a client sends up the signaling channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "d")]
pub enum ClientMessage {
    JoinRoom {
        session_key: SessionKey,
    },
    LeaveRoom {
        session_key: SessionKey,
    },
    Offer {
        target: ParticipantId,
        payload: SessionDescription,
    },
    Answer {
        target: ParticipantId,
        payload: SessionDescription,
    },
    IceCandidate {
        target: ParticipantId,
        payload: CandidateInit,
    },
}

/// Messages the relay sends down the signaling channel. Relayed negotiation
/// messages carry `from` so the receiver can address its reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "d")]
pub enum ServerMessage {
    Welcome {
        participant_id: ParticipantId,
    },
    IceConfig {
        ice_servers: Vec<IceServerConfig>,
    },
    UserJoined {
        peer_id: ParticipantId,
    },
    PeerLeft {
        peer_id: ParticipantId,
    },
    RoomError {
        message: String,
    },
    Offer {
        from: ParticipantId,
        payload: SessionDescription,
    },
    Answer {
        from: ParticipantId,
        payload: SessionDescription,
    },
    IceCandidate {
        from: ParticipantId,
        payload: CandidateInit,
    },
}
