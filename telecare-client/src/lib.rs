pub mod config;
pub mod connection;
pub mod error;
pub mod media;
pub mod orchestrator;
pub mod signaling;
pub mod state;

pub use config::CallConfig;
pub use error::{CallError, MediaError, SignalingError};
pub use media::{LocalMedia, MediaSource, StaticMediaSource};
pub use orchestrator::{CallCommand, CallHandle, Orchestrator};
pub use signaling::{SignalingChannel, WsSignaling};
pub use state::{CallRole, CallState, CallStatus};
