mod output;
mod service;
mod ws_handler;

pub use output::SignalingOutput;
pub use service::SignalingService;
pub use ws_handler::{RelayState, ws_handler};
