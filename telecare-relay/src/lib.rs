pub mod config;
pub mod session;
pub mod signaling;

pub use config::RelayConfig;
pub use session::{JoinError, Participant, Session, SessionRegistry};
pub use signaling::{RelayState, SignalingOutput, SignalingService, ws_handler};

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};

/// Build the signaling router. Browser clients connect from the booking UI's
/// origin, so CORS stays wide open here and authorization happens upstream.
pub fn router(state: RelayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws/{user_id}", get(ws_handler))
        .layer(cors)
        .with_state(state)
}
