pub use telecare_core::{ParticipantId, SessionKey};

pub mod model {
    pub use telecare_core::model::*;
}

#[cfg(feature = "relay")]
pub mod relay {
    pub use telecare_relay::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use telecare_client::*;
}
