use std::time::Duration;
use telecare_core::IceServerConfig;

/// Tunables for one call attempt.
#[derive(Debug, Clone)]
pub struct CallConfig {
    /// STUN/TURN addresses handed to the connection object. When empty, the
    /// list pushed by the relay at connect time is used instead.
    pub ice_servers: Vec<IceServerConfig>,
    /// Hard failures trigger at most this many fresh negotiation rounds
    /// before the call is declared dead.
    pub max_negotiation_attempts: u32,
    /// Backoff step between retry rounds; attempt `n` waits `n * step`.
    pub retry_backoff: Duration,
    /// How long a `disconnected` path state may persist before an in-place
    /// ICE restart is attempted.
    pub disconnect_grace: Duration,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ice_servers: Vec::new(),
            max_negotiation_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            disconnect_grace: Duration::from_secs(1),
        }
    }
}
