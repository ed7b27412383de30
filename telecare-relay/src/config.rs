use serde::{Deserialize, Serialize};
use telecare_core::IceServerConfig;

/// Relay configuration. Every field has a usable default so the binary runs
/// with no environment at all; the TURN entry appears only when credentials
/// are supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the signaling endpoint binds to.
    pub listen_addr: String,
    /// Network-path discovery/relay servers handed to clients at connect
    /// time. Consumed as configuration; the servers themselves live
    /// elsewhere.
    pub ice_servers: Vec<IceServerConfig>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:3000".into(),
            ice_servers: vec![IceServerConfig {
                urls: vec!["stun:stun.l.google.com:19302".into()],
                username: None,
                credential: None,
            }],
        }
    }
}

impl RelayConfig {
    /// Reads `TELECARE_LISTEN_ADDR`, `TELECARE_STUN_URLS` (comma separated)
    /// and the `TELECARE_TURN_URL`/`_USERNAME`/`_CREDENTIAL` triple.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("TELECARE_LISTEN_ADDR") {
            config.listen_addr = addr;
        }
        if let Ok(urls) = std::env::var("TELECARE_STUN_URLS") {
            let urls: Vec<String> = urls
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_owned)
                .collect();
            if !urls.is_empty() {
                config.ice_servers = vec![IceServerConfig {
                    urls,
                    username: None,
                    credential: None,
                }];
            }
        }
        if let (Ok(url), Ok(username), Ok(credential)) = (
            std::env::var("TELECARE_TURN_URL"),
            std::env::var("TELECARE_TURN_USERNAME"),
            std::env::var("TELECARE_TURN_CREDENTIAL"),
        ) {
            config.ice_servers.push(IceServerConfig {
                urls: vec![url],
                username: Some(username),
                credential: Some(credential),
            });
        }

        config
    }
}
