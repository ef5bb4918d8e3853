//! Client configuration loaded from environment variables.
//!
//! Everything has a sensible default so a client can start with zero
//! configuration.

use std::time::Duration;

use tandem_media::IceServers;
use tandem_shared::constants::{EVENT_CHANNEL_CAPACITY, TYPING_IDLE_MS};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// ICE servers handed to the peer-connection layer.
    /// Env: `TANDEM_ICE_SERVERS` (comma-separated URLs)
    /// Default: Google's public STUN server.
    pub ice_servers: IceServers,

    /// Typing inactivity window before the trailing stop signal.
    /// Env: `TANDEM_TYPING_IDLE_MS`
    /// Default: 1000 ms.
    pub typing_idle: Duration,

    /// Capacity of the command/notification/relay channels.
    pub event_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            ice_servers: IceServers::default(),
            typing_idle: Duration::from_millis(TYPING_IDLE_MS),
            event_capacity: EVENT_CHANNEL_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(servers) = std::env::var("TANDEM_ICE_SERVERS") {
            let parsed = parse_server_list(&servers);
            if parsed.is_empty() {
                tracing::warn!(value = %servers, "Empty TANDEM_ICE_SERVERS, using default");
            } else {
                config.ice_servers = IceServers(parsed);
            }
        }

        if let Ok(val) = std::env::var("TANDEM_TYPING_IDLE_MS") {
            match val.parse::<u64>() {
                Ok(ms) if ms > 0 => config.typing_idle = Duration::from_millis(ms),
                _ => {
                    tracing::warn!(value = %val, "Invalid TANDEM_TYPING_IDLE_MS, using default");
                }
            }
        }

        config
    }
}

/// Split a comma-separated server list, dropping empty entries.
fn parse_server_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
