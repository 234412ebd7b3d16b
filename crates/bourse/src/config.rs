//! Server configuration.

use std::time::Duration;

use bourse_room::RoomConfig;

use crate::BourseError;

/// Environment variable holding the listen address.
pub const ADDR_VAR: &str = "BOURSE_ADDR";

/// Environment variable holding the idle-room lifetime, in seconds.
pub const ROOM_TTL_VAR: &str = "BOURSE_ROOM_TTL_SECS";

pub const DEFAULT_ADDR: &str = "0.0.0.0:3001";

/// Everything the gateway needs to run.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub room: RoomConfig,
    /// How long a new connection has to send its handshake.
    pub handshake_timeout: Duration,
    /// A connection that sends nothing for this long is dropped.
    /// Heartbeats count.
    pub idle_timeout: Duration,
    /// Rooms with nobody online and no activity for this long are destroyed.
    pub room_idle_ttl: Duration,
    /// How often the sweeper looks for idle rooms.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_ADDR.to_owned(),
            room: RoomConfig::default(),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(15),
            room_idle_ttl: Duration::from_secs(30 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    /// Defaults, overridden by `BOURSE_ADDR` and `BOURSE_ROOM_TTL_SECS`.
    pub fn from_env() -> Result<Self, BourseError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BourseError> {
        let mut config = Self::default();
        if let Some(addr) = lookup(ADDR_VAR).filter(|a| !a.trim().is_empty()) {
            config.bind_addr = addr.trim().to_owned();
        }
        if let Some(raw) = lookup(ROOM_TTL_VAR) {
            let secs: u64 = raw.trim().parse().map_err(|_| {
                BourseError::Config(format!("{ROOM_TTL_VAR} must be whole seconds, got {raw:?}"))
            })?;
            config.room_idle_ttl = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_env() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3001");
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_env_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            (ADDR_VAR, "127.0.0.1:9000"),
            (ROOM_TTL_VAR, " 120 "),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.room_idle_ttl, Duration::from_secs(120));
    }

    #[test]
    fn test_bad_ttl_is_an_error() {
        let err = ServerConfig::from_lookup(lookup(&[(ROOM_TTL_VAR, "soon")])).unwrap_err();
        assert!(matches!(err, BourseError::Config(_)));
        assert!(err.to_string().contains(ROOM_TTL_VAR));
    }
}
