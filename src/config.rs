//! Grid configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Every timeout is in milliseconds;
//! a value of `0` disables the corresponding keepalive.

use std::net::SocketAddr;
use std::time::Duration;

/// Top-level grid configuration.
///
/// Loaded once at startup via [`GridConfig::from_env`].
#[derive(Debug, Clone)]
pub struct GridConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8081`).
    pub listen_addr: SocketAddr,

    /// Tokens not re-offered within this window are invalidated
    /// (milliseconds, 0 = never).
    pub token_keepalive_timeout_ms: u64,

    /// Agents not heartbeating within this window are evicted and their
    /// tokens invalidated (milliseconds, 0 = never).
    pub agent_keepalive_timeout_ms: u64,

    /// Period of the keepalive sweep tasks (milliseconds).
    pub keepalive_sweep_interval_ms: u64,

    /// Default selection wait while a matching token exists but is
    /// reserved (milliseconds).
    pub match_exists_timeout_ms: u64,

    /// Default selection wait while no registered token matches at all
    /// (milliseconds). Intended to be much shorter than the match-exists
    /// timeout: it fast-fails obviously misconfigured requests.
    pub no_match_exists_timeout_ms: u64,

    /// Capacity of the EventBus broadcast channel.
    pub event_bus_capacity: usize,
}

impl GridConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`].
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string())
            .parse()?;

        Ok(Self {
            listen_addr,
            token_keepalive_timeout_ms: parse_env("TOKEN_KEEPALIVE_TIMEOUT_MS", 60_000),
            agent_keepalive_timeout_ms: parse_env("AGENT_KEEPALIVE_TIMEOUT_MS", 60_000),
            keepalive_sweep_interval_ms: parse_env("KEEPALIVE_SWEEP_INTERVAL_MS", 10_000),
            match_exists_timeout_ms: parse_env("MATCH_EXISTS_TIMEOUT_MS", 60_000),
            no_match_exists_timeout_ms: parse_env("NO_MATCH_EXISTS_TIMEOUT_MS", 10_000),
            event_bus_capacity: parse_env("EVENT_BUS_CAPACITY", 10_000),
        })
    }

    /// Token keepalive as a [`Duration`] (zero = disabled).
    #[must_use]
    pub const fn token_keepalive(&self) -> Duration {
        Duration::from_millis(self.token_keepalive_timeout_ms)
    }

    /// Agent keepalive as a [`Duration`] (zero = disabled).
    #[must_use]
    pub const fn agent_keepalive(&self) -> Duration {
        Duration::from_millis(self.agent_keepalive_timeout_ms)
    }

    /// Sweep period as a [`Duration`].
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_sweep_interval_ms)
    }

    /// Default match-exists selection timeout as a [`Duration`].
    #[must_use]
    pub const fn match_exists_timeout(&self) -> Duration {
        Duration::from_millis(self.match_exists_timeout_ms)
    }

    /// Default no-match selection timeout as a [`Duration`].
    #[must_use]
    pub const fn no_match_exists_timeout(&self) -> Duration {
        Duration::from_millis(self.no_match_exists_timeout_ms)
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            listen_addr: std::net::SocketAddr::from(([0, 0, 0, 0], 8081)),
            token_keepalive_timeout_ms: 60_000,
            agent_keepalive_timeout_ms: 60_000,
            keepalive_sweep_interval_ms: 10_000,
            match_exists_timeout_ms: 60_000,
            no_match_exists_timeout_ms: 10_000,
            event_bus_capacity: 10_000,
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_no_match_timeout_short() {
        let config = GridConfig::default();
        assert!(config.no_match_exists_timeout() < config.match_exists_timeout());
    }

    #[test]
    fn zero_keepalive_maps_to_zero_duration() {
        let config = GridConfig {
            token_keepalive_timeout_ms: 0,
            ..GridConfig::default()
        };
        assert!(config.token_keepalive().is_zero());
    }
}
