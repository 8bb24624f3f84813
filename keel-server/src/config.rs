//! Server configuration
//!
//! Listener addresses, session limits and the optional seed file, read from
//! `KEEL_*` environment variables. A variable that is unset or does not parse
//! takes its default; the others are kept.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::session::SessionConfig;

#[derive(Debug, Clone)]
pub struct Config {
    /// WebSocket control listener
    pub control_addr: SocketAddr,

    /// Snapshot listener; may equal `control_addr`
    pub snapshot_addr: SocketAddr,

    /// A session with no inbound frame for this long is closed
    pub idle_timeout: Duration,

    /// Events a session may fall behind before it starts skipping
    pub event_capacity: usize,

    /// Largest inbound WebSocket message accepted
    pub max_message_bytes: usize,

    /// JSON array of pipelines loaded at startup
    pub seed_file: Option<PathBuf>,
}

impl Config {
    pub fn new(control_addr: SocketAddr, snapshot_addr: SocketAddr) -> Self {
        Self {
            control_addr,
            snapshot_addr,
            idle_timeout: Duration::from_secs(60),
            event_capacity: 256,
            max_message_bytes: 64 * 1024,
            seed_file: None,
        }
    }

    /// Creates configuration from environment variables
    ///
    /// All optional:
    /// - KEEL_CONTROL_ADDR (default: 0.0.0.0:8080)
    /// - KEEL_SNAPSHOT_ADDR (default: 0.0.0.0:8081)
    /// - KEEL_IDLE_TIMEOUT (seconds, default: 60)
    /// - KEEL_EVENT_CAPACITY (default: 256)
    /// - KEEL_MAX_MESSAGE_BYTES (default: 65536)
    /// - KEEL_SEED_FILE
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`Config::from_env`] with an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let control_addr = parse_var(&lookup, "KEEL_CONTROL_ADDR").unwrap_or(defaults.control_addr);
        let snapshot_addr =
            parse_var(&lookup, "KEEL_SNAPSHOT_ADDR").unwrap_or(defaults.snapshot_addr);

        let idle_timeout = parse_var::<u64>(&lookup, "KEEL_IDLE_TIMEOUT")
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_timeout);

        let event_capacity =
            parse_var(&lookup, "KEEL_EVENT_CAPACITY").unwrap_or(defaults.event_capacity);

        let max_message_bytes =
            parse_var(&lookup, "KEEL_MAX_MESSAGE_BYTES").unwrap_or(defaults.max_message_bytes);

        let seed_file = lookup("KEEL_SEED_FILE")
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        Self {
            control_addr,
            snapshot_addr,
            idle_timeout,
            event_capacity,
            max_message_bytes,
            seed_file,
        }
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.idle_timeout.is_zero() {
            anyhow::bail!("idle_timeout must be greater than 0");
        }

        if self.event_capacity == 0 {
            anyhow::bail!("event_capacity must be greater than 0");
        }

        if self.max_message_bytes == 0 {
            anyhow::bail!("max_message_bytes must be greater than 0");
        }

        Ok(())
    }

    /// Both endpoints are served by one listener
    pub fn shares_listener(&self) -> bool {
        self.control_addr == self.snapshot_addr
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            idle_timeout: self.idle_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(
            SocketAddr::from(([0, 0, 0, 0], 8080)),
            SocketAddr::from(([0, 0, 0, 0], 8081)),
        )
    }
}

/// Parsed value of `key`, or `None` when it is unset or invalid
fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, value = %raw, error = %e, "Invalid value, using default");
            None
        }
    }
}
