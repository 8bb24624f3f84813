//! Configuration module
//!
//! Where the CLI finds the server.

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the snapshot listener
    pub server_url: String,

    /// WebSocket control endpoint
    pub control_url: String,
}
