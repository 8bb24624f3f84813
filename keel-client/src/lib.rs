//! Keel Client
//!
//! Type-safe clients for a Keel server: [`SnapshotClient`] reads pipeline
//! state over HTTP, [`ControlClient`] drives pipelines over the WebSocket
//! control channel.
//!
//! # Example
//!
//! ```no_run
//! use keel_client::{ControlClient, SnapshotClient};
//! use keel_core::dto::command::Command;
//!
//! #[tokio::main]
//! async fn main() -> keel_client::Result<()> {
//!     let mut control = ControlClient::connect("ws://localhost:8080/ws").await?;
//!     let outcome = control.command(&Command::deploy("p1", "build")).await?;
//!     println!("{}", outcome);
//!
//!     let snapshot = SnapshotClient::new("http://localhost:8081");
//!     for pipeline in snapshot.list_pipelines().await? {
//!         println!("{} ({} stages)", pipeline.id, pipeline.stages.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod control;
pub mod error;
mod pipelines;

// Re-export commonly used types
pub use control::ControlClient;
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the snapshot endpoint
#[derive(Debug, Clone)]
pub struct SnapshotClient {
    /// Base URL of the snapshot listener (e.g., "http://localhost:8081")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl SnapshotClient {
    /// Create a new snapshot client
    ///
    /// # Example
    /// ```
    /// use keel_client::SnapshotClient;
    ///
    /// let client = SnapshotClient::new("http://localhost:8081");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new snapshot client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the server
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Handle an API response and deserialize JSON
    ///
    /// Error bodies of the form `{"error": "..."}` are unwrapped into the
    /// error message.
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(
                status.as_u16(),
                error_message(&error_text),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}

fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}
