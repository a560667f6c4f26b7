//! Configuration types for the terminal client.
//!
//! This module provides CLI argument parsing via `arrrg` and the resolved
//! configuration the binary runs with.

use std::time::Duration;

use arrrg_derive::CommandLine;

use crate::RoomId;
use crate::client::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT, RoomsClient};
use crate::error::Result;

/// Command-line arguments for the roomchat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ClientArgs {
    /// Server address.
    #[arrrg(optional, "Server address (default: http://127.0.0.1:8000/)", "URL")]
    pub base_url: Option<String>,

    /// Per-request timeout in seconds.
    #[arrrg(optional, "Request timeout in seconds (default: 30)", "SECONDS")]
    pub timeout: Option<u64>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,

    /// Room to select on startup.
    #[arrrg(optional, "Room to open on startup", "ID")]
    pub room: Option<String>,
}

/// Resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// The server address.
    pub base_url: String,

    /// Timeout for every request except the reply stream.
    pub timeout: Duration,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,

    /// Room selected on startup.
    pub initial_room: Option<RoomId>,
}

impl ClientConfig {
    /// Creates a ClientConfig with default values.
    ///
    /// Defaults:
    /// - Base URL: http://127.0.0.1:8000/
    /// - Timeout: 30 seconds
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            use_color: true,
            initial_room: None,
        }
    }

    /// Sets the server address.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    /// Sets the room selected on startup.
    pub fn with_initial_room(mut self, room: Option<RoomId>) -> Self {
        self.initial_room = room;
        self
    }

    /// Build the HTTP client this configuration describes.
    pub fn client(&self) -> Result<RoomsClient> {
        RoomsClient::with_options(Some(&self.base_url), Some(self.timeout))
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl From<ClientArgs> for ClientConfig {
    fn from(args: ClientArgs) -> Self {
        ClientConfig {
            base_url: args
                .base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout: args
                .timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_TIMEOUT),
            use_color: !args.no_color,
            initial_room: args.room.map(RoomId::from),
        }
    }
}
