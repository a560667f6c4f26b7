//! Terminal front-end glue.
//!
//! - [`config`]: CLI argument parsing and configuration
//! - [`commands`]: Slash command parsing

mod commands;
mod config;

pub use commands::{ChatCommand, DEFAULT_ROOM_TITLE, RoomRef, help_text, parse_command};
pub use config::{ClientArgs, ClientConfig};
