//! Slash command parsing for the terminal client.
//!
//! Lines starting with `/` control rooms and the session; every other line
//! is sent to the active room as a prompt.

use std::path::PathBuf;

use crate::RoomId;
use crate::export::ExportFormat;
use crate::store::RoomStore;

/// Title used by `/new` without an argument.
pub const DEFAULT_ROOM_TITLE: &str = "New chat";

/// A room named on the command line, by list position or by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomRef {
    /// 1-based position in the displayed room list.
    Position(usize),
    /// A room id.
    Id(RoomId),
}

impl RoomRef {
    fn parse(arg: &str) -> Self {
        match arg.parse::<usize>() {
            Ok(position) => RoomRef::Position(position),
            Err(_) => RoomRef::Id(RoomId::from(arg)),
        }
    }

    /// Resolve against the displayed list.  Ids are taken as given.
    pub fn resolve(&self, rooms: &RoomStore) -> Option<RoomId> {
        match self {
            RoomRef::Position(position) => rooms.nth(*position).map(|room| room.id.clone()),
            RoomRef::Id(id) => Some(id.clone()),
        }
    }
}

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatCommand {
    /// Reload and show the room list.
    Rooms,

    /// Create a room and select it.
    New(String),

    /// Select a room.
    Select(RoomRef),

    /// Open the context menu on a room.
    Menu(RoomRef),

    /// Rename the room targeted by the context menu.
    Rename(String),

    /// Delete the room targeted by the context menu.
    Delete,

    /// Close the context menu.
    Dismiss,

    /// Stop the reply in progress.
    Stop,

    /// Export the active room.
    Export(ExportFormat, PathBuf),

    /// Display help information.
    Help,

    /// Exit the client.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it
/// should be sent as a prompt.
///
/// # Examples
///
/// ```
/// # use roomchat::chat::parse_command;
/// assert!(parse_command("/quit").is_some());
/// assert!(parse_command("/select 2").is_some());
/// assert!(parse_command("What is 2+2?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();

    if !input.starts_with('/') {
        return None;
    }

    let mut parts = input[1..].splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "rooms" | "ls" => ChatCommand::Rooms,
        "new" => ChatCommand::New(argument.unwrap_or(DEFAULT_ROOM_TITLE).to_string()),
        "select" | "open" => match argument {
            Some(arg) => ChatCommand::Select(RoomRef::parse(arg)),
            None => ChatCommand::Invalid("/select requires a room number or id".to_string()),
        },
        "menu" => match argument {
            Some(arg) => ChatCommand::Menu(RoomRef::parse(arg)),
            None => ChatCommand::Invalid("/menu requires a room number or id".to_string()),
        },
        "rename" => match argument {
            Some(title) => ChatCommand::Rename(title.to_string()),
            None => ChatCommand::Invalid("/rename requires a title".to_string()),
        },
        "delete" => ChatCommand::Delete,
        "dismiss" => ChatCommand::Dismiss,
        "stop" => ChatCommand::Stop,
        "export" => parse_export(argument),
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{command}")),
    };

    Some(result)
}

fn parse_export(argument: Option<&str>) -> ChatCommand {
    let Some(argument) = argument else {
        return ChatCommand::Invalid("/export requires a format and a path".to_string());
    };
    let mut parts = argument.splitn(2, ' ');
    let format = match parts.next().map(str::parse::<ExportFormat>) {
        Some(Ok(format)) => format,
        _ => return ChatCommand::Invalid("/export format must be html, md or json".to_string()),
    };
    match parts.next().map(str::trim).filter(|p| !p.is_empty()) {
        Some(path) => ChatCommand::Export(format, PathBuf::from(path)),
        None => ChatCommand::Invalid("/export requires a path".to_string()),
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /rooms                 Reload and list rooms
  /new [title]           Create a room and open it
  /select <n|id>         Open a room by list number or id
  /menu <n|id>           Target a room for /rename or /delete
  /rename <title>        Rename the targeted room
  /delete                Delete the targeted room
  /dismiss               Close the room menu
  /stop                  Stop the reply in progress (also Ctrl-C)
  /export html|md|json <file>
                         Export the open room
  /help                  Show this help message
  /quit                  Exit"#
}
