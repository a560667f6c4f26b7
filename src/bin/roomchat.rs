//! Interactive terminal client for a rooms chat backend.
//!
//! # Usage
//!
//! ```bash
//! # Connect to a local server
//! roomchat
//!
//! # Connect elsewhere and open a room right away
//! roomchat --base-url http://chat.local:8000/ --room 3
//!
//! # Disable colors (useful for piping output)
//! roomchat --no-color
//! ```
//!
//! Any line that is not a slash command is sent to the open room.  Type
//! `/help` for the command list.  Ctrl-C stops a reply in progress.
//!
//! Set `RUST_LOG` (for example `RUST_LOG=roomchat=debug`) for diagnostics on
//! stderr.

use std::sync::Arc;
use std::sync::mpsc as std_mpsc;

use arrrg::CommandLine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use roomchat::chat::{ChatCommand, ClientArgs, ClientConfig, help_text, parse_command};
use roomchat::menu::{Dismissal, MenuAction};
use roomchat::render::TerminalView;
use roomchat::{Session, SessionState};

/// What the line reader produced.
enum Input {
    Line(String),
    Interrupted,
    Eof,
    Failed(String),
}

/// Main entry point for the roomchat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let (args, _) = ClientArgs::from_command_line_relaxed("roomchat [OPTIONS]");
    let config = ClientConfig::from(args);
    let client = config.client()?;
    tracing::debug!(base_url = %client.base_url(), "starting");

    let mut session = Session::new(
        Arc::new(client),
        TerminalView::with_color(config.use_color),
    );

    println!("roomchat ({})", config.base_url);
    println!("Type /help for commands, /quit to exit\n");
    list_rooms(&mut session).await;
    if let Some(room) = config.initial_room.clone() {
        session.select_room(room);
    }

    let (lines_tx, mut lines_rx) = mpsc::channel::<Input>(1);
    let (ready_tx, ready_rx) = std_mpsc::channel::<()>();
    std::thread::spawn(move || read_lines(lines_tx, ready_rx));

    let mut awaiting_ready = true;
    loop {
        // The prompt is only shown once the session is quiet.
        if awaiting_ready && !session.is_busy() {
            if ready_tx.send(()).is_err() {
                break;
            }
            awaiting_ready = false;
        }

        tokio::select! {
            input = lines_rx.recv() => {
                let Some(input) = input else { break };
                awaiting_ready = true;
                match input {
                    Input::Line(line) => {
                        if !handle_line(&mut session, &line).await {
                            println!("Goodbye!");
                            break;
                        }
                    }
                    Input::Interrupted => {
                        session.stop();
                    }
                    Input::Eof => {
                        println!("\nGoodbye!");
                        break;
                    }
                    Input::Failed(err) => {
                        session.view_mut().print_error(&format!("Input error: {err}"));
                        break;
                    }
                }
            }
            _ = tokio::signal::ctrl_c(), if session.is_busy() => {
                if session.stop() {
                    session.view_mut().print_info("(stopped)");
                }
            }
            _ = session.step(), if session.is_busy() => {}
        }
    }

    Ok(())
}

/// Read lines on a blocking thread, one per `ready` signal.
fn read_lines(lines: mpsc::Sender<Input>, ready: std_mpsc::Receiver<()>) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(err) => {
            let _ = lines.blocking_send(Input::Failed(err.to_string()));
            return;
        }
    };
    while ready.recv().is_ok() {
        let input = match rl.readline("> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(line.as_str());
                Input::Line(line)
            }
            Err(ReadlineError::Interrupted) => Input::Interrupted,
            Err(ReadlineError::Eof) => Input::Eof,
            Err(err) => Input::Failed(err.to_string()),
        };
        let last = matches!(input, Input::Eof | Input::Failed(_));
        if lines.blocking_send(input).is_err() || last {
            break;
        }
    }
}

/// Handle one input line.  Returns false to quit.
async fn handle_line(session: &mut Session<TerminalView>, line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return true;
    }
    let Some(command) = parse_command(line) else {
        match session.state() {
            SessionState::Idle => session
                .view_mut()
                .print_error("No room is open; use /select or /new first."),
            SessionState::Sending | SessionState::Streaming => session
                .view_mut()
                .print_error("A reply is still in progress."),
            SessionState::RoomSelected => {
                if !session.send(line) && session.is_loading_history() {
                    session
                        .view_mut()
                        .print_error("The room's history is still loading.");
                }
            }
        }
        return true;
    };

    match command {
        ChatCommand::Quit => return false,
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("    {line}");
            }
        }
        ChatCommand::Rooms => list_rooms(session).await,
        ChatCommand::New(title) => match session.create_room(&title).await {
            Ok(id) => session
                .view_mut()
                .print_info(&format!("Created room {id}.")),
            Err(err) => session
                .view_mut()
                .print_error(&format!("Failed to create room: {err}")),
        },
        ChatCommand::Select(room) => match room.resolve(session.rooms()) {
            Some(id) => session.select_room(id),
            None => session.view_mut().print_error("No such room."),
        },
        ChatCommand::Menu(room) => match room.resolve(session.rooms()) {
            Some(id) => {
                session
                    .view_mut()
                    .print_info(&format!("Targeting room {id}; /rename, /delete or /dismiss."));
                session.menu_mut().open(id);
            }
            None => session.view_mut().print_error("No such room."),
        },
        ChatCommand::Rename(title) => match session.menu_mut().rename() {
            Some(MenuAction::Rename(id)) => {
                if session.rename_room(&id, &title).await {
                    session.view_mut().print_rooms();
                }
            }
            _ => session.view_mut().print_error("Open the menu on a room first (/menu)."),
        },
        ChatCommand::Delete => match session.menu_mut().delete() {
            Some(MenuAction::Delete(id)) => match session.delete_room(&id).await {
                Ok(()) => session.view_mut().print_rooms(),
                Err(err) => session
                    .view_mut()
                    .print_error(&format!("Failed to delete room: {err}")),
            },
            _ => session.view_mut().print_error("Open the menu on a room first (/menu)."),
        },
        ChatCommand::Dismiss => session.menu_mut().dismiss(Dismissal::Escape),
        ChatCommand::Stop => {
            if !session.stop() {
                session.view_mut().print_info("Nothing to stop.");
            }
        }
        ChatCommand::Export(format, path) => match session.export_to_path(format, &path) {
            Ok(()) => session
                .view_mut()
                .print_info(&format!("Exported to {}", path.display())),
            Err(err) => session
                .view_mut()
                .print_error(&format!("Export failed: {err}")),
        },
        ChatCommand::Invalid(message) => session.view_mut().print_error(&message),
    }
    true
}

async fn list_rooms(session: &mut Session<TerminalView>) {
    match session.refresh_rooms().await {
        Ok(()) => session.view_mut().print_rooms(),
        Err(err) => session
            .view_mut()
            .print_error(&format!("Failed to load rooms: {err}")),
    }
}
