//! Transcript rendering.
//!
//! The [`View`] trait is the presentation surface the session drives: a
//! transcript of message bubbles, a room list, and a couple of controls.  The
//! [`MessageRenderer`] sits in front of it and decides how message text is
//! presented.  User text is always literal; assistant text goes through
//! [`format`](crate::format::format).
//!
//! Two views ship with the crate: [`TranscriptView`] keeps everything in
//! memory, and [`TerminalView`] writes to stdout with optional ANSI styling.

use std::io::{self, Stdout, Write};

use crate::format::format;
use crate::{Role, Room, RoomId, Timestamp};

/// ANSI escape code for dim text (used for timestamps).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code for bold text (used for the active room).
const ANSI_BOLD: &str = "\x1b[1m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// ANSI escape code for cyan text (used for the user label).
const ANSI_CYAN: &str = "\x1b[36m";

/// ANSI escape code for green text (used for the assistant label).
const ANSI_GREEN: &str = "\x1b[32m";

/// ANSI escape code for red text (used for stream failures).
const ANSI_RED: &str = "\x1b[31m";

/// Opaque reference to one bubble in a view's transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BubbleHandle(u64);

impl BubbleHandle {
    /// Wrap a view-assigned identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The view-assigned identifier.
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

/// The content of a bubble.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Literal text; never interpreted as markup.
    Text(String),
    /// Formatted markup together with the text it was derived from.
    Markup {
        /// The unformatted text.
        source: String,
        /// The formatted markup.
        html: String,
    },
}

impl Body {
    /// Literal text.
    pub fn text(text: impl Into<String>) -> Self {
        Body::Text(text.into())
    }

    /// Formatted markup derived from `source`.
    pub fn markup(source: impl Into<String>) -> Self {
        let source = source.into();
        let html = format(&source);
        Body::Markup { source, html }
    }

    /// The body a message of `role` is rendered with.
    pub fn for_role(role: Role, text: impl Into<String>) -> Self {
        match role {
            Role::User => Body::text(text),
            Role::Assistant => Body::markup(text),
        }
    }

    /// The text a reader sees, without markup.
    pub fn source(&self) -> &str {
        match self {
            Body::Text(text) => text,
            Body::Markup { source, .. } => source,
        }
    }

    /// The markup to insert into a document.  Literal text is not escaped
    /// here; views that embed it into markup escape it themselves.
    pub fn html(&self) -> Option<&str> {
        match self {
            Body::Text(_) => None,
            Body::Markup { html, .. } => Some(html),
        }
    }
}

/// Presentation surface driven by the session.
pub trait View: Send {
    /// Remove every bubble from the transcript.
    fn clear_transcript(&mut self);

    /// Add a bubble at the end of the transcript.
    fn append_bubble(&mut self, role: Role, body: Body, timestamp: &str) -> BubbleHandle;

    /// Replace the body of an existing bubble.  Unknown handles are ignored.
    fn update_bubble(&mut self, handle: BubbleHandle, body: Body);

    /// Keep the newest bubble in view.
    fn scroll_to_bottom(&mut self);

    /// Enable or disable the send control.
    fn set_send_enabled(&mut self, enabled: bool);

    /// Empty the prompt input.
    fn clear_prompt(&mut self) {}

    /// Enable or disable the export actions.
    fn set_export_enabled(&mut self, enabled: bool);

    /// Show the room list, in display order.
    fn show_rooms(&mut self, rooms: &[Room]);

    /// Mark one room (or none) as active in the room list.
    fn highlight_room(&mut self, room: Option<&RoomId>);
}

/// Renders messages into a [`View`].
pub struct MessageRenderer<V: View> {
    view: V,
}

impl<V: View> MessageRenderer<V> {
    /// Creates a renderer over a view.
    pub fn new(view: V) -> Self {
        Self { view }
    }

    /// Append a message bubble and scroll to it.
    ///
    /// Without a timestamp the bubble is stamped with the current time.
    pub fn append(&mut self, role: Role, text: &str, timestamp: Option<Timestamp>) -> BubbleHandle {
        let clock = timestamp.unwrap_or_else(Timestamp::now).clock();
        let handle = self
            .view
            .append_bubble(role, Body::for_role(role, text), &clock);
        self.view.scroll_to_bottom();
        handle
    }

    /// Re-derive an assistant bubble from its accumulated text.
    pub fn update_markup(&mut self, handle: BubbleHandle, text: &str) {
        self.view.update_bubble(handle, Body::markup(text));
        self.view.scroll_to_bottom();
    }

    /// Replace a bubble's content with literal text.
    pub fn set_text(&mut self, handle: BubbleHandle, text: &str) {
        self.view.update_bubble(handle, Body::text(text));
        self.view.scroll_to_bottom();
    }

    /// Remove every bubble.
    pub fn clear(&mut self) {
        self.view.clear_transcript();
    }

    /// The underlying view.
    pub fn view(&self) -> &V {
        &self.view
    }

    /// The underlying view, for mutation.
    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    /// Consumes the renderer, returning the view.
    pub fn into_view(self) -> V {
        self.view
    }
}

////////////////////////////////////////// Memory //////////////////////////////////////////

/// One bubble held by a [`TranscriptView`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bubble {
    /// The bubble's handle.
    pub handle: BubbleHandle,
    /// The author.
    pub role: Role,
    /// Current content.
    pub body: Body,
    /// Display timestamp, `HH:MM`.
    pub timestamp: String,
}

/// An in-memory view.
///
/// Handles are never reused, so a handle that outlived a transcript clear
/// cannot alias a newer bubble.
#[derive(Debug, Clone)]
pub struct TranscriptView {
    bubbles: Vec<Bubble>,
    next_handle: u64,
    rooms: Vec<Room>,
    highlighted: Option<RoomId>,
    send_enabled: bool,
    export_enabled: bool,
    prompt_clears: usize,
    scrolls: usize,
}

impl TranscriptView {
    /// Creates an empty view with sending enabled and export disabled.
    pub fn new() -> Self {
        Self {
            bubbles: Vec::new(),
            next_handle: 0,
            rooms: Vec::new(),
            highlighted: None,
            send_enabled: true,
            export_enabled: false,
            prompt_clears: 0,
            scrolls: 0,
        }
    }

    /// The transcript, oldest first.
    pub fn bubbles(&self) -> &[Bubble] {
        &self.bubbles
    }

    /// The visible text of every bubble, oldest first.
    pub fn texts(&self) -> Vec<&str> {
        self.bubbles.iter().map(|b| b.body.source()).collect()
    }

    /// Look up a bubble.
    pub fn bubble(&self, handle: BubbleHandle) -> Option<&Bubble> {
        self.bubbles.iter().find(|b| b.handle == handle)
    }

    /// The listed rooms.
    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    /// The highlighted room.
    pub fn highlighted(&self) -> Option<&RoomId> {
        self.highlighted.as_ref()
    }

    /// Whether the send control is enabled.
    pub fn send_enabled(&self) -> bool {
        self.send_enabled
    }

    /// Whether the export actions are enabled.
    pub fn export_enabled(&self) -> bool {
        self.export_enabled
    }

    /// How many times the prompt input was cleared.
    pub fn prompt_clears(&self) -> usize {
        self.prompt_clears
    }

    /// How many times the transcript was scrolled to the bottom.
    pub fn scrolls(&self) -> usize {
        self.scrolls
    }
}

impl Default for TranscriptView {
    fn default() -> Self {
        Self::new()
    }
}

impl View for TranscriptView {
    fn clear_transcript(&mut self) {
        self.bubbles.clear();
    }

    fn append_bubble(&mut self, role: Role, body: Body, timestamp: &str) -> BubbleHandle {
        let handle = BubbleHandle::new(self.next_handle);
        self.next_handle += 1;
        self.bubbles.push(Bubble {
            handle,
            role,
            body,
            timestamp: timestamp.to_string(),
        });
        handle
    }

    fn update_bubble(&mut self, handle: BubbleHandle, body: Body) {
        if let Some(bubble) = self.bubbles.iter_mut().find(|b| b.handle == handle) {
            bubble.body = body;
        }
    }

    fn scroll_to_bottom(&mut self) {
        self.scrolls += 1;
    }

    fn set_send_enabled(&mut self, enabled: bool) {
        self.send_enabled = enabled;
    }

    fn clear_prompt(&mut self) {
        self.prompt_clears += 1;
    }

    fn set_export_enabled(&mut self, enabled: bool) {
        self.export_enabled = enabled;
    }

    fn show_rooms(&mut self, rooms: &[Room]) {
        self.rooms = rooms.to_vec();
    }

    fn highlight_room(&mut self, room: Option<&RoomId>) {
        self.highlighted = room.cloned();
    }
}

///////////////////////////////////////// Terminal /////////////////////////////////////////

/// A view that writes the transcript to stdout.
///
/// Streaming updates that extend the live bubble print only the new suffix;
/// any other replacement reprints the bubble on a fresh line.
pub struct TerminalView {
    stdout: Stdout,
    use_color: bool,
    next_handle: u64,
    live: Option<(BubbleHandle, String)>,
    highlighted: Option<RoomId>,
    rooms: Vec<Room>,
}

impl TerminalView {
    /// Creates a new TerminalView with ANSI colors enabled.
    pub fn new() -> Self {
        Self::with_color(true)
    }

    /// Creates a new TerminalView with specified color setting.
    pub fn with_color(use_color: bool) -> Self {
        Self {
            stdout: io::stdout(),
            use_color,
            next_handle: 0,
            live: None,
            highlighted: None,
            rooms: Vec::new(),
        }
    }

    /// Print an informational line.
    pub fn print_info(&mut self, info: &str) {
        self.finish_live();
        println!("{info}");
        self.flush();
    }

    /// Print an error line.
    pub fn print_error(&mut self, error: &str) {
        self.finish_live();
        if self.use_color {
            eprintln!("{ANSI_RED}Error: {error}{ANSI_RESET}");
        } else {
            eprintln!("Error: {error}");
        }
    }

    /// Print the room list with display positions.
    pub fn print_rooms(&mut self) {
        self.finish_live();
        if self.rooms.is_empty() {
            println!("    (no rooms)");
        }
        for (idx, room) in self.rooms.iter().enumerate() {
            let active = self.highlighted.as_ref() == Some(&room.id);
            let marker = if active { '*' } else { ' ' };
            if active && self.use_color {
                println!(
                    "  {marker} {}. {ANSI_BOLD}{}{ANSI_RESET} ({})",
                    idx + 1,
                    room.title,
                    room.id
                );
            } else {
                println!("  {marker} {}. {} ({})", idx + 1, room.title, room.id);
            }
        }
        self.flush();
    }

    fn flush(&mut self) {
        let _ = self.stdout.flush();
    }

    fn finish_live(&mut self) {
        if self.live.take().is_some() {
            println!();
        }
    }

    fn label(&self, role: Role, timestamp: &str) -> String {
        let name = match role {
            Role::User => "You",
            Role::Assistant => "Assistant",
        };
        if self.use_color {
            let color = match role {
                Role::User => ANSI_CYAN,
                Role::Assistant => ANSI_GREEN,
            };
            format!("{ANSI_DIM}[{timestamp}]{ANSI_RESET} {color}{name}:{ANSI_RESET} ")
        } else {
            format!("[{timestamp}] {name}: ")
        }
    }

    fn print_body(&self, role: Role, body: &Body) {
        match body {
            Body::Text(text) if role == Role::Assistant && self.use_color => {
                print!("{ANSI_RED}{text}{ANSI_RESET}");
            }
            body => print!("{}", body.source()),
        }
    }
}

impl Default for TerminalView {
    fn default() -> Self {
        Self::new()
    }
}

impl View for TerminalView {
    fn clear_transcript(&mut self) {
        self.finish_live();
        println!();
    }

    fn append_bubble(&mut self, role: Role, body: Body, timestamp: &str) -> BubbleHandle {
        self.finish_live();
        let handle = BubbleHandle::new(self.next_handle);
        self.next_handle += 1;
        print!("{}", self.label(role, timestamp));
        self.print_body(role, &body);
        self.live = Some((handle, body.source().to_string()));
        handle
    }

    fn update_bubble(&mut self, handle: BubbleHandle, body: Body) {
        let printed_len = match self.live.as_ref() {
            Some((live, printed))
                if *live == handle
                    && matches!(body, Body::Markup { .. })
                    && body.source().starts_with(printed.as_str()) =>
            {
                Some(printed.len())
            }
            Some((live, _)) if *live == handle => None,
            _ => return,
        };
        match printed_len {
            Some(len) => print!("{}", &body.source()[len..]),
            None => {
                println!();
                self.print_body(Role::Assistant, &body);
            }
        }
        self.live = Some((handle, body.source().to_string()));
    }

    fn scroll_to_bottom(&mut self) {
        self.flush();
    }

    fn set_send_enabled(&mut self, enabled: bool) {
        if enabled {
            self.finish_live();
            self.flush();
        }
    }

    fn set_export_enabled(&mut self, _: bool) {}

    fn show_rooms(&mut self, rooms: &[Room]) {
        self.rooms = rooms.to_vec();
    }

    fn highlight_room(&mut self, room: Option<&RoomId>) {
        self.highlighted = room.cloned();
    }
}
