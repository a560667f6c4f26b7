//! The session controller.
//!
//! A [`Session`] owns the active room, the at-most-one live [`Connection`]
//! and the transcript.  Network work (history fetches, persisting a prompt,
//! opening a reply stream) runs in spawned tasks that report back over a
//! channel; every report carries the [`RoomTag`] it was started under and is
//! discarded if the session has since moved on.  The live stream is polled by
//! the session itself, so closing it takes effect immediately.
//!
//! The front-end drives the session with [`Session::step`], which waits for
//! the next completion and applies it.  `step` is cancel-safe and can be
//! raced against user input in a `select!`.

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::client::Backend;
use crate::export::{self, ExportFormat};
use crate::menu::{ContextMenu, Dismissal};
use crate::observability::{
    SESSION_ROOM_SWITCHES, SESSION_SENDS, SESSION_SENDS_REJECTED, SESSION_STALE_EVENTS,
};
use crate::render::{BubbleHandle, MessageRenderer, View};
use crate::store::RoomStore;
use crate::stream::{Connection, ConnectionId, DeltaStream};
use crate::{Delta, Error, Message, Result, Role, RoomId, Timestamp};

/// Text shown in the reply bubble when the stream fails before any text
/// arrived.
pub const STREAM_FAILURE_MESSAGE: &str = "Stream connection failed.";

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No room is selected.
    Idle,
    /// A room is selected and a prompt may be sent.
    RoomSelected,
    /// The user's prompt is being persisted.
    Sending,
    /// The reply is being opened or streamed.
    Streaming,
}

/// Identifies the room selection a piece of work was started under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomTag {
    room: RoomId,
    epoch: u64,
}

impl RoomTag {
    /// The room the work belongs to.
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// The selection epoch.  Every selection starts a new one.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// A completion the session has to react to.
pub enum SessionEvent {
    /// A history fetch finished.
    History {
        tag: RoomTag,
        result: Result<Vec<Message>>,
    },
    /// The user's turn was persisted (or failed to be).
    Persisted {
        tag: RoomTag,
        turn: u64,
        result: Result<()>,
    },
    /// The reply stream was opened (or failed to open).
    StreamOpened {
        tag: RoomTag,
        turn: u64,
        result: Result<DeltaStream>,
    },
    /// The live connection produced an item; `None` means the server ended
    /// the stream.
    Stream {
        connection: ConnectionId,
        item: Option<Result<Delta>>,
    },
    /// A task was abandoned because its room was deselected.
    Cancelled { tag: RoomTag },
}

impl fmt::Debug for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEvent::History { tag, result } => f
                .debug_struct("History")
                .field("tag", tag)
                .field("result", &result.as_ref().map(|m| m.len()))
                .finish(),
            SessionEvent::Persisted { tag, turn, result } => f
                .debug_struct("Persisted")
                .field("tag", tag)
                .field("turn", turn)
                .field("result", result)
                .finish(),
            SessionEvent::StreamOpened { tag, turn, result } => f
                .debug_struct("StreamOpened")
                .field("tag", tag)
                .field("turn", turn)
                .field("ok", &result.is_ok())
                .finish(),
            SessionEvent::Stream { connection, item } => f
                .debug_struct("Stream")
                .field("connection", connection)
                .field("item", item)
                .finish(),
            SessionEvent::Cancelled { tag } => {
                f.debug_struct("Cancelled").field("tag", tag).finish()
            }
        }
    }
}

/// The assistant reply currently being produced.
struct Reply {
    handle: BubbleHandle,
    text: String,
    created_at: Timestamp,
}

/// The chat session: one per client.
pub struct Session<V: View> {
    backend: Arc<dyn Backend>,
    renderer: MessageRenderer<V>,
    rooms: RoomStore,
    menu: ContextMenu,
    state: SessionState,
    active_room: Option<RoomId>,
    epoch: u64,
    turn: u64,
    cancel: CancellationToken,
    reply: Option<Reply>,
    connection: Option<Connection>,
    next_connection: u64,
    messages: Vec<Message>,
    history_loaded: bool,
    history_pending: bool,
    in_flight: usize,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
}

impl<V: View> Session<V> {
    /// Create an idle session.
    pub fn new(backend: Arc<dyn Backend>, view: V) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let mut renderer = MessageRenderer::new(view);
        renderer.view_mut().set_send_enabled(false);
        renderer.view_mut().set_export_enabled(false);
        Self {
            backend,
            renderer,
            rooms: RoomStore::new(),
            menu: ContextMenu::new(),
            state: SessionState::Idle,
            active_room: None,
            epoch: 0,
            turn: 0,
            cancel: CancellationToken::new(),
            reply: None,
            connection: None,
            next_connection: 0,
            messages: Vec::new(),
            history_loaded: false,
            history_pending: false,
            in_flight: 0,
            events_tx,
            events_rx,
        }
    }

    /// The current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The selected room.
    pub fn active_room(&self) -> Option<&RoomId> {
        self.active_room.as_ref()
    }

    /// The room list.
    pub fn rooms(&self) -> &RoomStore {
        &self.rooms
    }

    /// The room context menu.
    pub fn menu(&self) -> &ContextMenu {
        &self.menu
    }

    /// The room context menu, for opening it or taking an action.
    pub fn menu_mut(&mut self) -> &mut ContextMenu {
        &mut self.menu
    }

    /// The live connection, if a reply is streaming.
    pub fn connection(&self) -> Option<&Connection> {
        self.connection.as_ref()
    }

    /// The text of the reply in progress.
    pub fn reply_text(&self) -> Option<&str> {
        self.reply.as_ref().map(|r| r.text.as_str())
    }

    /// The active room's messages: its history plus this session's turns.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The view.
    pub fn view(&self) -> &V {
        self.renderer.view()
    }

    /// The view, for mutation.
    pub fn view_mut(&mut self) -> &mut V {
        self.renderer.view_mut()
    }

    /// Returns true while the active room's history is still loading.
    pub fn is_loading_history(&self) -> bool {
        self.history_pending
    }

    /// Returns true while a task is outstanding or a stream is open.
    pub fn is_busy(&self) -> bool {
        self.in_flight > 0 || self.connection.as_ref().is_some_and(Connection::is_open)
    }

    /// Select a room and start loading its history.
    pub fn select_room(&mut self, id: RoomId) {
        self.close_stream();
        self.reply = None;
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.epoch += 1;
        self.turn += 1;
        SESSION_ROOM_SWITCHES.click();
        tracing::debug!(room = %id, epoch = self.epoch, "room selected");

        self.active_room = Some(id.clone());
        self.messages.clear();
        self.history_loaded = false;
        self.history_pending = true;
        self.renderer.clear();
        let view = self.renderer.view_mut();
        view.highlight_room(Some(&id));
        view.set_export_enabled(false);
        view.set_send_enabled(false);
        self.state = SessionState::RoomSelected;

        let tag = self.tag(id.clone());
        let backend = Arc::clone(&self.backend);
        let event_tag = tag.clone();
        self.spawn(
            tag,
            async move { backend.messages(&id).await },
            move |result: Result<Vec<Message>>| SessionEvent::History {
                tag: event_tag,
                result,
            },
        );
    }

    /// Send a prompt in the active room.
    ///
    /// Returns false, and does nothing, if the trimmed prompt is empty, no
    /// room is selected, the room's history has not arrived yet or a previous
    /// send is still in progress.
    pub fn send(&mut self, prompt: &str) -> bool {
        let prompt = prompt.trim();
        let room = match (&self.active_room, self.state) {
            (Some(room), SessionState::RoomSelected)
                if !prompt.is_empty() && !self.history_pending =>
            {
                room.clone()
            }
            _ => {
                SESSION_SENDS_REJECTED.click();
                tracing::debug!(
                    state = ?self.state,
                    history_pending = self.history_pending,
                    "send rejected"
                );
                return false;
            }
        };
        SESSION_SENDS.click();

        let view = self.renderer.view_mut();
        view.set_send_enabled(false);
        view.clear_prompt();
        let now = Timestamp::now();
        self.renderer.append(Role::User, prompt, Some(now));
        self.messages
            .push(Message::new(Role::User, prompt).with_created_at(now));

        self.turn += 1;
        self.state = SessionState::Sending;
        let turn = self.turn;
        let tag = self.tag(room.clone());
        let backend = Arc::clone(&self.backend);
        let prompt = prompt.to_string();
        let event_tag = tag.clone();
        self.spawn(
            tag,
            async move { backend.post_message(&room, &prompt).await },
            move |result: Result<()>| SessionEvent::Persisted {
                tag: event_tag,
                turn,
                result,
            },
        );
        true
    }

    /// Stop the reply in progress, keeping whatever text already arrived.
    ///
    /// Returns false if there was nothing to stop.
    pub fn stop(&mut self) -> bool {
        if !matches!(self.state, SessionState::Sending | SessionState::Streaming) {
            return false;
        }
        tracing::debug!(turn = self.turn, "reply stopped");
        self.turn += 1;
        self.record_partial_reply();
        self.finish_turn();
        true
    }

    /// Wait for the next completion.
    ///
    /// Returns `None` when nothing is outstanding.  Cancel-safe.
    pub async fn next_event(&mut self) -> Option<SessionEvent> {
        if !self.is_busy() {
            return None;
        }
        match self.connection.as_mut().filter(|c| c.is_open()) {
            Some(connection) => {
                let id = connection.id();
                tokio::select! {
                    item = connection.next() => Some(SessionEvent::Stream { connection: id, item }),
                    event = self.events_rx.recv() => event,
                }
            }
            None => self.events_rx.recv().await,
        }
    }

    /// Apply a completion to the session.
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::History { tag, result } => {
                self.task_done();
                if self.is_stale(&tag, None) {
                    return;
                }
                self.on_history(result);
            }
            SessionEvent::Persisted { tag, turn, result } => {
                self.task_done();
                if self.is_stale(&tag, Some(turn)) {
                    return;
                }
                self.on_persisted(tag, result);
            }
            SessionEvent::StreamOpened { tag, turn, result } => {
                self.task_done();
                if self.is_stale(&tag, Some(turn)) {
                    // Dropping the stream here closes it.
                    return;
                }
                self.on_stream_opened(tag, result);
            }
            SessionEvent::Stream { connection, item } => {
                if self.connection.as_ref().map(Connection::id) != Some(connection) {
                    SESSION_STALE_EVENTS.click();
                    tracing::trace!(%connection, "item for a replaced connection dropped");
                    return;
                }
                self.on_stream_item(item);
            }
            SessionEvent::Cancelled { tag } => {
                self.task_done();
                tracing::trace!(room = %tag.room, epoch = tag.epoch, "task cancelled");
            }
        }
    }

    /// Wait for the next completion and apply it.
    ///
    /// Returns false when nothing was outstanding.  Cancel-safe.
    pub async fn step(&mut self) -> bool {
        match self.next_event().await {
            Some(event) => {
                self.apply(event);
                true
            }
            None => false,
        }
    }

    /// Step until no work is outstanding.
    pub async fn settle(&mut self) {
        while self.step().await {}
    }

    /// Reload the room list from the backend.
    pub async fn refresh_rooms(&mut self) -> Result<()> {
        let rooms = self.backend.list_rooms().await?;
        self.rooms.replace_from_backend(rooms);
        let target_gone = self
            .menu
            .target()
            .is_some_and(|target| !self.rooms.contains(target));
        if target_gone {
            self.menu.dismiss(Dismissal::RoomGone);
        }
        let view = self.renderer.view_mut();
        view.show_rooms(self.rooms.rooms());
        view.highlight_room(self.active_room.as_ref());
        Ok(())
    }

    /// Create a room and select it.
    pub async fn create_room(&mut self, title: &str) -> Result<RoomId> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::validation(
                "room title must not be empty",
                Some("title".to_string()),
            ));
        }
        let room = self.backend.create_room(title).await.map_err(|err| {
            tracing::warn!(error = %err, "failed to create room");
            err
        })?;
        tracing::info!(room = %room.id, "room created");
        self.refresh_after_mutation().await;
        self.select_room(room.id.clone());
        Ok(room.id)
    }

    /// Rename a room.  Failures leave everything unchanged.
    ///
    /// Returns true if the backend accepted the new title.
    pub async fn rename_room(&mut self, id: &RoomId, title: &str) -> bool {
        let title = title.trim();
        if title.is_empty() {
            return false;
        }
        if let Err(err) = self.backend.rename_room(id, title).await {
            tracing::debug!(room = %id, error = %err, "rename failed");
            return false;
        }
        self.refresh_after_mutation().await;
        true
    }

    /// Delete a room.  Deleting the active room returns the session to idle.
    pub async fn delete_room(&mut self, id: &RoomId) -> Result<()> {
        self.backend.delete_room(id).await.map_err(|err| {
            tracing::warn!(room = %id, error = %err, "failed to delete room");
            err
        })?;
        tracing::info!(room = %id, "room deleted");
        if self.active_room.as_ref() == Some(id) {
            self.deselect();
        }
        self.refresh_after_mutation().await;
        Ok(())
    }

    /// Render the active room's transcript.
    pub fn export(&self, format: ExportFormat) -> Result<String> {
        let title = self.export_title()?;
        export::render(format, title, &self.messages)
    }

    /// Write the active room's transcript to a file.
    pub fn export_to_path<P: AsRef<Path>>(&self, format: ExportFormat, path: P) -> Result<()> {
        let title = self.export_title()?;
        export::export_to_path(format, title, &self.messages, path)
    }

    fn export_title(&self) -> Result<&str> {
        match &self.active_room {
            Some(room) if self.history_loaded => {
                Ok(self.rooms.title(room).unwrap_or(room.as_str()))
            }
            Some(_) => Err(Error::validation("history is still loading", None)),
            None => Err(Error::validation("no room selected", None)),
        }
    }

    fn tag(&self, room: RoomId) -> RoomTag {
        RoomTag {
            room,
            epoch: self.epoch,
        }
    }

    fn is_stale(&self, tag: &RoomTag, turn: Option<u64>) -> bool {
        let current = tag.epoch == self.epoch
            && self.active_room.as_ref() == Some(&tag.room)
            && turn.is_none_or(|turn| turn == self.turn);
        if !current {
            SESSION_STALE_EVENTS.click();
            tracing::trace!(room = %tag.room, epoch = tag.epoch, "stale completion dropped");
        }
        !current
    }

    fn spawn<T, F>(
        &mut self,
        tag: RoomTag,
        work: F,
        into_event: impl FnOnce(T) -> SessionEvent + Send + 'static,
    ) where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let events = self.events_tx.clone();
        let cancel = self.cancel.clone();
        self.in_flight += 1;
        tokio::spawn(async move {
            let event = tokio::select! {
                _ = cancel.cancelled() => SessionEvent::Cancelled { tag },
                output = work => into_event(output),
            };
            let _ = events.send(event);
        });
    }

    fn task_done(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn on_history(&mut self, result: Result<Vec<Message>>) {
        // No send can precede the history, so the transcript is still empty.
        self.history_pending = false;
        self.renderer.view_mut().set_send_enabled(true);
        let messages = match result {
            Ok(messages) => messages,
            Err(err) => {
                tracing::warn!(error = %err, "failed to load history");
                return;
            }
        };
        self.renderer.clear();
        for message in &messages {
            self.renderer
                .append(message.role, &message.content, message.created_at);
        }
        let view = self.renderer.view_mut();
        view.scroll_to_bottom();
        view.set_export_enabled(true);
        self.messages = messages;
        self.history_loaded = true;
    }

    fn on_persisted(&mut self, tag: RoomTag, result: Result<()>) {
        if let Err(err) = result {
            tracing::warn!(room = %tag.room, error = %err, "failed to persist prompt");
        }
        let handle = self.renderer.append(Role::Assistant, "", None);
        self.reply = Some(Reply {
            handle,
            text: String::new(),
            created_at: Timestamp::now(),
        });
        self.state = SessionState::Streaming;

        let turn = self.turn;
        let backend = Arc::clone(&self.backend);
        let room = tag.room.clone();
        let event_tag = tag.clone();
        self.spawn(
            tag,
            async move { backend.open_stream(&room).await },
            move |result: Result<DeltaStream>| SessionEvent::StreamOpened {
                tag: event_tag,
                turn,
                result,
            },
        );
    }

    fn on_stream_opened(&mut self, tag: RoomTag, result: Result<DeltaStream>) {
        match result {
            Ok(stream) => {
                self.close_stream();
                self.next_connection += 1;
                let connection =
                    Connection::new(ConnectionId::new(self.next_connection), tag.room, stream);
                tracing::debug!(connection = %connection.id(), room = %connection.room(), "stream opened");
                self.connection = Some(connection);
            }
            Err(err) => {
                tracing::warn!(room = %tag.room, error = %err, "failed to open stream");
                self.on_transport_failure();
            }
        }
    }

    fn on_stream_item(&mut self, item: Option<Result<Delta>>) {
        match item {
            Some(Ok(Delta::Text(text))) => {
                if let Some(reply) = self.reply.as_mut() {
                    reply.text.push_str(&text);
                    self.renderer.update_markup(reply.handle, &reply.text);
                }
            }
            Some(Ok(Delta::Error(message))) => {
                tracing::warn!(%message, "reply failed");
                if let Some(reply) = self.reply.as_ref() {
                    self.renderer.set_text(reply.handle, &message);
                }
                self.finish_turn();
            }
            Some(Err(err)) => {
                tracing::warn!(error = %err, "stream failed");
                self.on_transport_failure();
            }
            None => {
                tracing::debug!("reply complete");
                self.record_partial_reply();
                self.finish_turn();
            }
        }
    }

    fn on_transport_failure(&mut self) {
        if let Some(reply) = self.reply.as_ref().filter(|r| r.text.is_empty()) {
            self.renderer.set_text(reply.handle, STREAM_FAILURE_MESSAGE);
        }
        self.record_partial_reply();
        self.finish_turn();
    }

    fn record_partial_reply(&mut self) {
        if let Some(reply) = self.reply.as_ref().filter(|r| !r.text.is_empty()) {
            self.messages.push(
                Message::new(Role::Assistant, reply.text.clone()).with_created_at(reply.created_at),
            );
        }
    }

    fn finish_turn(&mut self) {
        self.close_stream();
        self.reply = None;
        if self.active_room.is_some() {
            self.state = SessionState::RoomSelected;
            self.renderer.view_mut().set_send_enabled(true);
        }
    }

    fn close_stream(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
    }

    fn deselect(&mut self) {
        self.close_stream();
        self.reply = None;
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.epoch += 1;
        self.turn += 1;
        self.active_room = None;
        self.messages.clear();
        self.history_loaded = false;
        self.history_pending = false;
        self.renderer.clear();
        let view = self.renderer.view_mut();
        view.highlight_room(None);
        view.set_export_enabled(false);
        view.set_send_enabled(false);
        self.state = SessionState::Idle;
    }

    async fn refresh_after_mutation(&mut self) {
        if let Err(err) = self.refresh_rooms().await {
            tracing::warn!(error = %err, "failed to reload rooms");
        }
    }
}

impl<V: View> Drop for Session<V> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use futures::stream;

    use super::*;
    use crate::Room;
    use crate::render::TranscriptView;

    #[derive(Default)]
    struct Scripted {
        histories: Mutex<VecDeque<Result<Vec<Message>>>>,
        streams: Mutex<VecDeque<Vec<Result<Delta>>>>,
        posts: Mutex<Vec<(RoomId, String)>>,
    }

    #[async_trait::async_trait]
    impl Backend for Scripted {
        async fn list_rooms(&self) -> Result<Vec<Room>> {
            Ok(vec![Room::new("r1", "first"), Room::new("r2", "second")])
        }

        async fn create_room(&self, title: &str) -> Result<Room> {
            Ok(Room::new("r3", title))
        }

        async fn rename_room(&self, _: &RoomId, _: &str) -> Result<()> {
            Err(Error::server(500, "nope"))
        }

        async fn delete_room(&self, _: &RoomId) -> Result<()> {
            Ok(())
        }

        async fn messages(&self, _: &RoomId) -> Result<Vec<Message>> {
            self.histories
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }

        async fn post_message(&self, id: &RoomId, prompt: &str) -> Result<()> {
            self.posts
                .lock()
                .unwrap()
                .push((id.clone(), prompt.to_string()));
            Ok(())
        }

        async fn open_stream(&self, _: &RoomId) -> Result<DeltaStream> {
            let items = self.streams.lock().unwrap().pop_front().unwrap_or_default();
            let stream: DeltaStream = Box::pin(stream::iter(items));
            Ok(stream)
        }
    }

    fn session(backend: Scripted) -> (Arc<Scripted>, Session<TranscriptView>) {
        let backend = Arc::new(backend);
        let session = Session::new(backend.clone(), TranscriptView::new());
        (backend, session)
    }

    #[tokio::test]
    async fn starts_idle() {
        let (_, mut session) = session(Scripted::default());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.view().send_enabled());
        assert!(!session.send("hi"));
        assert!(!session.step().await);
    }

    #[tokio::test]
    async fn text_deltas_accumulate() {
        let backend = Scripted::default();
        backend.streams.lock().unwrap().push_back(vec![
            Ok(Delta::Text("Hel".into())),
            Ok(Delta::Text("lo".into())),
        ]);
        let (backend, mut session) = session(backend);
        session.select_room(RoomId::new("r1"));
        session.settle().await;
        assert!(session.send("  hi  "));
        assert_eq!(session.state(), SessionState::Sending);
        session.settle().await;

        assert_eq!(session.state(), SessionState::RoomSelected);
        assert_eq!(session.view().texts(), vec!["hi", "Hello"]);
        assert_eq!(
            backend.posts.lock().unwrap().as_slice(),
            &[(RoomId::new("r1"), "hi".to_string())]
        );
        assert_eq!(session.messages().len(), 2);
        assert!(session.view().send_enabled());
        assert!(session.connection().is_none());
    }

    #[tokio::test]
    async fn second_send_while_busy_is_noop() {
        let (backend, mut session) = session(Scripted::default());
        session.select_room(RoomId::new("r1"));
        session.settle().await;
        assert!(session.send("one"));
        assert!(!session.send("two"));
        session.settle().await;
        assert_eq!(backend.posts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn send_is_held_until_history_arrives() {
        let (backend, mut session) = session(Scripted::default());
        session.select_room(RoomId::new("r1"));
        assert_eq!(session.state(), SessionState::RoomSelected);
        assert!(session.is_loading_history());
        assert!(!session.view().send_enabled());
        assert!(!session.send("early"));
        assert!(session.view().bubbles().is_empty());

        session.settle().await;
        assert!(!session.is_loading_history());
        assert!(session.view().send_enabled());
        assert!(session.send("late"));
        session.settle().await;
        assert_eq!(
            backend.posts.lock().unwrap().as_slice(),
            &[(RoomId::new("r1"), "late".to_string())]
        );
    }

    #[tokio::test]
    async fn stop_keeps_partial_text() {
        let backend = Scripted::default();
        backend
            .streams
            .lock()
            .unwrap()
            .push_back(vec![Ok(Delta::Text("part".into())), Ok(Delta::Text("ial".into()))]);
        let (_, mut session) = session(backend);
        session.select_room(RoomId::new("r1"));
        session.settle().await;
        session.send("go");
        while session.reply_text() != Some("part") {
            assert!(session.step().await);
        }
        assert!(session.stop());
        assert!(!session.stop());
        session.settle().await;
        assert_eq!(session.view().texts(), vec!["go", "part"]);
        assert_eq!(session.state(), SessionState::RoomSelected);
    }

    #[tokio::test]
    async fn history_failure_leaves_transcript_empty() {
        let backend = Scripted::default();
        backend
            .histories
            .lock()
            .unwrap()
            .push_back(Err(Error::server(500, "down")));
        let (_, mut session) = session(backend);
        session.select_room(RoomId::new("r1"));
        session.settle().await;
        assert!(session.view().bubbles().is_empty());
        assert!(!session.view().export_enabled());
        assert!(session.view().send_enabled());
        assert!(session.export(ExportFormat::Markdown).is_err());
    }

    #[tokio::test]
    async fn rename_failure_is_silent() {
        let (_, mut session) = session(Scripted::default());
        session.refresh_rooms().await.unwrap();
        assert!(!session.rename_room(&RoomId::new("r1"), "new").await);
        assert!(!session.rename_room(&RoomId::new("r1"), "   ").await);
        assert_eq!(session.rooms().title(&RoomId::new("r1")), Some("first"));
    }

    #[tokio::test]
    async fn refresh_dismisses_menu_for_missing_room() {
        let (_, mut session) = session(Scripted::default());
        session.menu_mut().open(RoomId::new("gone"));
        session.refresh_rooms().await.unwrap();
        assert!(!session.menu().is_open());
        session.menu_mut().open(RoomId::new("r2"));
        session.refresh_rooms().await.unwrap();
        assert!(session.menu().is_open());
    }

    #[tokio::test]
    async fn create_selects_new_room() {
        let (_, mut session) = session(Scripted::default());
        assert!(session.create_room("  ").await.unwrap_err().is_validation());
        let id = session.create_room("fresh").await.unwrap();
        assert_eq!(id, RoomId::new("r3"));
        assert_eq!(session.active_room(), Some(&id));
        assert_eq!(session.state(), SessionState::RoomSelected);
    }
}
