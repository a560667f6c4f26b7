//! End-to-end tests driving a `Session` against a scripted backend.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use futures::channel::mpsc::{UnboundedSender, unbounded};
use serde_json::json;
use tokio::sync::oneshot;

use roomchat::render::Body;
use roomchat::{
    Backend, Delta, DeltaStream, Error, ExportFormat, Message, Result, Role, Room, RoomId,
    STREAM_FAILURE_MESSAGE, Session, SessionState, TranscriptView,
};

type StreamSender = UnboundedSender<Result<Delta>>;

#[derive(Default)]
struct ScriptedBackend {
    rooms: Mutex<Vec<Room>>,
    histories: Mutex<HashMap<RoomId, Vec<Message>>>,
    history_gates: Mutex<HashMap<RoomId, oneshot::Receiver<()>>>,
    streams: Mutex<VecDeque<Result<DeltaStream>>>,
    stream_gate: Mutex<Option<oneshot::Receiver<()>>>,
    posts: Mutex<Vec<(RoomId, String)>>,
    opens: AtomicUsize,
    fail_persist: AtomicBool,
}

impl ScriptedBackend {
    fn with_rooms(rooms: &[(&str, &str)]) -> Self {
        let backend = Self::default();
        *backend.rooms.lock().unwrap() = rooms
            .iter()
            .map(|(id, title)| Room::new(*id, *title))
            .collect();
        backend
    }

    fn set_history(&self, room: &str, messages: Vec<Message>) {
        self.histories
            .lock()
            .unwrap()
            .insert(RoomId::new(room), messages);
    }

    fn gate_history(&self, room: &str) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.history_gates
            .lock()
            .unwrap()
            .insert(RoomId::new(room), rx);
        tx
    }

    fn gate_stream(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.stream_gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Queue a live stream; the returned sender feeds it.
    fn push_stream(&self) -> StreamSender {
        let (tx, rx) = unbounded();
        let stream: DeltaStream = Box::pin(rx);
        self.streams.lock().unwrap().push_back(Ok(stream));
        tx
    }

    fn push_open_failure(&self) {
        self.streams
            .lock()
            .unwrap()
            .push_back(Err(Error::connection("connection refused", None)));
    }

    fn posts(&self) -> Vec<(RoomId, String)> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Backend for ScriptedBackend {
    async fn list_rooms(&self) -> Result<Vec<Room>> {
        Ok(self.rooms.lock().unwrap().clone())
    }

    async fn create_room(&self, title: &str) -> Result<Room> {
        let mut rooms = self.rooms.lock().unwrap();
        let room = Room::new(format!("{}", rooms.len() + 1), title);
        rooms.push(room.clone());
        Ok(room)
    }

    async fn rename_room(&self, id: &RoomId, title: &str) -> Result<()> {
        let mut rooms = self.rooms.lock().unwrap();
        match rooms.iter_mut().find(|room| &room.id == id) {
            Some(room) => {
                room.title = title.to_string();
                Ok(())
            }
            None => Err(Error::not_found("Room not found", Some(id.to_string()))),
        }
    }

    async fn delete_room(&self, id: &RoomId) -> Result<()> {
        self.rooms.lock().unwrap().retain(|room| &room.id != id);
        Ok(())
    }

    async fn messages(&self, id: &RoomId) -> Result<Vec<Message>> {
        let gate = self.history_gates.lock().unwrap().remove(id);
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(self
            .histories
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn post_message(&self, id: &RoomId, prompt: &str) -> Result<()> {
        self.posts
            .lock()
            .unwrap()
            .push((id.clone(), prompt.to_string()));
        if self.fail_persist.load(Ordering::SeqCst) {
            return Err(Error::server(500, "database is locked"));
        }
        Ok(())
    }

    async fn open_stream(&self, _: &RoomId) -> Result<DeltaStream> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let stream = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::connection("no stream scripted", None)));
        let gate = self.stream_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        stream
    }
}

fn new_session(backend: ScriptedBackend) -> (Arc<ScriptedBackend>, Session<TranscriptView>) {
    let backend = Arc::new(backend);
    let session = Session::new(backend.clone(), TranscriptView::new());
    (backend, session)
}

/// Step the session until `done` holds.
async fn step_until(
    session: &mut Session<TranscriptView>,
    done: impl Fn(&Session<TranscriptView>) -> bool,
) {
    for _ in 0..64 {
        if done(session) {
            return;
        }
        let stepped = tokio::time::timeout(Duration::from_secs(5), session.step())
            .await
            .expect("session stalled");
        assert!(stepped, "session went idle before the condition held");
    }
    panic!("condition never held");
}

async fn open_room(session: &mut Session<TranscriptView>, room: &str) {
    session.select_room(RoomId::new(room));
    session.settle().await;
}

fn has_connection(session: &Session<TranscriptView>) -> bool {
    session.connection().is_some()
}

#[tokio::test]
async fn history_renders_with_persisted_timestamps() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "Greetings")]);
    let history: Vec<Message> = serde_json::from_value(json!([
        {"role": "user", "content_ja": "hi", "created_at": "2024-01-01 09:05:00"},
        {"role": "assistant", "content_ja": "hello `x`", "created_at": "2024-01-01 09:06:00"},
    ]))
    .unwrap();
    backend.set_history("r1", history);
    let (_, mut session) = new_session(backend);

    session.refresh_rooms().await.unwrap();
    open_room(&mut session, "r1").await;

    let bubbles = session.view().bubbles();
    assert_eq!(bubbles.len(), 2);
    assert_eq!(bubbles[0].role, Role::User);
    assert_eq!(bubbles[0].body, Body::Text("hi".to_string()));
    assert_eq!(bubbles[0].timestamp, "09:05");
    assert_eq!(bubbles[1].role, Role::Assistant);
    assert_eq!(bubbles[1].body.html(), Some("hello <code>x</code>"));
    assert_eq!(bubbles[1].timestamp, "09:06");
    assert_eq!(session.view().highlighted(), Some(&RoomId::new("r1")));
    assert!(session.view().export_enabled());
    assert!(session.view().send_enabled());
    assert_eq!(session.state(), SessionState::RoomSelected);
}

#[tokio::test]
async fn send_streams_reply_into_placeholder() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "Math")]);
    let tx = backend.push_stream();
    let (backend, mut session) = new_session(backend);
    open_room(&mut session, "r1").await;

    assert!(session.send("2+2?"));
    assert!(!session.view().send_enabled());
    assert_eq!(session.view().prompt_clears(), 1);
    assert_eq!(session.view().texts(), vec!["2+2?"]);

    step_until(&mut session, has_connection).await;
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(session.view().texts(), vec!["2+2?", ""]);

    tx.unbounded_send(Ok(Delta::Text("The answer".into()))).unwrap();
    tx.unbounded_send(Ok(Delta::Text(" is 4.".into()))).unwrap();
    step_until(&mut session, |s| s.reply_text() == Some("The answer is 4.")).await;
    assert_eq!(session.view().texts(), vec!["2+2?", "The answer is 4."]);

    drop(tx);
    session.settle().await;
    assert_eq!(session.state(), SessionState::RoomSelected);
    assert!(session.view().send_enabled());
    assert!(session.connection().is_none());
    assert_eq!(backend.posts(), vec![(RoomId::new("r1"), "2+2?".to_string())]);

    let messages = session.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1].role, Role::Assistant);
    assert_eq!(messages[1].content, "The answer is 4.");
}

#[tokio::test]
async fn reentrant_send_is_a_noop() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "Busy")]);
    let tx = backend.push_stream();
    let (backend, mut session) = new_session(backend);
    open_room(&mut session, "r1").await;

    assert!(session.send("first"));
    assert!(!session.send("second"));
    step_until(&mut session, has_connection).await;
    assert!(!session.send("third"));

    drop(tx);
    session.settle().await;
    assert_eq!(backend.posts().len(), 1);
    assert_eq!(backend.opens.load(Ordering::SeqCst), 1);
    assert_eq!(session.view().texts(), vec!["first", ""]);
}

#[tokio::test]
async fn empty_prompt_or_no_room_is_rejected() {
    let (backend, mut session) = new_session(ScriptedBackend::with_rooms(&[("r1", "x")]));
    assert!(!session.send("hello"));
    open_room(&mut session, "r1").await;
    assert!(!session.send("   \n"));
    assert!(backend.posts().is_empty());
    assert!(session.view().bubbles().is_empty());
}

#[tokio::test]
async fn error_delta_replaces_partial_text() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "Errors")]);
    let tx = backend.push_stream();
    let (_, mut session) = new_session(backend);
    open_room(&mut session, "r1").await;
    session.send("go");
    step_until(&mut session, has_connection).await;

    tx.unbounded_send(Ok(Delta::Text("partial <b>".into()))).unwrap();
    tx.unbounded_send(Ok(Delta::Error("quota exceeded".into())))
        .unwrap();
    tx.unbounded_send(Ok(Delta::Text("never shown".into())))
        .unwrap();
    step_until(&mut session, |s| s.state() == SessionState::RoomSelected).await;

    let reply = &session.view().bubbles()[1];
    assert_eq!(reply.body, Body::Text("quota exceeded".to_string()));
    assert!(session.connection().is_none());
    assert!(tx.is_closed());
    assert!(session.view().send_enabled());
    assert!(!session.is_busy());
}

#[tokio::test]
async fn transport_failure_before_text_shows_fallback() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "Flaky")]);
    let tx = backend.push_stream();
    let (_, mut session) = new_session(backend);
    open_room(&mut session, "r1").await;
    session.send("go");
    step_until(&mut session, has_connection).await;

    tx.unbounded_send(Err(Error::streaming("connection reset", None)))
        .unwrap();
    session.settle().await;

    let reply = &session.view().bubbles()[1];
    assert_eq!(reply.body, Body::Text(STREAM_FAILURE_MESSAGE.to_string()));
    assert_eq!(session.state(), SessionState::RoomSelected);
}

#[tokio::test]
async fn transport_failure_after_text_keeps_it() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "Flaky")]);
    let tx = backend.push_stream();
    let (_, mut session) = new_session(backend);
    open_room(&mut session, "r1").await;
    session.send("go");
    step_until(&mut session, has_connection).await;

    tx.unbounded_send(Ok(Delta::Text("half an ans".into())))
        .unwrap();
    tx.unbounded_send(Err(Error::streaming("connection reset", None)))
        .unwrap();
    session.settle().await;

    assert_eq!(session.view().texts(), vec!["go", "half an ans"]);
    assert!(session.view().send_enabled());
}

#[tokio::test]
async fn open_failure_shows_fallback() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "Down")]);
    backend.push_open_failure();
    let (_, mut session) = new_session(backend);
    open_room(&mut session, "r1").await;
    session.send("anyone?");
    session.settle().await;

    assert_eq!(session.view().texts(), vec!["anyone?", STREAM_FAILURE_MESSAGE]);
    assert_eq!(session.state(), SessionState::RoomSelected);
}

#[tokio::test]
async fn persist_failure_still_streams() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "Db")]);
    backend.fail_persist.store(true, Ordering::SeqCst);
    let tx = backend.push_stream();
    let (_, mut session) = new_session(backend);
    open_room(&mut session, "r1").await;
    session.send("hello");
    step_until(&mut session, has_connection).await;
    tx.unbounded_send(Ok(Delta::Text("hi".into()))).unwrap();
    drop(tx);
    session.settle().await;
    assert_eq!(session.view().texts(), vec!["hello", "hi"]);
}

#[tokio::test]
async fn switching_rooms_closes_stream_first() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "One"), ("r2", "Two")]);
    backend.set_history("r2", vec![Message::new(Role::User, "from r2")]);
    let tx = backend.push_stream();
    let (_, mut session) = new_session(backend);
    open_room(&mut session, "r1").await;
    session.send("long question");
    step_until(&mut session, has_connection).await;
    tx.unbounded_send(Ok(Delta::Text("partial".into()))).unwrap();
    step_until(&mut session, |s| s.reply_text() == Some("partial")).await;

    session.select_room(RoomId::new("r2"));
    assert!(session.connection().is_none());
    assert!(tx.is_closed());
    assert!(tx.unbounded_send(Ok(Delta::Text("late".into()))).is_err());

    session.settle().await;
    assert_eq!(session.active_room(), Some(&RoomId::new("r2")));
    assert_eq!(session.view().texts(), vec!["from r2"]);
    assert_eq!(session.state(), SessionState::RoomSelected);
}

#[tokio::test]
async fn stale_history_is_ignored() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "Slow"), ("r2", "Fast")]);
    backend.set_history("r1", vec![Message::new(Role::User, "from r1")]);
    backend.set_history("r2", vec![Message::new(Role::User, "from r2")]);
    let gate = backend.gate_history("r1");
    let (_, mut session) = new_session(backend);

    session.select_room(RoomId::new("r1"));
    session.select_room(RoomId::new("r2"));
    let _ = gate.send(());
    session.settle().await;

    assert_eq!(session.view().texts(), vec!["from r2"]);
    assert_eq!(session.messages().len(), 1);
    assert_eq!(session.view().highlighted(), Some(&RoomId::new("r2")));
}

#[tokio::test]
async fn send_waits_for_history() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "Math")]);
    backend.set_history("r1", vec![Message::new(Role::User, "old")]);
    let gate = backend.gate_history("r1");
    let tx = backend.push_stream();
    let (backend, mut session) = new_session(backend);

    session.select_room(RoomId::new("r1"));
    assert!(!session.view().send_enabled());
    assert!(!session.send("2+2?"));
    assert!(session.view().bubbles().is_empty());
    assert!(backend.posts().is_empty());

    let _ = gate.send(());
    step_until(&mut session, |s| !s.is_loading_history()).await;
    assert_eq!(session.view().texts(), vec!["old"]);
    assert!(session.view().send_enabled());

    assert!(session.send("2+2?"));
    step_until(&mut session, has_connection).await;
    tx.unbounded_send(Ok(Delta::Text("4".into()))).unwrap();
    drop(tx);
    session.settle().await;

    assert_eq!(session.view().texts(), vec!["old", "2+2?", "4"]);
    let contents: Vec<&str> = session
        .messages()
        .iter()
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(contents, vec!["old", "2+2?", "4"]);
    assert_eq!(backend.posts(), vec![(RoomId::new("r1"), "2+2?".to_string())]);
}

#[tokio::test]
async fn stream_opened_for_previous_room_is_dropped() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "One"), ("r2", "Two")]);
    let tx = backend.push_stream();
    let gate = backend.gate_stream();
    let (backend, mut session) = new_session(backend);
    open_room(&mut session, "r1").await;
    session.send("hello");
    step_until(&mut session, |s| s.reply_text().is_some()).await;
    while backend.opens.load(Ordering::SeqCst) == 0 {
        tokio::task::yield_now().await;
    }

    session.select_room(RoomId::new("r2"));
    let _ = gate.send(());
    session.settle().await;

    assert!(session.connection().is_none());
    assert!(tx.is_closed());
    assert!(session.view().bubbles().is_empty());
    assert_eq!(session.state(), SessionState::RoomSelected);
}

#[tokio::test]
async fn stop_keeps_partial_reply() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "Stop")]);
    let tx = backend.push_stream();
    let (_, mut session) = new_session(backend);
    open_room(&mut session, "r1").await;
    session.send("tell me a story");
    step_until(&mut session, has_connection).await;
    tx.unbounded_send(Ok(Delta::Text("Once upon".into()))).unwrap();
    step_until(&mut session, |s| s.reply_text() == Some("Once upon")).await;

    assert!(session.stop());
    assert!(!session.stop());
    assert!(tx.is_closed());
    assert_eq!(session.view().texts(), vec!["tell me a story", "Once upon"]);
    assert_eq!(session.state(), SessionState::RoomSelected);
    assert!(session.send("another"));
}

#[tokio::test]
async fn room_list_is_newest_first() {
    let backend = ScriptedBackend::with_rooms(&[("1", "old"), ("2", "new")]);
    let (_, mut session) = new_session(backend);
    session.refresh_rooms().await.unwrap();
    let titles: Vec<&str> = session
        .view()
        .rooms()
        .iter()
        .map(|room| room.title.as_str())
        .collect();
    assert_eq!(titles, vec!["new", "old"]);
}

#[tokio::test]
async fn create_rename_delete() {
    let backend = ScriptedBackend::with_rooms(&[("1", "first")]);
    let (_, mut session) = new_session(backend);

    let id = session.create_room("second").await.unwrap();
    assert_eq!(id, RoomId::new("2"));
    assert_eq!(session.active_room(), Some(&id));
    assert_eq!(session.rooms().first().unwrap().title, "second");
    session.settle().await;

    session.menu_mut().open(id.clone());
    let Some(roomchat::menu::MenuAction::Rename(target)) = session.menu_mut().rename() else {
        panic!("menu should target the room");
    };
    assert!(session.rename_room(&target, "renamed").await);
    assert_eq!(session.rooms().title(&id), Some("renamed"));
    assert_eq!(session.view().highlighted(), Some(&id));
    assert!(!session.rename_room(&RoomId::new("404"), "nope").await);

    session.delete_room(&id).await.unwrap();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.active_room().is_none());
    assert!(session.view().bubbles().is_empty());
    assert!(!session.view().send_enabled());
    assert_eq!(session.rooms().len(), 1);
}

#[tokio::test]
async fn export_active_room() {
    let backend = ScriptedBackend::with_rooms(&[("r1", "Notes")]);
    backend.set_history(
        "r1",
        vec![
            Message::new(Role::User, "a < b"),
            Message::new(Role::Assistant, "yes"),
        ],
    );
    let (_, mut session) = new_session(backend);
    assert!(session.export(ExportFormat::Html).is_err());
    session.refresh_rooms().await.unwrap();
    open_room(&mut session, "r1").await;

    let html = session.export(ExportFormat::Html).unwrap();
    assert!(html.contains("<title>Notes</title>"));
    assert!(html.contains("a &lt; b"));
    let md = session.export(ExportFormat::Markdown).unwrap();
    assert!(md.starts_with("# Notes"));
}
