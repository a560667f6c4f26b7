//! The live server-push channel for one in-flight assistant reply.

use std::fmt;
use std::pin::Pin;

use futures::{Stream, StreamExt};

use crate::observability::{STREAM_CLOSES, STREAM_ERRORS, STREAM_EVENTS};
use crate::{Delta, Result, RoomId};

/// A boxed stream of deltas, as produced by a backend.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<Delta>> + Send>>;

/// Identifier of one connection within a session.
///
/// Changes on every open so that events for a replaced connection can be
/// told apart from events for the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a typed connection identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One open delta stream scoped to a room.
///
/// Closing drops the underlying stream immediately; nothing is delivered
/// afterwards, whatever the network layer still has buffered.
pub struct Connection {
    id: ConnectionId,
    room: RoomId,
    stream: Option<DeltaStream>,
    deltas: u64,
}

impl Connection {
    /// Wrap an opened stream.
    pub fn new(id: ConnectionId, room: RoomId, stream: DeltaStream) -> Self {
        Self {
            id,
            room,
            stream: Some(stream),
            deltas: 0,
        }
    }

    /// This connection's identifier.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The room the reply belongs to.
    pub fn room(&self) -> &RoomId {
        &self.room
    }

    /// Returns true until [`close`](Self::close) is called.
    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Number of deltas delivered so far.
    pub fn deltas_received(&self) -> u64 {
        self.deltas
    }

    /// Wait for the next delta.
    ///
    /// Returns `None` once the server closed the stream or after `close`.
    /// Cancel-safe: dropping the future loses no delta.
    pub async fn next(&mut self) -> Option<Result<Delta>> {
        let stream = self.stream.as_mut()?;
        let item = stream.next().await;
        match &item {
            Some(Ok(_)) => {
                self.deltas += 1;
                STREAM_EVENTS.click();
            }
            Some(Err(_)) => STREAM_ERRORS.click(),
            None => {}
        }
        item
    }

    /// Close the connection.
    ///
    /// Idempotent.  Returns true if this call released the stream and false
    /// if the connection was already closed.
    pub fn close(&mut self) -> bool {
        match self.stream.take() {
            Some(stream) => {
                drop(stream);
                STREAM_CLOSES.click();
                tracing::debug!(connection = %self.id, room = %self.room, "connection closed");
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("room", &self.room)
            .field("open", &self.is_open())
            .field("deltas", &self.deltas)
            .finish()
    }
}
