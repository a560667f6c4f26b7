//! Client-side reflection of the backend's room list.

use crate::{Room, RoomId};

/// The room list in display order, newest first.
#[derive(Debug, Clone, Default)]
pub struct RoomStore {
    rooms: Vec<Room>,
}

impl RoomStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list with a fresh backend listing.
    ///
    /// The backend lists rooms in creation order; the store reverses it so the
    /// most recently created room comes first.
    pub fn replace_from_backend(&mut self, mut rooms: Vec<Room>) {
        rooms.reverse();
        self.rooms = rooms;
    }

    /// Rooms in display order.
    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    /// Look up a room by id.
    pub fn get(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.iter().find(|room| &room.id == id)
    }

    /// Returns true if the room is in the current listing.
    pub fn contains(&self, id: &RoomId) -> bool {
        self.get(id).is_some()
    }

    /// The display title of a room.
    pub fn title(&self, id: &RoomId) -> Option<&str> {
        self.get(id).map(|room| room.title.as_str())
    }

    /// The most recently created room.
    pub fn first(&self) -> Option<&Room> {
        self.rooms.first()
    }

    /// The room at a 1-based display position.
    pub fn nth(&self, position: usize) -> Option<&Room> {
        position.checked_sub(1).and_then(|idx| self.rooms.get(idx))
    }

    /// Number of listed rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Returns true when no rooms are listed.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}
