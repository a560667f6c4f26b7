use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a conversation room, as assigned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    /// Wrap a backend-assigned identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as it appears in request paths.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A named conversation thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Room {
    /// Backend-assigned identifier.
    #[serde(deserialize_with = "deserialize_room_id")]
    pub id: RoomId,
    /// Display title.
    pub title: String,
}

impl Room {
    /// Create a room value.
    pub fn new(id: impl Into<RoomId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
        }
    }
}

/// Request body for creating or renaming a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomTitle {
    /// The requested title.
    pub title: String,
}

// Backends built on integer primary keys send numeric ids.
fn deserialize_room_id<'de, D>(deserializer: D) -> Result<RoomId, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(i64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => RoomId(text),
        RawId::Number(number) => RoomId(number.to_string()),
    })
}
