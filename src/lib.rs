// Public modules
pub mod chat;
pub mod client;
pub mod error;
pub mod export;
pub mod format;
pub mod menu;
pub mod render;
pub mod session;
pub mod sse;
pub mod store;
pub mod stream;
pub mod types;

mod observability;

// Re-exports
pub use client::{Backend, RoomsClient};
pub use error::{Error, Result};
pub use export::ExportFormat;
pub use observability::register_biometrics;
pub use render::{MessageRenderer, TranscriptView, View};
pub use session::{RoomTag, STREAM_FAILURE_MESSAGE, Session, SessionEvent, SessionState};
pub use store::RoomStore;
pub use stream::{Connection, ConnectionId, DeltaStream};
pub use types::*;
