// Public modules
pub mod delta;
pub mod message;
pub mod room;
pub mod timestamp;

// Re-exports
pub use delta::{Delta, DeltaPayload};
pub use message::{Message, PromptRequest, Role};
pub use room::{Room, RoomId, RoomTitle};
pub use timestamp::Timestamp;
