// Public modules
pub mod completion;
pub mod message;
pub mod model;
pub mod session;

// Re-exports
pub use completion::{
    ChatCompletionChunk, ChatCompletionRequest, ChunkChoice, ChunkDelta, RequestMessage,
};
pub use message::{Message, Role, place};
pub use model::Model;
pub use session::{Session, SessionId};
