// Public modules
pub mod augment;
pub mod cancel;
pub mod chat;
pub mod client;
pub mod discovery;
pub mod error;
pub mod orchestrator;
pub mod render;
pub mod session;
pub mod sse;
pub mod store;
pub mod stream;
pub mod types;

mod observability;

// Re-exports
pub use augment::{SearchResult, SemanticSearch, SemanticSearchAugmenter};
pub use cancel::{CancellationController, StopOutcome};
pub use client::{CompletionTransport, OpenAiCompatible};
pub use discovery::{DiscoveryReply, FileAccess, FileContent, LocalFiles, fetch_context};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use orchestrator::{ChatOrchestrator, ChatTurn, DiscoveryOutcome};
pub use render::{NullObserver, PlainTextObserver, ProgressObserver};
pub use session::{ModelCatalog, ProjectCatalog, SessionManager};
pub use store::{ChatState, ChatStore, SessionSlot, StreamHandle, StreamTicket};
pub use stream::{ByteStream, MessageTarget, StreamConsumer, StreamEnd};
pub use types::*;
