use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::types::{Message, Model, Role};

/// A message as it goes over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMessage {
    /// The role of the message author.
    pub role: Role,
    /// The text of the message.
    pub content: String,
}

impl From<&Message> for RequestMessage {
    fn from(message: &Message) -> Self {
        Self {
            role: message.role,
            content: message.content.clone(),
        }
    }
}

/// Body of a streaming chat-completions request.
///
/// The model's options are flattened into the top level next to `stream` and `messages`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    /// Provider options copied from the model.
    #[serde(flatten)]
    pub options: Map<String, Value>,

    /// Always true: responses are consumed incrementally.
    pub stream: bool,

    /// The conversation to complete.
    pub messages: Vec<RequestMessage>,
}

impl ChatCompletionRequest {
    /// Build a streaming request for `model` over `messages`.
    pub fn streaming(model: &Model, messages: &[Message]) -> Self {
        let mut options = model.options.clone();
        options.remove("stream");
        options.remove("messages");
        Self {
            options,
            stream: true,
            messages: messages.iter().map(RequestMessage::from).collect(),
        }
    }
}

/// One streamed chunk of a chat completion.
///
/// Only the fields the stream consumer reads are modelled; everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChatCompletionChunk {
    /// Candidate completions; only the first one is consumed.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// A single choice within a chunk.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkChoice {
    /// The incremental update for this choice.
    #[serde(default)]
    pub delta: Option<ChunkDelta>,
}

/// Incremental text of a choice.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChunkDelta {
    /// Text appended by this chunk.
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionChunk {
    /// Text at `choices[0].delta.content`, if present.
    pub fn delta_text(&self) -> Option<&str> {
        self.choices
            .first()?
            .delta
            .as_ref()?
            .content
            .as_deref()
    }
}
