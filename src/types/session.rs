use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{Message, Model};

/// Opaque identifier of a session, derived from its creation time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(u64);

impl SessionId {
    /// Wrap a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A chat session: the selected model and the ordered conversation.
///
/// Messages are only replaced or appended at explicit indices, never reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier.
    #[serde(rename = "sessionId")]
    pub id: SessionId,

    /// The model this session talks to.
    #[serde(rename = "currentModel", default)]
    pub model: Option<Model>,

    /// The conversation, oldest first.
    pub messages: Vec<Message>,
}

impl Session {
    /// Create a new session with the given messages.
    pub fn new(id: SessionId, model: Option<Model>, messages: Vec<Message>) -> Self {
        Self {
            id,
            model,
            messages,
        }
    }

    /// Returns the message currently being streamed into, if any.
    pub fn analyzing(&self) -> Option<(usize, &Message)> {
        self.messages
            .iter()
            .enumerate()
            .find(|(_, message)| message.is_analyzing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_serialization() {
        let session = Session::new(
            SessionId::new(1700000000000),
            None,
            vec![Message::system("ctx")],
        );
        assert_eq!(
            serde_json::to_value(&session).unwrap(),
            json!({
                "sessionId": 1700000000000u64,
                "currentModel": null,
                "messages": [{"role": "system", "content": "ctx", "isAnalyzing": false}]
            })
        );
    }

    #[test]
    fn analyzing_finds_in_progress_message() {
        let mut session = Session::new(SessionId::new(1), None, vec![Message::user("q")]);
        assert!(session.analyzing().is_none());
        session.messages.push(Message::placeholder());
        assert_eq!(session.analyzing().map(|(i, _)| i), Some(1));
    }
}
