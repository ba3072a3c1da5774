use serde::{Deserialize, Serialize};

/// Role of a chat message.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System role.
    System,

    /// User role.
    User,

    /// Assistant role.
    Assistant,
}

/// A single message in a chat session.
///
/// The content of an assistant message grows while its reply is streamed in; `is_analyzing` is
/// true exactly for that window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    pub role: Role,

    /// The text of the message.
    pub content: String,

    /// True while the content is being filled incrementally.
    #[serde(rename = "isAnalyzing", default)]
    pub is_analyzing: bool,
}

impl Message {
    /// Create a new `Message` with the given role and content.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            is_analyzing: false,
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// The empty assistant message a stream fills in.
    pub fn placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            is_analyzing: true,
        }
    }
}

impl From<&str> for Message {
    fn from(content: &str) -> Self {
        Self::user(content)
    }
}

impl From<String> for Message {
    fn from(content: String) -> Self {
        Self::user(content)
    }
}

/// Writes `message` at `index`, replacing the existing entry or appending when `index` is one
/// past the end.
///
/// Returns false when `index` would leave a gap.
pub fn place(messages: &mut Vec<Message>, index: usize, message: Message) -> bool {
    match index.cmp(&messages.len()) {
        std::cmp::Ordering::Less => {
            messages[index] = message;
            true
        }
        std::cmp::Ordering::Equal => {
            messages.push(message);
            true
        }
        std::cmp::Ordering::Greater => false,
    }
}
