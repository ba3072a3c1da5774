//! Slash command parsing for the chat application.
//!
//! Commands start with `/` and manage sessions locally; they are never sent to the model.

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Start a new session and make it current.
    New,

    /// List the stored sessions.
    Sessions,

    /// Make the session at this position current.
    Switch(usize),

    /// Delete the session at this position.
    Delete(usize),

    /// Copy the current session back into the session list.
    Save,

    /// List the configured models.
    Models,

    /// Switch the current session to the model at this position.
    Model(usize),

    /// Turn file discovery on or off.
    Discovery(bool),

    /// Stop the reply that is currently streaming.
    Stop,

    /// Display help information.
    Help,

    /// Exit the chat application.
    Quit,

    /// Report a parsing error back to the caller.
    Invalid(String),
}

/// Parses user input for slash commands.
///
/// Returns `Some(ChatCommand)` if the input is a command, or `None` if it should be treated as
/// a regular message.
///
/// # Examples
///
/// ```
/// # use filechat::chat::{ChatCommand, parse_command};
/// assert_eq!(parse_command("/switch 2"), Some(ChatCommand::Switch(2)));
/// assert!(parse_command("Where is main defined?").is_none());
/// ```
pub fn parse_command(input: &str) -> Option<ChatCommand> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let mut parts = rest.splitn(2, ' ');
    let command = parts.next()?.to_lowercase();
    let argument = parts.next().map(|s| s.trim()).filter(|s| !s.is_empty());

    let result = match command.as_str() {
        "new" => ChatCommand::New,
        "sessions" | "ls" => ChatCommand::Sessions,
        "switch" => parse_index_command(argument, ChatCommand::Switch, "/switch"),
        "delete" | "rm" => parse_index_command(argument, ChatCommand::Delete, "/delete"),
        "save" => ChatCommand::Save,
        "models" => ChatCommand::Models,
        "model" => parse_index_command(argument, ChatCommand::Model, "/model"),
        "discovery" => match argument.and_then(parse_on_off) {
            Some(value) => ChatCommand::Discovery(value),
            None => ChatCommand::Invalid("/discovery expects 'on' or 'off'".to_string()),
        },
        "stop" => ChatCommand::Stop,
        "help" | "?" => ChatCommand::Help,
        "quit" | "exit" | "q" => ChatCommand::Quit,
        _ => ChatCommand::Invalid(format!("Unknown command: /{}", command)),
    };

    Some(result)
}

fn parse_index_command<F>(argument: Option<&str>, constructor: F, name: &str) -> ChatCommand
where
    F: Fn(usize) -> ChatCommand,
{
    match argument {
        Some(arg) => match arg.parse::<usize>() {
            Ok(value) => constructor(value),
            Err(_) => ChatCommand::Invalid(format!("{} expects a session number", name)),
        },
        None => ChatCommand::Invalid(format!("{} requires a value", name)),
    }
}

fn parse_on_off(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" => Some(true),
        "off" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Returns help text describing available commands.
pub fn help_text() -> &'static str {
    r#"Available commands:
  /new                   Start a new session
  /sessions              List sessions (current one marked with *)
  /switch <n>            Make session n current
  /delete <n>            Delete session n
  /save                  Save the current session into the list
  /models                List configured models
  /model <n>             Use model n for the current session
  /discovery on|off      Answer from discovered files or chat directly
  /stop                  Stop the reply being streamed (Ctrl+C works too)
  /help                  Show this help message
  /quit                  Exit the chat"#
}
