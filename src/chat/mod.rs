//! Support for the interactive `filechat` REPL.
//!
//! - [`config`]: CLI argument parsing, run configuration and the model/project catalog
//! - [`commands`]: slash command parsing

mod commands;
mod config;

pub use crate::render::PlainTextObserver;
pub use commands::{ChatCommand, help_text, parse_command};
pub use config::{API_KEY_ENV, Catalog, ChatArgs, ChatConfig};
