//! Progress notification for streamed messages.
//!
//! Observers are registered per call rather than globally: whoever starts a stream hands in the
//! observer that should hear about it.

use std::io::{self, Write};
use std::sync::{Mutex, PoisonError};

use crate::store::ChatStore;

/// ANSI escape code for dim text (used for status notes).
const ANSI_DIM: &str = "\x1b[2m";

/// ANSI escape code to reset all styling.
const ANSI_RESET: &str = "\x1b[0m";

/// Receives a notification whenever a streamed message changes.
pub trait ProgressObserver: Send + Sync {
    /// `Some(index)` names the message of the current session that changed; `None` means every
    /// in-flight stream was stopped.
    fn message_updated(&self, index: Option<usize>);
}

impl<F> ProgressObserver for F
where
    F: Fn(Option<usize>) + Send + Sync,
{
    fn message_updated(&self, index: Option<usize>) {
        self(index)
    }
}

/// An observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ProgressObserver for NullObserver {
    fn message_updated(&self, _: Option<usize>) {}
}

#[derive(Debug, Default)]
struct Printed {
    index: Option<usize>,
    len: usize,
}

/// Prints streamed text to stdout as it arrives.
///
/// Only the part of the updated message that has not been printed yet is written, so the
/// terminal shows the reply growing in place.
pub struct PlainTextObserver {
    store: ChatStore,
    use_color: bool,
    printed: Mutex<Printed>,
}

impl PlainTextObserver {
    /// Creates an observer that reads message content from `store`.
    pub fn new(store: ChatStore, use_color: bool) -> Self {
        Self {
            store,
            use_color,
            printed: Mutex::new(Printed::default()),
        }
    }

    /// Forget what has been printed so the next reply starts fresh.
    pub fn reset(&self) {
        *self.printed.lock().unwrap_or_else(PoisonError::into_inner) = Printed::default();
    }

    fn note(&self, text: &str) {
        if self.use_color {
            println!("\n{ANSI_DIM}{text}{ANSI_RESET}");
        } else {
            println!("\n{text}");
        }
    }
}

impl ProgressObserver for PlainTextObserver {
    fn message_updated(&self, index: Option<usize>) {
        let Some(index) = index else {
            self.note("[request stopped]");
            self.reset();
            return;
        };
        let content = {
            let state = self.store.lock();
            match state.sessions.current().and_then(|s| s.messages.get(index)) {
                Some(message) => message.content.clone(),
                None => return,
            }
        };
        let mut printed = self.printed.lock().unwrap_or_else(PoisonError::into_inner);
        if printed.index != Some(index) || content.len() < printed.len {
            if printed.index.is_some() {
                println!();
            }
            *printed = Printed {
                index: Some(index),
                len: 0,
            };
        }
        if let Some(fresh) = content.get(printed.len..) {
            print!("{fresh}");
            let _ = io::stdout().flush();
        }
        printed.len = content.len();
    }
}
