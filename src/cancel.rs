//! Stopping in-flight streams.

use crate::observability::STREAM_CANCELLATIONS;
use crate::store::{ChatStore, StreamTicket};

/// Result of a stop request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// An active stream was cancelled.
    Stopped,
    /// Nothing was streaming.
    Idle,
}

impl StopOutcome {
    /// A message suitable for showing to the user.
    pub fn describe(self) -> &'static str {
        match self {
            StopOutcome::Stopped => "Request stopped.",
            StopOutcome::Idle => "No streaming request in progress.",
        }
    }
}

/// Tracks the current session's in-flight stream and cancels it on request.
///
/// Cancellation is cooperative: the stream's read loop notices the cancelled token at its next
/// suspension point.  The streaming flag itself is cleared synchronously, and from then on nothing
/// the stream delivers is written.
#[derive(Clone)]
pub struct CancellationController {
    store: ChatStore,
}

impl CancellationController {
    /// Creates a controller over `store`.
    pub fn new(store: ChatStore) -> Self {
        Self { store }
    }

    /// True while the current session has an active stream.
    pub fn is_streaming(&self) -> bool {
        let state = self.store.lock();
        state
            .sessions
            .current()
            .is_some_and(|session| state.is_streaming(session.id))
    }

    /// Stop the current session's stream, if there is one.
    pub fn stop_chat(&self) -> StopOutcome {
        let handle = {
            let mut state = self.store.lock();
            let Some(id) = state.sessions.current().map(|session| session.id) else {
                return StopOutcome::Idle;
            };
            state.cancel(id)
        };
        match handle {
            Some(handle) => {
                STREAM_CANCELLATIONS.click();
                tracing::info!(generation = handle.generation(), "stopped streaming request");
                handle.observer().message_updated(None);
                StopOutcome::Stopped
            }
            None => StopOutcome::Idle,
        }
    }

    /// Cancel a specific stream through the same path as [`CancellationController::stop_chat`].
    ///
    /// Does nothing if that stream already ended or was superseded.
    pub fn cancel_stream(&self, ticket: &StreamTicket) -> StopOutcome {
        let handle = self.store.lock().cancel_ticket(ticket);
        match handle {
            Some(handle) => {
                STREAM_CANCELLATIONS.click();
                handle.observer().message_updated(None);
                StopOutcome::Stopped
            }
            None => StopOutcome::Idle,
        }
    }
}
