//! Shared session and stream state.
//!
//! Sessions and the table of in-flight streams live behind one lock so that checking whether a
//! stream is still active and appending its text happen atomically.  A stream is identified by a
//! generation number; once its generation is no longer the active one for its session, nothing it
//! delivers is written.  Starting a stream cancels the one it replaces.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::render::ProgressObserver;
use crate::session::SessionManager;
use crate::stream::MessageTarget;
use crate::types::{Message, SessionId, place};

/// Identifies one stream started for one session.
#[derive(Debug, Clone)]
pub struct StreamTicket {
    /// The session the stream writes into.
    pub session: SessionId,
    /// Monotonic generation of this stream.
    pub generation: u64,
    /// Cancelled when the stream is stopped.
    pub token: CancellationToken,
}

/// The transient handle of an in-flight stream.
pub struct StreamHandle {
    generation: u64,
    slot: usize,
    token: CancellationToken,
    observer: Arc<dyn ProgressObserver>,
}

impl StreamHandle {
    /// Generation of the stream.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Message index the stream writes into.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// The observer registered when the stream started.
    pub fn observer(&self) -> &Arc<dyn ProgressObserver> {
        &self.observer
    }
}

/// Everything guarded by the store's lock.
pub struct ChatState {
    /// Session collection and the current session.
    pub sessions: SessionManager,
    active: HashMap<SessionId, StreamHandle>,
    next_generation: u64,
}

impl ChatState {
    /// Wraps a session manager with an empty stream table.
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            sessions,
            active: HashMap::new(),
            next_generation: 1,
        }
    }

    /// Register a new stream writing into `slot` of `session`.
    ///
    /// A stream already registered for the session is cancelled and forgotten.
    pub fn begin_stream(
        &mut self,
        session: SessionId,
        slot: usize,
        observer: Arc<dyn ProgressObserver>,
    ) -> StreamTicket {
        let generation = self.next_generation;
        self.next_generation += 1;
        let token = CancellationToken::new();
        let replaced = self.active.insert(
            session,
            StreamHandle {
                generation,
                slot,
                token: token.clone(),
                observer,
            },
        );
        if let Some(old) = replaced {
            tracing::debug!(
                session = %session,
                generation = old.generation,
                "superseded streaming request"
            );
            old.token.cancel();
        }
        StreamTicket {
            session,
            generation,
            token,
        }
    }

    /// True while the ticket's stream may still write.
    pub fn is_active(&self, ticket: &StreamTicket) -> bool {
        self.active
            .get(&ticket.session)
            .is_some_and(|handle| handle.generation == ticket.generation)
    }

    /// True unless another active stream of the ticket's session writes into `slot`.
    pub fn owns_slot(&self, ticket: &StreamTicket, slot: usize) -> bool {
        match self.active.get(&ticket.session) {
            Some(handle) => handle.generation == ticket.generation || handle.slot != slot,
            None => true,
        }
    }

    /// True while `session` has an active stream.
    pub fn is_streaming(&self, session: SessionId) -> bool {
        self.active.contains_key(&session)
    }

    /// Cancel and forget the active stream of `session`.
    pub fn cancel(&mut self, session: SessionId) -> Option<StreamHandle> {
        let handle = self.active.remove(&session)?;
        handle.token.cancel();
        Some(handle)
    }

    /// Cancel the ticket's stream if it is still the active one.
    pub fn cancel_ticket(&mut self, ticket: &StreamTicket) -> Option<StreamHandle> {
        if self.is_active(ticket) {
            self.cancel(ticket.session)
        } else {
            None
        }
    }

    /// Retire the ticket's stream: clear the in-progress flag of its slot and drop its handle.
    ///
    /// Returns true if the handle was still registered, i.e. the stream was not stopped.
    pub fn end_stream(&mut self, ticket: &StreamTicket, slot: usize) -> bool {
        if self.owns_slot(ticket, slot)
            && let Some(message) = self.message_mut(ticket.session, slot)
        {
            message.is_analyzing = false;
        }
        if self.is_active(ticket) {
            self.active.remove(&ticket.session);
            true
        } else {
            false
        }
    }

    /// The message at `index` of session `id`.
    pub fn message(&self, id: SessionId, index: usize) -> Option<&Message> {
        self.sessions.session(id)?.messages.get(index)
    }

    /// The message at `index` of session `id`, mutably.
    pub fn message_mut(&mut self, id: SessionId, index: usize) -> Option<&mut Message> {
        self.sessions.session_mut(id)?.messages.get_mut(index)
    }
}

/// Cloneable handle to the shared [`ChatState`].
#[derive(Clone)]
pub struct ChatStore {
    inner: Arc<Mutex<ChatState>>,
}

impl ChatStore {
    /// Creates a store around `sessions`.
    pub fn new(sessions: SessionManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ChatState::new(sessions))),
        }
    }

    /// Lock the state.  Never hold the guard across an await point.
    pub fn lock(&self) -> MutexGuard<'_, ChatState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The message slot a stream writes into.
pub struct SessionSlot {
    store: ChatStore,
    ticket: StreamTicket,
    index: usize,
}

impl SessionSlot {
    /// Install an in-progress assistant placeholder at `index` and return the slot.
    ///
    /// Returns `Ok(None)` if the stream was stopped (or its session deleted) before the slot could
    /// be opened.
    pub fn open(store: &ChatStore, ticket: StreamTicket, index: usize) -> Result<Option<Self>> {
        {
            let mut state = store.lock();
            if !state.is_active(&ticket) {
                return Ok(None);
            }
            let Some(session) = state.sessions.session_mut(ticket.session) else {
                return Ok(None);
            };
            if !place(&mut session.messages, index, Message::placeholder()) {
                return Err(Error::validation(
                    format!(
                        "cannot write message {index} into a session of {} messages",
                        session.messages.len()
                    ),
                    Some("index".to_string()),
                ));
            }
        }
        Ok(Some(Self {
            store: store.clone(),
            ticket,
            index,
        }))
    }
}

impl MessageTarget for SessionSlot {
    fn index(&self) -> usize {
        self.index
    }

    fn append(&mut self, delta: &str) -> bool {
        let mut state = self.store.lock();
        if !state.is_active(&self.ticket) {
            return false;
        }
        match state.message_mut(self.ticket.session, self.index) {
            Some(message) => {
                message.content.push_str(delta);
                true
            }
            None => false,
        }
    }

    fn finish(&mut self) {
        let mut state = self.store.lock();
        if !state.owns_slot(&self.ticket, self.index) {
            return;
        }
        if let Some(message) = state.message_mut(self.ticket.session, self.index) {
            message.is_analyzing = false;
        }
    }
}
