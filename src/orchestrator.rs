//! Single-turn chat and the file-discovery pipeline.
//!
//! A discovery turn occupies a window of three slots starting at the question's index: the
//! question, the model's choice of files, and the answer written from those files.  The prompts
//! that drive both stages are sent to the model but never stored in the session.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::augment::SemanticSearchAugmenter;
use crate::cancel::{CancellationController, StopOutcome};
use crate::client::CompletionTransport;
use crate::discovery::{
    DiscoveryReply, FileAccess, context_answer_prompt, discovery_prompt, fetch_context,
};
use crate::error::{Error, Result};
use crate::observability::{DISCOVERY_SHORT_CIRCUITS, DISCOVERY_TURNS, STREAM_TIMEOUTS};
use crate::render::ProgressObserver;
use crate::store::{ChatStore, SessionSlot, StreamTicket};
use crate::stream::{StreamConsumer, StreamEnd};
use crate::types::{ChatCompletionRequest, Message, Model, SessionId};

/// The result of one streamed reply.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ChatTurn {
    /// Session the reply was written into.
    pub session: SessionId,
    /// Slot of the reply.
    pub index: usize,
    /// Whether the reply ran to completion.
    pub end: StreamEnd,
}

/// How a discovery turn ended without error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    /// Both stages ran; the answer is in the turn's slot.
    Answered(ChatTurn),
    /// The model selected no files, so no answer was requested.
    NoRelevantFiles,
    /// The selected files were all empty, so no answer was requested.
    NoFileContent,
    /// A stage was stopped.
    Cancelled,
}

/// Drives chat requests for the current session.
pub struct ChatOrchestrator {
    transport: Arc<dyn CompletionTransport>,
    store: ChatStore,
    controller: CancellationController,
    files: Arc<dyn FileAccess>,
    augmenter: Option<SemanticSearchAugmenter>,
    consumer: StreamConsumer,
    stream_timeout: Option<Duration>,
}

impl ChatOrchestrator {
    /// Creates an orchestrator without semantic search or a stream deadline.
    pub fn new(
        transport: Arc<dyn CompletionTransport>,
        store: ChatStore,
        files: Arc<dyn FileAccess>,
    ) -> Self {
        Self {
            transport,
            controller: CancellationController::new(store.clone()),
            store,
            files,
            augmenter: None,
            consumer: StreamConsumer::new(),
            stream_timeout: None,
        }
    }

    /// Enable semantic-search augmentation for calls that ask for it.
    pub fn with_semantic_search(mut self, augmenter: SemanticSearchAugmenter) -> Self {
        self.augmenter = Some(augmenter);
        self
    }

    /// Bound every stream, including the request that opens it, by `timeout`.
    pub fn with_stream_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_timeout = timeout;
        self
    }

    /// The shared session store.
    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    /// The controller that stops this orchestrator's streams.
    pub fn controller(&self) -> &CancellationController {
        &self.controller
    }

    /// Stop the current session's stream.
    pub fn stop_chat(&self) -> StopOutcome {
        self.controller.stop_chat()
    }

    /// Stream one reply to `messages` into the current session.
    ///
    /// The reply lands at `target_index` when `overwrite` is set and at `target_index + 1`
    /// otherwise.  The session is marked as streaming for the duration of the call, and both the
    /// streaming mark and the slot's in-progress flag are cleared on every path out.  Starting a
    /// call while another one streams into the same session stops the earlier one.
    pub async fn process_chat(
        &self,
        messages: &[Message],
        target_index: usize,
        overwrite: bool,
        use_semantic_search: bool,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<ChatTurn> {
        let slot = if overwrite {
            target_index
        } else {
            target_index + 1
        };
        let (session, model, ticket) = {
            let mut state = self.store.lock();
            let current = state
                .sessions
                .current()
                .ok_or_else(|| Error::configuration("no session selected"))?;
            let model = current
                .model
                .clone()
                .ok_or_else(|| Error::configuration("no model selected"))?;
            if slot > current.messages.len() {
                return Err(Error::validation(
                    format!(
                        "cannot write message {slot} into a session of {} messages",
                        current.messages.len()
                    ),
                    Some("index".to_string()),
                ));
            }
            let session = current.id;
            let ticket = state.begin_stream(session, slot, observer.clone());
            (session, model, ticket)
        };
        tracing::debug!(session = %session, slot, generation = ticket.generation, "dispatching chat");

        let deadline = self.stream_timeout.map(|timeout| Instant::now() + timeout);
        let result = self
            .run_stream(
                &model,
                messages,
                slot,
                use_semantic_search,
                &ticket,
                observer.as_ref(),
                deadline,
            )
            .await;
        let result = match result {
            Err(err) if err.is_timeout() => {
                STREAM_TIMEOUTS.click();
                self.controller.cancel_stream(&ticket);
                Err(match err {
                    Error::Timeout {
                        message,
                        duration: None,
                    } => Error::timeout(message, self.stream_timeout.map(|t| t.as_secs_f64())),
                    other => other,
                })
            }
            other => other,
        };
        self.store.lock().end_stream(&ticket, slot);
        let end = result?;
        Ok(ChatTurn {
            session,
            index: slot,
            end,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_stream(
        &self,
        model: &Model,
        messages: &[Message],
        slot: usize,
        use_semantic_search: bool,
        ticket: &StreamTicket,
        observer: &dyn ProgressObserver,
        deadline: Option<Instant>,
    ) -> Result<StreamEnd> {
        let outgoing = match (&self.augmenter, use_semantic_search) {
            (Some(augmenter), true) => {
                match until(&ticket.token, deadline, augmenter.augment(messages)).await? {
                    Some(outgoing) => outgoing,
                    None => return Ok(StreamEnd::Cancelled),
                }
            }
            (None, true) => {
                tracing::warn!("semantic search requested but no index is configured");
                messages.to_vec()
            }
            (_, false) => messages.to_vec(),
        };
        let request = ChatCompletionRequest::streaming(model, &outgoing);
        let opened = until(
            &ticket.token,
            deadline,
            self.transport.open_stream(model, &request),
        )
        .await?;
        let Some(body) = opened else {
            return Ok(StreamEnd::Cancelled);
        };
        let Some(mut target) = SessionSlot::open(&self.store, ticket.clone(), slot)? else {
            return Ok(StreamEnd::Cancelled);
        };
        self.consumer
            .consume(body, &mut target, observer, &ticket.token, deadline)
            .await
    }

    /// Answer the question at `messages[index]` from the files the model selects for it.
    ///
    /// The first stage sends `messages` with the question replaced by a discovery prompt and
    /// streams the model's file selection into `index` (when `overwrite` is set) or `index + 1`.
    /// If it names files with content, the second stage sends `messages[..index]` plus a prompt
    /// carrying those files and streams the answer into `index + 2`.  When overwriting, the
    /// session must already hold a message at `index + 1`.
    pub async fn select_file_and_chat(
        &self,
        messages: &[Message],
        index: usize,
        overwrite: bool,
        use_semantic_search: bool,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<DiscoveryOutcome> {
        {
            let state = self.store.lock();
            let current = state
                .sessions
                .current()
                .ok_or_else(|| Error::configuration("no session selected"))?;
            if current.model.is_none() {
                return Err(Error::configuration("no model selected"));
            }
            if overwrite && current.messages.len() < index + 2 {
                return Err(Error::validation(
                    format!("no reply window to overwrite at message {index}"),
                    Some("index".to_string()),
                ));
            }
        }
        let question = messages
            .get(index)
            .ok_or_else(|| {
                Error::validation(
                    format!("no message at index {index}"),
                    Some("index".to_string()),
                )
            })?
            .content
            .clone();
        DISCOVERY_TURNS.click();

        let mut hidden = messages.to_vec();
        hidden[index].content = discovery_prompt(&question);
        let turn = self
            .process_chat(
                &hidden,
                index,
                overwrite,
                use_semantic_search,
                observer.clone(),
            )
            .await?;
        if turn.end == StreamEnd::Cancelled {
            return Ok(DiscoveryOutcome::Cancelled);
        }

        let reply = self
            .store
            .lock()
            .message(turn.session, turn.index)
            .map(|message| message.content.clone())
            .unwrap_or_default();
        let paths = DiscoveryReply::parse(&reply)?.paths();
        if paths.is_empty() {
            DISCOVERY_SHORT_CIRCUITS.click();
            tracing::debug!(index, "discovery selected no files");
            return Ok(DiscoveryOutcome::NoRelevantFiles);
        }

        let context = fetch_context(self.files.as_ref(), &paths).await?;
        if context.is_empty() {
            DISCOVERY_SHORT_CIRCUITS.click();
            tracing::debug!(index, files = paths.len(), "selected files are empty");
            return Ok(DiscoveryOutcome::NoFileContent);
        }

        let mut followup = messages[..index].to_vec();
        followup.push(Message::user(context_answer_prompt(&context, &question)));
        let answer = self
            .process_chat(
                &followup,
                index + 2,
                true,
                use_semantic_search,
                observer,
            )
            .await?;
        Ok(match answer.end {
            StreamEnd::Completed => DiscoveryOutcome::Answered(answer),
            StreamEnd::Cancelled => DiscoveryOutcome::Cancelled,
        })
    }

    /// Append `text` as a user message to the current session and answer it.
    ///
    /// With `discovery` set the answer goes through [`ChatOrchestrator::select_file_and_chat`],
    /// otherwise through a single [`ChatOrchestrator::process_chat`].  The current session is
    /// saved back to the session list afterwards, whatever the outcome.
    pub async fn ask(
        &self,
        text: &str,
        discovery: bool,
        use_semantic_search: bool,
        observer: Arc<dyn ProgressObserver>,
    ) -> Result<DiscoveryOutcome> {
        let (messages, index) = {
            let mut state = self.store.lock();
            let current = state
                .sessions
                .current_mut()
                .ok_or_else(|| Error::configuration("no session selected"))?;
            current.messages.push(Message::user(text));
            (current.messages.clone(), current.messages.len() - 1)
        };
        let outcome = if discovery {
            self.select_file_and_chat(&messages, index, false, use_semantic_search, observer)
                .await
        } else {
            self.process_chat(&messages, index, false, use_semantic_search, observer)
                .await
                .map(|turn| match turn.end {
                    StreamEnd::Completed => DiscoveryOutcome::Answered(turn),
                    StreamEnd::Cancelled => DiscoveryOutcome::Cancelled,
                })
        };
        self.store.lock().sessions.update_session();
        outcome
    }
}

/// Run `fut` unless `token` is cancelled first or `deadline` passes.
async fn until<F, T>(
    token: &CancellationToken,
    deadline: Option<Instant>,
    fut: F,
) -> Result<Option<T>>
where
    F: Future<Output = Result<T>>,
{
    let bounded = async {
        match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| Error::timeout("completion request did not finish in time", None))?,
            None => fut.await,
        }
    };
    tokio::select! {
        biased;
        _ = token.cancelled() => Ok(None),
        result = bounded => result.map(Some),
    }
}
