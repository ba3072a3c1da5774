//! Draining a completion response into a message.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::observability::{STREAM_BYTES, STREAM_CHUNKS, STREAM_DROPPED_DELTAS, STREAM_DURATION};
use crate::render::ProgressObserver;
use crate::sse::FrameDecoder;

/// A response body as a stream of byte chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Where streamed text goes.
pub trait MessageTarget: Send {
    /// Index of the message being filled, reported to observers.
    fn index(&self) -> usize;

    /// Append a delta.  Returns false once the target no longer accepts text, which ends the
    /// stream as cancelled.
    fn append(&mut self, delta: &str) -> bool;

    /// Mark the message as no longer being filled.
    fn finish(&mut self);
}

/// How a stream ended without error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server closed the stream.
    Completed,
    /// The stream was stopped before the server closed it.
    Cancelled,
}

/// Reads a completion stream to its end, appending decoded deltas to a target in order.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamConsumer;

impl StreamConsumer {
    /// Create a new consumer.
    pub fn new() -> Self {
        Self
    }

    /// Drain `body` into `target`.
    ///
    /// `observer` hears about every chunk that was read.  Cancelling `token` ends the read loop
    /// at its next suspension point with [`StreamEnd::Cancelled`]; passing `deadline` fails the
    /// stream with [`Error::Timeout`].  The target is finished on every path.
    ///
    /// ```
    /// # tokio_test::block_on(async {
    /// use bytes::Bytes;
    /// use filechat::{MessageTarget, NullObserver, StreamConsumer, StreamEnd};
    /// use tokio_util::sync::CancellationToken;
    ///
    /// struct Text(String);
    ///
    /// impl MessageTarget for Text {
    ///     fn index(&self) -> usize { 0 }
    ///     fn append(&mut self, delta: &str) -> bool { self.0.push_str(delta); true }
    ///     fn finish(&mut self) {}
    /// }
    ///
    /// let body = futures::stream::iter(vec![
    ///     Ok(Bytes::from(r#"data: {"choices":[{"delta":{"content":"Hi"}}]}"#)),
    ///     Ok(Bytes::from("data: [DONE]")),
    /// ]);
    /// let mut text = Text(String::new());
    /// let token = CancellationToken::new();
    /// let end = StreamConsumer::new()
    ///     .consume(body, &mut text, &NullObserver, &token, None)
    ///     .await
    ///     .unwrap();
    /// assert_eq!(end, StreamEnd::Completed);
    /// assert_eq!(text.0, "Hi");
    /// # });
    /// ```
    pub async fn consume<S, T>(
        &self,
        mut body: S,
        target: &mut T,
        observer: &dyn ProgressObserver,
        token: &CancellationToken,
        deadline: Option<Instant>,
    ) -> Result<StreamEnd>
    where
        S: Stream<Item = Result<Bytes>> + Unpin,
        T: MessageTarget + ?Sized,
    {
        let started = std::time::Instant::now();
        let mut decoder = FrameDecoder::new();
        let end = loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                next = read_chunk(&mut body, deadline) => Some(next),
            };
            let Some(next) = next else {
                break Ok(StreamEnd::Cancelled);
            };
            match next {
                Ok(Some(bytes)) => {
                    STREAM_CHUNKS.click();
                    STREAM_BYTES.count(bytes.len() as u64);
                    let text = decoder.feed(&bytes);
                    if !deliver(target, &text) {
                        break Ok(StreamEnd::Cancelled);
                    }
                    observer.message_updated(Some(target.index()));
                }
                Ok(None) => {
                    let text = decoder.finish();
                    if text.is_empty() {
                        break Ok(StreamEnd::Completed);
                    }
                    if !deliver(target, &text) {
                        break Ok(StreamEnd::Cancelled);
                    }
                    observer.message_updated(Some(target.index()));
                    break Ok(StreamEnd::Completed);
                }
                Err(err) => break Err(err),
            }
        };
        target.finish();
        STREAM_DURATION.add(started.elapsed().as_secs_f64());
        end
    }
}

fn deliver<T: MessageTarget + ?Sized>(target: &mut T, text: &str) -> bool {
    if text.is_empty() || target.append(text) {
        true
    } else {
        STREAM_DROPPED_DELTAS.click();
        false
    }
}

async fn read_chunk<S>(body: &mut S, deadline: Option<Instant>) -> Result<Option<Bytes>>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let next = match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, body.next())
            .await
            .map_err(|_| Error::timeout("completion stream did not finish in time", None))?,
        None => body.next().await,
    };
    next.transpose()
}
