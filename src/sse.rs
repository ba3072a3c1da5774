//! Decoding of streamed chat-completion frames.
//!
//! A completion response is a sequence of `data: <json>` frames, possibly several per physical
//! chunk, terminated by `data: [DONE]`.  The decoder turns raw chunks into the delta text they
//! carry.  Decoding is best-effort: a frame that does not parse is logged and skipped, and the
//! frames around it are unaffected.

use crate::observability::STREAM_MALFORMED_FRAMES;
use crate::types::ChatCompletionChunk;

/// Token that introduces every frame.
pub const FRAME_DELIMITER: &str = "data:";

/// Payload of the terminal frame.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Incremental decoder for a chat-completion byte stream.
///
/// Multi-byte characters and frames that straddle chunk boundaries are carried over to the next
/// chunk; anything still unparseable when the stream ends is reported as malformed.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: String,
    utf8_tail: Vec<u8>,
    malformed: usize,
}

impl FrameDecoder {
    /// Create a decoder with empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one physical chunk and return the delta text it completes.
    pub fn feed(&mut self, bytes: &[u8]) -> String {
        let text = self.decode_utf8(bytes);
        self.pending.push_str(&text);
        self.drain(false)
    }

    /// Flush whatever is buffered once the stream has ended.
    pub fn finish(&mut self) -> String {
        if !self.utf8_tail.is_empty() {
            let tail = std::mem::take(&mut self.utf8_tail);
            self.pending.push_str(&String::from_utf8_lossy(&tail));
        }
        self.drain(true)
    }

    /// Number of frames skipped because they could not be parsed.
    pub fn malformed_frames(&self) -> usize {
        self.malformed
    }

    fn decode_utf8(&mut self, bytes: &[u8]) -> String {
        let mut input = std::mem::take(&mut self.utf8_tail);
        input.extend_from_slice(bytes);
        let mut text = String::with_capacity(input.len());
        let mut rest = &input[..];
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    break;
                }
                Err(err) => {
                    let (valid, after) = rest.split_at(err.valid_up_to());
                    text.push_str(&String::from_utf8_lossy(valid));
                    match err.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            self.utf8_tail = after.to_vec();
                            break;
                        }
                    }
                }
            }
        }
        text
    }

    fn drain(&mut self, at_end: bool) -> String {
        let buffer = std::mem::take(&mut self.pending);
        let mut frames: Vec<&str> = buffer.split(FRAME_DELIMITER).collect();
        let last = frames.pop().unwrap_or_default();

        let mut text = String::new();
        for frame in frames {
            self.take_frame(frame, &mut text);
        }

        // The last frame may still be arriving; hold it back unless it already parses.
        match parse_frame(last) {
            Ok(delta) => text.push_str(delta.as_deref().unwrap_or_default()),
            Err(_) if !at_end => self.pending = last.to_string(),
            Err(err) => self.report(last, &err),
        }
        text
    }

    fn take_frame(&mut self, frame: &str, text: &mut String) {
        match parse_frame(frame) {
            Ok(Some(delta)) => text.push_str(&delta),
            Ok(None) => {}
            Err(err) => self.report(frame, &err),
        }
    }

    fn report(&mut self, frame: &str, err: &serde_json::Error) {
        self.malformed += 1;
        STREAM_MALFORMED_FRAMES.click();
        tracing::warn!(error = %err, frame = %frame.trim(), "skipping malformed stream frame");
    }
}

/// Parse a single frame payload into its delta text.
///
/// Empty frames and the `[DONE]` sentinel carry no text.
pub fn parse_frame(frame: &str) -> Result<Option<String>, serde_json::Error> {
    let frame = frame.trim();
    if frame.is_empty() || frame == DONE_SENTINEL {
        return Ok(None);
    }
    let chunk: ChatCompletionChunk = serde_json::from_str(frame)?;
    Ok(chunk.delta_text().map(str::to_string))
}
