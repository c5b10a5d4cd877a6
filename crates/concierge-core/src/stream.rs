//! Streaming chat-completions decoder
//!
//! The gateway answers with `data: {json}` lines separated by blank lines and
//! ends with `data: [DONE]`. Bytes arrive at arbitrary boundaries, so
//! [`FrameDecoder`] holds back split UTF-8 sequences and partial lines until
//! they are complete. [`decode`] wraps it into a pull-based stream of text
//! deltas that honours a cancellation token.

use bytes::Bytes;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::Deserialize;
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ai::BodyError;
use crate::error::{ChatError, Result};

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Why the model stopped producing tokens
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    #[serde(other)]
    Other,
}

/// The fields of interest from one streamed frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEvent {
    pub delta_content: Option<String>,
    pub finish_reason: Option<FinishReason>,
}

/// One complete, recognised line of the stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Event(StreamEvent),
    Done,
}

#[derive(Deserialize)]
struct ChunkFrame {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
    #[serde(default)]
    finish_reason: Option<FinishReason>,
}

#[derive(Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

impl ChunkFrame {
    fn into_event(self) -> StreamEvent {
        match self.choices.into_iter().next() {
            Some(choice) => StreamEvent {
                delta_content: choice.delta.and_then(|d| d.content),
                finish_reason: choice.finish_reason,
            },
            None => StreamEvent {
                delta_content: None,
                finish_reason: None,
            },
        }
    }
}

/// Incremental reassembly of frames from raw byte chunks.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    /// Trailing bytes of an incomplete UTF-8 sequence
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a newline
    line: String,
    done: bool,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once `[DONE]` has been seen; later input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        if self.done {
            return Vec::new();
        }
        self.pending.extend_from_slice(chunk);
        self.decode_pending(false);
        self.drain_lines()
    }

    /// Flush whatever is buffered at end of input, including a final line
    /// with no trailing newline.
    pub fn finish(&mut self) -> Vec<Frame> {
        if self.done {
            return Vec::new();
        }
        self.decode_pending(true);
        let mut frames = self.drain_lines();
        if !self.done && !self.line.is_empty() {
            let tail = std::mem::take(&mut self.line);
            if let Some(frame) = parse_line(tail.trim_end_matches('\r')) {
                frames.push(frame);
            }
        }
        self.done = true;
        frames
    }

    fn decode_pending(&mut self, at_eof: bool) {
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.line.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    self.line
                        .push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match err.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None if !at_eof => {
                            self.pending.drain(..valid);
                            return;
                        }
                        None => {
                            self.line.push(char::REPLACEMENT_CHARACTER);
                            self.pending.clear();
                            return;
                        }
                        Some(len) => {
                            self.line.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    fn drain_lines(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(pos) = self.line.find('\n') {
            let raw: String = self.line.drain(..=pos).collect();
            let line = raw.trim_end_matches('\n').trim_end_matches('\r');
            match parse_line(line) {
                Some(Frame::Done) => {
                    frames.push(Frame::Done);
                    self.done = true;
                    self.line.clear();
                    self.pending.clear();
                    break;
                }
                Some(frame) => frames.push(frame),
                None => {}
            }
        }
        frames
    }
}

fn parse_line(line: &str) -> Option<Frame> {
    let data = line.strip_prefix(DATA_PREFIX)?.trim();
    if data.is_empty() {
        return None;
    }
    if data == DONE_SENTINEL {
        return Some(Frame::Done);
    }
    match serde_json::from_str::<ChunkFrame>(data) {
        Ok(chunk) => Some(Frame::Event(chunk.into_event())),
        Err(e) => {
            debug!(error = %e, "skipping malformed stream frame");
            None
        }
    }
}

/// Lazy stream of text deltas; ends after `[DONE]`, end of input, an error,
/// or cancellation.
pub type DeltaStream = BoxStream<'static, Result<String>>;

struct DecodeState<S> {
    body: Option<S>,
    decoder: FrameDecoder,
    queued: VecDeque<String>,
    cancel: CancellationToken,
    finished: bool,
}

impl<S> DecodeState<S> {
    /// Drop the body reader. `Option::take` makes this happen at most once.
    fn release(&mut self) {
        if self.body.take().is_some() {
            debug!("stream reader released");
        }
    }

    fn enqueue(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            match frame {
                Frame::Event(event) => {
                    if let Some(reason) = &event.finish_reason {
                        debug!(?reason, "stream finish reason");
                    }
                    if let Some(text) = event.delta_content.filter(|t| !t.is_empty()) {
                        self.queued.push_back(text);
                    }
                }
                Frame::Done => self.release(),
            }
        }
    }
}

/// Decode a chat-completions body into text deltas.
///
/// Each item is the delta of one parsed frame, in frame order. A read error
/// yields a single [`ChatError::Stream`] and ends the stream; cancellation
/// releases the body and yields a single [`ChatError::Cancelled`].
pub fn decode<S>(body: S, cancel: CancellationToken) -> DeltaStream
where
    S: Stream<Item = std::result::Result<Bytes, BodyError>> + Unpin + Send + 'static,
{
    let state = DecodeState {
        body: Some(body),
        decoder: FrameDecoder::new(),
        queued: VecDeque::new(),
        cancel,
        finished: false,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            if state.cancel.is_cancelled() {
                state.release();
                state.finished = true;
                return Some((Err(ChatError::Cancelled), state));
            }
            if let Some(text) = state.queued.pop_front() {
                return Some((Ok(text), state));
            }

            let cancel = state.cancel.clone();
            let Some(body) = state.body.as_mut() else {
                return None;
            };

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => continue,
                next = body.next() => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    let frames = state.decoder.push(&chunk);
                    state.enqueue(frames);
                }
                Some(Err(e)) => {
                    state.release();
                    state.finished = true;
                    return Some((Err(ChatError::Stream(e.to_string())), state));
                }
                None => {
                    let frames = state.decoder.finish();
                    state.release();
                    state.enqueue(frames);
                }
            }
        }
    })
    .boxed()
}
