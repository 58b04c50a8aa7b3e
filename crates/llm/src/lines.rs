//! Line framing for streamed HTTP bodies.
//!
//! Ollama sends newline-delimited JSON and OpenAI sends server-sent events.
//! Either way a network chunk may end in the middle of a line, so bytes are
//! buffered until a newline arrives.

use futures::{Stream, StreamExt};
use medrag_core::{AppError, AppResult};
use std::collections::VecDeque;

struct LineState<S> {
    inner: S,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    finished: bool,
}

/// Split a byte stream into trimmed, non-empty text lines.
///
/// A trailing line without a newline is emitted when the body ends. A
/// transport error is emitted once and ends the stream.
pub fn lines<S, B, E>(bytes: S) -> impl Stream<Item = AppResult<String>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + Unpin,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
{
    let state = LineState {
        inner: bytes,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(line) = state.pending.pop_front() {
                return Some((Ok(line), state));
            }
            if state.finished {
                return None;
            }

            match state.inner.next().await {
                Some(Ok(bytes)) => {
                    state.buffer.extend_from_slice(bytes.as_ref());
                    while let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                        let raw: Vec<u8> = state.buffer.drain(..=pos).collect();
                        push_line(&mut state.pending, &raw);
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state.pending.clear();
                    return Some((Err(AppError::Llm(format!("Stream error: {}", e))), state));
                }
                None => {
                    state.finished = true;
                    let rest = std::mem::take(&mut state.buffer);
                    push_line(&mut state.pending, &rest);
                }
            }
        }
    })
}

fn push_line(pending: &mut VecDeque<String>, raw: &[u8]) {
    let text = String::from_utf8_lossy(raw);
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        pending.push_back(trimmed.to_string());
    }
}
