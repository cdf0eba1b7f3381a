//! Completion provider implementations.

pub mod ollama;
pub mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use crate::client::{LlmStream, StreamEvent};
use futures::{Stream, StreamExt};
use std::collections::VecDeque;

/// State for [`line_events`].
struct LineDecoder<S, F> {
    inner: S,
    buffer: Vec<u8>,
    pending: VecDeque<StreamEvent>,
    parse: F,
    finished: bool,
}

impl<S, F> LineDecoder<S, F>
where
    F: FnMut(&str) -> Vec<StreamEvent>,
{
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.push_line(&line);
        }
    }

    fn push_line(&mut self, line: &[u8]) {
        let text = String::from_utf8_lossy(line);
        let text = text.trim();
        if !text.is_empty() {
            let events = (self.parse)(text);
            self.pending.extend(events);
        }
    }
}

/// Turn a byte stream of newline-delimited records into completion events.
///
/// Records may be split across network chunks (including inside a multi-byte
/// character); bytes are buffered until a full line is available. Each line is
/// handed to `parse`, which returns zero or more events. A transport error ends
/// the stream with a single [`StreamEvent::Error`].
pub(crate) fn line_events<S, B, E, F>(inner: S, parse: F) -> LlmStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
    E: std::fmt::Display + Send,
    F: FnMut(&str) -> Vec<StreamEvent> + Send + 'static,
{
    let decoder = LineDecoder {
        inner,
        buffer: Vec::new(),
        pending: VecDeque::new(),
        parse,
        finished: false,
    };

    Box::pin(futures::stream::unfold(decoder, |mut decoder| async move {
        loop {
            if let Some(event) = decoder.pending.pop_front() {
                return Some((event, decoder));
            }
            if decoder.finished {
                return None;
            }

            match decoder.inner.next().await {
                Some(Ok(chunk)) => {
                    decoder.buffer.extend_from_slice(chunk.as_ref());
                    decoder.drain_lines();
                }
                Some(Err(e)) => {
                    decoder.finished = true;
                    decoder
                        .pending
                        .push_back(StreamEvent::Error(format!("Stream error: {}", e)));
                }
                None => {
                    decoder.finished = true;
                    let rest = std::mem::take(&mut decoder.buffer);
                    decoder.push_line(&rest);
                }
            }
        }
    }))
}
