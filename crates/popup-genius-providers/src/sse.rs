//! Generic SSE (Server-Sent Events) line parser.
//!
//! Converts a response body into a `Stream<Item = SseEvent>`. Lines are split
//! on raw bytes so multi-byte characters that straddle network chunks decode
//! intact.

use std::pin::Pin;

use bytes::Bytes;
use futures::{Stream, StreamExt};

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Parse a reqwest response body as an SSE stream.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> impl Stream<Item = anyhow::Result<SseEvent>> + Send {
    parse_sse_bytes(response.bytes_stream())
}

/// Parse any byte stream as SSE.
pub fn parse_sse_bytes<S, E>(byte_stream: S) -> impl Stream<Item = anyhow::Result<SseEvent>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let byte_stream = byte_stream.map(|chunk| chunk.map_err(|e| anyhow::anyhow!("{e}")));

    futures::stream::unfold(
        SseState {
            byte_stream: Box::pin(byte_stream),
            buffer: Vec::new(),
            current_event: None,
            current_data: Vec::new(),
            current_id: None,
            finished: false,
        },
        |mut state| async move {
            loop {
                if let Some(line) = state.next_line() {
                    if line.is_empty() {
                        // Empty line = dispatch event
                        if let Some(event) = state.take_event() {
                            return Some((Ok(event), state));
                        }
                        continue;
                    }
                    state.apply_line(&line);
                    continue;
                }

                if state.finished {
                    return state.take_event().map(|event| (Ok(event), state));
                }

                // Need more data from the stream
                match state.byte_stream.next().await {
                    Some(Ok(chunk)) => state.buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        state.finished = true;
                        state.buffer.clear();
                        return Some((Err(anyhow::anyhow!("SSE stream error: {e}")), state));
                    }
                    None => {
                        // Treat an unterminated trailing line as complete.
                        state.finished = true;
                        if !state.buffer.is_empty() {
                            state.buffer.push(b'\n');
                        }
                    }
                }
            }
        },
    )
}

struct SseState {
    byte_stream: Pin<Box<dyn Stream<Item = anyhow::Result<Bytes>> + Send>>,
    buffer: Vec<u8>,
    current_event: Option<String>,
    current_data: Vec<String>,
    current_id: Option<String>,
    finished: bool,
}

impl SseState {
    fn next_line(&mut self) -> Option<String> {
        let newline_pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let raw: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
        let line = String::from_utf8_lossy(&raw[..newline_pos]);
        Some(line.trim_end_matches('\r').to_string())
    }

    fn apply_line(&mut self, line: &str) {
        if line.starts_with(':') {
            // Comment, skip
            return;
        }
        if let Some(value) = line.strip_prefix("event:") {
            self.current_event = Some(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("data:") {
            self.current_data.push(value.trim_start().to_string());
        } else if let Some(value) = line.strip_prefix("id:") {
            self.current_id = Some(value.trim_start().to_string());
        }
        // Ignore unknown fields
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.current_data.is_empty() {
            return None;
        }
        let event = SseEvent {
            event: self.current_event.take(),
            data: self.current_data.join("\n"),
            id: self.current_id.take(),
        };
        self.current_data.clear();
        Some(event)
    }
}
