//! Server-sent event framing for the change feed.

use std::collections::VecDeque;

use async_trait::async_trait;
use bytes::Bytes;
use converge_events::Event;
use futures_util::stream::{BoxStream, StreamExt};
use futures_util::Stream;
use tracing::trace;

use crate::{ClientError, EventSource};

/// One dispatched SSE frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental SSE decoder; chunks may split lines anywhere.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every frame it completes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let mut line = std::mem::take(&mut self.line);
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                if let Some(frame) = self.process_line(&String::from_utf8_lossy(&line)) {
                    frames.push(frame);
                }
            } else {
                self.line.push(byte);
            }
        }
        frames
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            _ => trace!(field, "Ignoring SSE field"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event,
            data: std::mem::take(&mut self.data).join("\n"),
            id: self.id.clone(),
        })
    }
}

/// [`EventSource`] over an SSE byte stream.
pub struct SseEventSource {
    stream: Option<BoxStream<'static, Result<Bytes, ClientError>>>,
    decoder: SseDecoder,
    pending: VecDeque<SseFrame>,
}

impl SseEventSource {
    pub fn from_response(response: reqwest::Response) -> Self {
        Self::from_stream(
            response
                .bytes_stream()
                .map(|chunk| chunk.map_err(ClientError::from)),
        )
    }

    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes, ClientError>> + Send + 'static,
    {
        Self {
            stream: Some(stream.boxed()),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
        }
    }
}

#[async_trait]
impl EventSource for SseEventSource {
    async fn next(&mut self) -> Result<Event, ClientError> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Event::decode_frame(frame.event.as_deref(), &frame.data)
                    .map_err(|e| ClientError::Decode(e.to_string()));
            }

            let Some(stream) = self.stream.as_mut() else {
                return Err(ClientError::StreamClosed);
            };

            match stream.next().await {
                Some(Ok(chunk)) => {
                    let frames = self.decoder.push(&chunk);
                    self.pending.extend(frames);
                }
                Some(Err(e)) => {
                    self.stream = None;
                    return Err(e);
                }
                None => {
                    self.stream = None;
                    return Err(ClientError::StreamClosed);
                }
            }
        }
    }

    fn close(&mut self) {
        self.stream = None;
        self.pending.clear();
    }
}
