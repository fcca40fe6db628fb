//! Server-Sent Events codec.
//!
//! [`SseDecoder`] is a restartable, incremental decoder: feed it bytes as
//! they arrive and pull complete events one at a time. It never holds more
//! than one partial event plus one partial line, so a caller looking for a
//! single matching frame can stop reading the body as soon as it is found.
//!
//! Lines may end in `\n`, `\r\n` or a bare `\r`. Bytes already searched
//! for a line end are not searched again when the next chunk arrives.

use bytes::{Buf, BytesMut};

/// Upper bound on a single event (10 MB), matching the NDJSON line limit.
pub const MAX_EVENT_BYTES: usize = 10 * 1024 * 1024;

/// One decoded event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseEvent {
    /// `event:` field. `None` means the default type, `message`.
    pub event: Option<String>,
    /// `data:` lines joined with `\n`.
    pub data: String,
    /// `id:` field.
    pub id: Option<String>,
}

impl SseEvent {
    /// Event type, defaulting to `message`.
    pub fn event_type(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// Errors raised while decoding an event stream.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SseError {
    #[error("event exceeds maximum size of {max_bytes} bytes")]
    EventTooLarge { max_bytes: usize },
}

/// Incremental `text/event-stream` decoder.
#[derive(Debug)]
pub struct SseDecoder {
    buf: BytesMut,
    /// Prefix of `buf` known to contain no line end.
    scanned: usize,
    /// The last line ended in `\r`; a leading `\n` belongs to it.
    skip_lf: bool,
    event: Option<String>,
    data: Vec<String>,
    data_len: usize,
    id: Option<String>,
    max_bytes: usize,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::with_limit(MAX_EVENT_BYTES)
    }

    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(8192),
            scanned: 0,
            skip_lf: false,
            event: None,
            data: Vec::new(),
            data_len: 0,
            id: None,
            max_bytes,
        }
    }

    /// Append bytes read from the stream.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pull the next complete event, or `None` if more bytes are needed.
    pub fn next_event(&mut self) -> Result<Option<SseEvent>, SseError> {
        loop {
            if self.skip_lf && !self.buf.is_empty() {
                if self.buf[0] == b'\n' {
                    self.buf.advance(1);
                }
                self.skip_lf = false;
            }
            let Some(offset) = self.buf[self.scanned..]
                .iter()
                .position(|&b| b == b'\n' || b == b'\r')
            else {
                self.scanned = self.buf.len();
                break;
            };
            let pos = self.scanned + offset;
            let line = self.buf.split_to(pos + 1);
            self.scanned = 0;
            self.skip_lf = line[pos] == b'\r';
            if let Some(event) = self.process_line(&line[..pos])? {
                return Ok(Some(event));
            }
        }

        if self.buf.len() + self.data_len > self.max_bytes {
            self.reset();
            return Err(SseError::EventTooLarge {
                max_bytes: self.max_bytes,
            });
        }
        Ok(None)
    }

    /// Flush at end of stream. A trailing event without its blank line is
    /// still delivered.
    pub fn finish(&mut self) -> Result<Option<SseEvent>, SseError> {
        self.scanned = 0;
        self.skip_lf = false;
        if !self.buf.is_empty() {
            let line = std::mem::take(&mut self.buf);
            if let Some(event) = self.process_line(&line)? {
                return Ok(Some(event));
            }
        }
        Ok(self.dispatch())
    }

    fn process_line(&mut self, line: &[u8]) -> Result<Option<SseEvent>, SseError> {
        if line.is_empty() {
            return Ok(self.dispatch());
        }
        if line[0] == b':' {
            return Ok(None);
        }

        let line = String::from_utf8_lossy(line);
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                self.data_len += value.len() + 1;
                if self.data_len > self.max_bytes {
                    self.reset();
                    return Err(SseError::EventTooLarge {
                        max_bytes: self.max_bytes,
                    });
                }
                self.data.push(value.to_string());
            }
            "id" => self.id = Some(value.to_string()),
            // `retry` and unknown fields are ignored.
            _ => {}
        }
        Ok(None)
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        let event = SseEvent {
            event: self.event.take(),
            data: self.data.join("\n"),
            id: self.id.take(),
        };
        self.data.clear();
        self.data_len = 0;
        Some(event)
    }

    fn reset(&mut self) {
        self.buf.clear();
        self.scanned = 0;
        self.skip_lf = false;
        self.event = None;
        self.data.clear();
        self.data_len = 0;
        self.id = None;
    }
}

/// Encode one event. Multi-line data is split across several `data:` lines.
pub fn encode_event(event: &str, data: &str) -> String {
    let mut out = String::with_capacity(data.len() + event.len() + 16);
    out.push_str("event: ");
    out.push_str(event);
    out.push('\n');
    for line in data.split('\n') {
        out.push_str("data: ");
        out.push_str(line);
        out.push('\n');
    }
    out.push('\n');
    out
}
