//! Newline-delimited JSON-RPC framing for stdio backends.
//!
//! Pure parsing plus one bounded async line reader. The stdio transport's
//! read loop calls [`bounded_read_line`] and then [`parse_line`] for every
//! line the backend writes.

use serde_json::Value;
use tokio::io::AsyncBufRead;
use tokio::io::AsyncBufReadExt;

use crate::jsonrpc::{JsonRpcClassifyError, JsonRpcMessageKind, classify_jsonrpc};

/// Maximum size of one NDJSON message (10 MB).
///
/// Lines exceeding this limit are skipped before JSON parsing.
pub const MAX_MESSAGE_BYTES: usize = 10 * 1024 * 1024;

/// Errors produced while framing a line from a stdio backend.
#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// A single line exceeds [`MAX_MESSAGE_BYTES`].
    #[error("Message exceeds maximum size of {max_bytes} bytes")]
    MessageTooLarge { max_bytes: usize },

    /// The line is not valid JSON, or is JSON but not a JSON-RPC message.
    #[error("Malformed JSON: {reason}")]
    MalformedJson { reason: String },

    /// The `jsonrpc` field is absent.
    #[error("Missing required jsonrpc field")]
    MissingVersion,

    /// The `jsonrpc` field is present but not `"2.0"`.
    #[error("Unsupported JSON-RPC version: {version}")]
    UnsupportedVersion { version: String },

    /// The line is a JSON array. MCP does not use batches.
    #[error("JSON-RPC batch requests (arrays) are not supported")]
    UnsupportedBatch,

    /// Reading from the backend's stdout failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A classified line from a stdio backend.
#[derive(Debug, Clone)]
pub struct StdioMessage {
    pub kind: JsonRpcMessageKind,
    /// The full parsed message.
    pub value: Value,
}

/// Parse one NDJSON line into a classified JSON-RPC message.
///
/// # Errors
///
/// Returns [`FramingError`] for oversized, empty or malformed lines, batches,
/// and messages that fail JSON-RPC classification. The stdio read loop treats
/// all of these as incidental output and discards the line.
pub fn parse_line(line: &[u8]) -> Result<StdioMessage, FramingError> {
    if line.len() > MAX_MESSAGE_BYTES {
        return Err(FramingError::MessageTooLarge {
            max_bytes: MAX_MESSAGE_BYTES,
        });
    }

    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Err(FramingError::MalformedJson {
            reason: "empty message".to_string(),
        });
    }

    let value: Value = serde_json::from_slice(trimmed).map_err(|e| FramingError::MalformedJson {
        reason: e.to_string(),
    })?;

    if value.is_array() {
        return Err(FramingError::UnsupportedBatch);
    }

    let kind = classify_jsonrpc(&value).map_err(|e| match e {
        JsonRpcClassifyError::InvalidVersion => {
            match value.get("jsonrpc").and_then(|v| v.as_str()) {
                Some(v) => FramingError::UnsupportedVersion {
                    version: v.to_string(),
                },
                None => FramingError::MissingVersion,
            }
        }
        JsonRpcClassifyError::InvalidId => FramingError::MalformedJson {
            reason: "invalid id field".to_string(),
        },
        JsonRpcClassifyError::Unclassifiable => FramingError::MalformedJson {
            reason: "message has neither id nor method".to_string(),
        },
    })?;

    Ok(StdioMessage { kind, value })
}

/// Serialize a message as one NDJSON line (terminated by `\n`).
pub fn encode_line<T: serde::Serialize>(message: &T) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec(message)?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Read one newline-terminated line into `buf`, refusing to buffer more than
/// `max_bytes`.
///
/// Returns the number of bytes appended, or `Ok(0)` at EOF. An oversized line
/// is drained up to its newline so that the next call starts on a fresh line.
pub async fn bounded_read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    max_bytes: usize,
) -> Result<usize, FramingError> {
    let mut total = 0usize;
    loop {
        let available = reader.fill_buf().await.map_err(FramingError::Io)?;

        if available.is_empty() {
            return Ok(total);
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let to_consume = pos + 1;
                if total + to_consume > max_bytes {
                    reader.consume(to_consume);
                    return Err(FramingError::MessageTooLarge { max_bytes });
                }

                buf.extend_from_slice(&available[..to_consume]);
                total += to_consume;
                reader.consume(to_consume);
                return Ok(total);
            }
            None => {
                let len = available.len();
                if total + len > max_bytes {
                    reader.consume(len);
                    drain_until_newline(reader).await;
                    return Err(FramingError::MessageTooLarge { max_bytes });
                }

                buf.extend_from_slice(available);
                total += len;
                reader.consume(len);
            }
        }
    }
}

/// Skip bytes up to and including the next newline, or until EOF.
async fn drain_until_newline<R: AsyncBufRead + Unpin>(reader: &mut R) {
    loop {
        let (consume, done) = match reader.fill_buf().await {
            Ok([]) => return,
            Ok(buf) => match buf.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (buf.len(), false),
            },
            Err(_) => return,
        };
        reader.consume(consume);
        if done {
            return;
        }
    }
}
