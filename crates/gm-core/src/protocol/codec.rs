//! Line codec for the GM protocol.
//!
//! Wire format:
//! ```text
//! <one JSON object, UTF-8, no embedded newline>\n
//! ```
//! One message per line, no batching. Non-ASCII text is written verbatim.
//! Inbound decoding performs no schema validation beyond the JSON structure:
//! missing or mistyped fields fall back to documented defaults.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::command_tree::parse_tree;
use crate::domain::session::UNKNOWN;
use crate::protocol::messages::{message_type, InboundMessage, OutboundMessage, DEFAULT_LOG_LEVEL};

/// Errors that can occur while encoding or decoding one line.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The line is not valid UTF-8.
    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    /// The line is not valid JSON.
    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    /// The line is valid JSON but not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// The `"type"` field is missing or names no known inbound message.
    #[error("unknown message type: {0:?}")]
    UnknownMessageType(String),

    /// An outbound message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes an outbound message as one `\n`-terminated line.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails.
///
/// # Examples
///
/// ```rust
/// use gm_core::protocol::{encode_line, OutboundMessage};
///
/// let line = encode_line(&OutboundMessage::Exec { id: 1000, cmd: "print(1)".into() }).unwrap();
/// assert_eq!(line, "{\"type\":\"EXEC\",\"id\":1000,\"cmd\":\"print(1)\"}\n");
/// ```
pub fn encode_line(msg: &OutboundMessage) -> Result<String, ProtocolError> {
    let mut line = serde_json::to_string(msg).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

/// Decodes one inbound line (with or without its trailing newline).
///
/// Returns `Ok(None)` for a blank line.
///
/// # Errors
///
/// Returns [`ProtocolError`] when the line is not UTF-8, not JSON, not an
/// object, or has an unrecognised `"type"`. Callers drop such lines and keep
/// reading.
///
/// # Examples
///
/// ```rust
/// use gm_core::protocol::{decode_line, InboundMessage};
///
/// let msg = decode_line(br#"{"type":"HELLO","device":"PixelPhone"}"#).unwrap();
/// assert_eq!(
///     msg,
///     Some(InboundMessage::Hello { device: "PixelPhone".into(), platform: "Unknown".into() })
/// );
/// ```
pub fn decode_line(line: &[u8]) -> Result<Option<InboundMessage>, ProtocolError> {
    let text = std::str::from_utf8(line).map_err(|_| ProtocolError::InvalidUtf8)?;
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedJson(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(ProtocolError::NotAnObject);
    };

    let kind = fields.get("type").and_then(Value::as_str).unwrap_or_default();
    let msg = match kind {
        message_type::HELLO => InboundMessage::Hello {
            device: text_field(&fields, "device", UNKNOWN),
            platform: text_field(&fields, "platform", UNKNOWN),
        },
        message_type::LOG => InboundMessage::Log {
            level: text_field(&fields, "level", DEFAULT_LOG_LEVEL),
            message: text_field(&fields, "msg", ""),
        },
        message_type::GM_LIST => InboundMessage::GmList {
            nodes: fields.get("data").map(parse_tree).unwrap_or_default(),
        },
        other => return Err(ProtocolError::UnknownMessageType(other.to_string())),
    };
    Ok(Some(msg))
}

// ── Field helpers ─────────────────────────────────────────────────────────────

/// Strings are taken as-is, `null`/absent uses `default`, anything else is
/// rendered as JSON text.
fn text_field(fields: &Map<String, Value>, key: &str, default: &str) -> String {
    match fields.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => default.to_string(),
        Some(other) => other.to_string(),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
