//! # Gateway Framing
//!
//! The gateway speaks a legacy long-polling-derived framing layered under
//! the WebSocket transport: each text frame is a run of ASCII digits (the
//! packet-type code) followed by an optional JSON payload. Conventional
//! events are a two-element array `["EVENT_NAME", payload]`. The prefix is
//! unrelated to the JSON that follows and must be stripped before parsing,
//! so `JSON.parse`-style decoding of the whole frame cannot work here.

use serde_json::Value;

use super::constants::PONG_FRAME;
use crate::errors::{DbioError, Result};

/// A decoded inbound frame.
#[derive(Debug, PartialEq)]
pub(crate) enum Frame {
    /// The literal liveness reply (`"3"`).
    Pong,
    /// A control frame: packet-type digits with no payload (e.g. `"40"`).
    /// Expected traffic, ignored silently.
    Control,
    /// A conventional `[eventName, eventData]` event.
    Event(String, Value),
    /// Valid JSON that is not a conventional event pair. Ignored.
    Other(Value),
}

/// Parses one inbound text frame.
///
/// Fails with [`DbioError::Protocol`] only when the remainder after the
/// digit prefix is not valid JSON; every other non-event shape is ignored
/// via [`Frame::Control`] / [`Frame::Other`].
pub(crate) fn parse_frame(text: &str) -> Result<Frame> {
    if text == PONG_FRAME {
        return Ok(Frame::Pong);
    }
    let payload = text.trim_start_matches(|c: char| c.is_ascii_digit());
    if payload.is_empty() {
        return Ok(Frame::Control);
    }
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| DbioError::Protocol(format!("invalid JSON in frame: {e}")))?;
    match value {
        Value::Array(mut items) if items.len() == 2 && items[0].is_string() => {
            let data = items.pop().unwrap_or(Value::Null);
            match items.pop() {
                Some(Value::String(name)) => Ok(Frame::Event(name, data)),
                // Unreachable: the guard checked items[0] is a string.
                other => Ok(Frame::Other(other.unwrap_or(Value::Null))),
            }
        }
        other => Ok(Frame::Other(other)),
    }
}

/// Encodes an outbound event frame: packet-type prefix `42` plus the
/// `[eventName, eventData]` JSON array.
pub(crate) fn encode_event(name: &str, data: &Value) -> String {
    format!(
        "{}{}",
        super::constants::OUTBOUND_MESSAGE_CODE,
        Value::Array(vec![Value::String(name.to_string()), data.clone()])
    )
}
