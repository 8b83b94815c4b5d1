//! # State Codec
//!
//! Encodes and decodes the shared state of one object to and from the single
//! replicated string attribute. The wire format is a JSON rendering with
//! percent-style escaping so the payload is safe inside a quoted attribute
//! value. Decoding is fail-soft: malformed input logs a warning and resets
//! the state to the canonical empty object.

use log::warn;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::{RoomError, RoomResult};

/// Arbitrary plain-data state mirrored to and from the network.
pub type StateObject = serde_json::Map<String, serde_json::Value>;

/// Characters that must not appear raw inside an attribute value.
const ATTRIBUTE_UNSAFE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'\'')
    .add(b'<')
    .add(b'>')
    .add(b'&')
    .add(b'%')
    .add(b'\\');

/// Encode a state object into an attribute-safe string.
pub fn encode(state: &StateObject) -> RoomResult<String> {
    let json = serde_json::to_string(state).map_err(RoomError::Encode)?;
    Ok(utf8_percent_encode(&json, ATTRIBUTE_UNSAFE).to_string())
}

/// Decode a replicated string, reporting what went wrong on failure.
///
/// A document that parses but is not a JSON object is also an error: the
/// replication protocol only ever carries objects.
pub fn try_decode(raw: &str) -> RoomResult<StateObject> {
    let json = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|e| RoomError::Decode(e.to_string()))?;
    let value: serde_json::Value =
        serde_json::from_str(&json).map_err(|e| RoomError::Decode(e.to_string()))?;
    match value {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(RoomError::Decode(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Decode a replicated string, falling back to the empty object.
///
/// Callers must treat the empty result as "state reset", never as fatal.
pub fn decode(raw: &str) -> StateObject {
    match try_decode(raw) {
        Ok(state) => state,
        Err(e) => {
            warn!("resetting shared state, undecodable replicated value: {e}");
            StateObject::new()
        }
    }
}
