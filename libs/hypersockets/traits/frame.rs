use crate::traits::error::{HyperSocketError, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{Map, Value};

/// A single frame exchanged over a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    Text(String),
    Binary(Vec<u8>),
}

impl WsMessage {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(text) => Some(text),
            WsMessage::Binary(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, WsMessage::Text(_))
    }

    /// Serialize a value into a text frame
    pub fn json<T: Serialize>(value: &T) -> Result<Self> {
        serde_json::to_string(value)
            .map(WsMessage::Text)
            .map_err(|e| HyperSocketError::Codec(e.to_string()))
    }

    /// Decode the frame body as JSON (binary frames are read as UTF-8 JSON too)
    pub fn parse_json<T: DeserializeOwned>(&self) -> Result<T> {
        let parsed = match self {
            WsMessage::Text(text) => serde_json::from_str(text),
            WsMessage::Binary(bytes) => serde_json::from_slice(bytes),
        };
        parsed.map_err(|e| HyperSocketError::Codec(e.to_string()))
    }

    /// The `type` field of a JSON control frame, if the frame is one
    pub fn frame_type(&self) -> Option<String> {
        let value: Value = self.parse_json().ok()?;
        value.get("type")?.as_str().map(str::to_string)
    }
}

/// Build a named control frame: `{"type": kind, ...fields}`
///
/// Non-object bodies are ignored and produce a frame with only the `type` field.
pub fn control_frame(kind: &str, body: Value) -> WsMessage {
    let mut fields = Map::new();
    fields.insert("type".to_string(), Value::String(kind.to_string()));
    if let Value::Object(extra) = body {
        for (key, value) in extra {
            if key != "type" {
                fields.insert(key, value);
            }
        }
    }
    WsMessage::Text(Value::Object(fields).to_string())
}
