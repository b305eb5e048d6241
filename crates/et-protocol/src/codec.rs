//! JSON codec for protocol messages
//!
//! Each message is one JSON object carried in one transport frame. This
//! module only converts between a frame's text and a [`Message`].

use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ProtocolError;
use crate::message::{Message, MessageType, TerminalSize};

/// Maximum accepted frame size in bytes
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Frame as it arrives on the wire
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Option<Value>,
}

/// Encode a message into a frame
pub fn encode(message: &Message) -> String {
    let kind = message.message_type().as_str();
    let frame = match message {
        Message::Connected { banner: None } | Message::Disconnected { reason: None } => {
            json!({ "type": kind })
        }
        Message::Connected { banner: Some(text) }
        | Message::Disconnected { reason: Some(text) }
        | Message::Output(text)
        | Message::Input(text)
        | Message::Error { message: text } => json!({ "type": kind, "data": text }),
        Message::Resize(size) => json!({ "type": kind, "data": size }),
    };
    frame.to_string()
}

/// Decode a text frame into a message
pub fn decode(text: &str) -> Result<Message, ProtocolError> {
    if text.len() > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: text.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let frame: RawFrame = serde_json::from_str(text)?;
    let kind = MessageType::from_tag(&frame.kind)
        .ok_or_else(|| ProtocolError::UnknownMessageType(frame.kind.clone()))?;

    let message = match kind {
        MessageType::Connected => Message::Connected {
            banner: optional_text(kind, frame.data)?,
        },
        MessageType::Output => Message::Output(required_text(kind, frame.data)?),
        MessageType::Input => Message::Input(required_text(kind, frame.data)?),
        MessageType::Error => Message::Error {
            message: optional_text(kind, frame.data)?.unwrap_or_default(),
        },
        MessageType::Disconnected => Message::Disconnected {
            reason: optional_text(kind, frame.data)?,
        },
        MessageType::Resize => {
            let data = frame.data.ok_or(ProtocolError::MissingPayload(kind.as_str()))?;
            let size: TerminalSize =
                serde_json::from_value(data).map_err(|_| ProtocolError::InvalidPayload {
                    kind: kind.as_str(),
                    expected: "{rows, cols}",
                })?;
            Message::Resize(size)
        }
    };

    Ok(message)
}

/// Decode a binary frame carrying UTF-8 JSON
pub fn decode_bytes(bytes: &[u8]) -> Result<Message, ProtocolError> {
    let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
    decode(text)
}

fn required_text(kind: MessageType, data: Option<Value>) -> Result<String, ProtocolError> {
    match data {
        Some(Value::String(text)) => Ok(text),
        None | Some(Value::Null) => Err(ProtocolError::MissingPayload(kind.as_str())),
        Some(_) => Err(ProtocolError::InvalidPayload {
            kind: kind.as_str(),
            expected: "string",
        }),
    }
}

/// Optional payloads treat an empty string like an absent one
fn optional_text(kind: MessageType, data: Option<Value>) -> Result<Option<String>, ProtocolError> {
    match data {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.is_empty() => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(_) => Err(ProtocolError::InvalidPayload {
            kind: kind.as_str(),
            expected: "string",
        }),
    }
}
