//! Event frames exchanged over the socket.
//!
//! Every WebSocket text message is a JSON object `{"event": name, "data": payload}`.

use crate::error::{Result, TubetalkError};
use serde::{Deserialize, Serialize};

/// Inbound question event.
pub const SEND_MESSAGE: &str = "send_message";

/// Outbound answer event.
pub const MESSAGE_RESPONSE: &str = "message_response";

/// Outbound failure event.
pub const MESSAGE_ERROR: &str = "message_error";

/// Terminal `response` value closing a streamed answer.
pub const END_SENTINEL: &str = "END";

#[derive(Deserialize)]
struct EventFrame {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Payload of `send_message`. Fields are checked by the handler, not here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SendMessage {
    /// The user's question.
    #[serde(default)]
    pub message: Option<String>,
    /// The video locator.
    #[serde(default)]
    pub url: Option<String>,
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    SendMessage(SendMessage),
    Unknown(String),
}

/// Decode a text frame.
pub fn parse_inbound(text: &str) -> Result<Inbound> {
    let frame: EventFrame = serde_json::from_str(text)?;

    if frame.event != SEND_MESSAGE {
        return Ok(Inbound::Unknown(frame.event));
    }

    let payload = if frame.data.is_null() {
        SendMessage::default()
    } else {
        serde_json::from_value(frame.data).map_err(|e| {
            TubetalkError::InvalidInput(format!("malformed {} payload: {}", SEND_MESSAGE, e))
        })?
    };

    Ok(Inbound::SendMessage(payload))
}

/// An event sent to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    MessageResponse { response: String },
    MessageError { error: String },
}

impl OutboundEvent {
    pub fn response(text: impl Into<String>) -> Self {
        OutboundEvent::MessageResponse {
            response: text.into(),
        }
    }

    pub fn end() -> Self {
        Self::response(END_SENTINEL)
    }

    pub fn error(message: impl Into<String>) -> Self {
        OutboundEvent::MessageError {
            error: message.into(),
        }
    }

    pub fn is_end(&self) -> bool {
        matches!(self, OutboundEvent::MessageResponse { response } if response == END_SENTINEL)
    }

    /// Serialize to the frame text.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_parse_send_message() {
        let frame = json!({
            "event": "send_message",
            "data": { "message": "What is this video about?", "url": "https://youtu.be/abc" }
        })
        .to_string();

        assert_eq!(
            parse_inbound(&frame).unwrap(),
            Inbound::SendMessage(SendMessage {
                message: Some("What is this video about?".to_string()),
                url: Some("https://youtu.be/abc".to_string()),
            })
        );
    }

    #[test]
    fn test_missing_fields_parse_as_none() {
        let frame = json!({ "event": "send_message", "data": { "message": "hi" } }).to_string();
        let Inbound::SendMessage(msg) = parse_inbound(&frame).unwrap() else {
            panic!("expected send_message");
        };
        assert_eq!(msg.url, None);

        let frame = json!({ "event": "send_message" }).to_string();
        assert_eq!(
            parse_inbound(&frame).unwrap(),
            Inbound::SendMessage(SendMessage::default())
        );
    }

    #[test]
    fn test_unknown_and_malformed_frames() {
        let frame = json!({ "event": "typing", "data": {} }).to_string();
        assert_eq!(parse_inbound(&frame).unwrap(), Inbound::Unknown("typing".to_string()));

        assert!(parse_inbound("not json").is_err());
        let frame = json!({ "event": "send_message", "data": 42 }).to_string();
        assert!(matches!(parse_inbound(&frame), Err(TubetalkError::InvalidInput(_))));
    }

    #[test]
    fn test_outbound_frames() {
        let frame: Value = serde_json::from_str(&OutboundEvent::response("tok").to_frame().unwrap()).unwrap();
        assert_eq!(frame, json!({ "event": "message_response", "data": { "response": "tok" } }));
        assert_eq!(frame["event"], MESSAGE_RESPONSE);

        let frame: Value = serde_json::from_str(&OutboundEvent::end().to_frame().unwrap()).unwrap();
        assert_eq!(frame, json!({ "event": "message_response", "data": { "response": "END" } }));

        let frame: Value = serde_json::from_str(&OutboundEvent::error("boom").to_frame().unwrap()).unwrap();
        assert_eq!(frame, json!({ "event": "message_error", "data": { "error": "boom" } }));
        assert_eq!(frame["event"], MESSAGE_ERROR);
    }

    #[test]
    fn test_is_end() {
        assert!(OutboundEvent::end().is_end());
        assert!(!OutboundEvent::response("ENDING").is_end());
        assert!(!OutboundEvent::error("END").is_end());
    }
}
