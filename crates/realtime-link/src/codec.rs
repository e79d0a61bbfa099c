//! Payload codec.
//!
//! Both directions are total: `encode` always produces a frame and `decode`
//! always produces a payload. Structured payloads travel as JSON text;
//! anything that does not parse as JSON is passed through untouched.

use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;

/// Message representation on the wire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WsMessage {
    /// Text message.
    Text(String),
    /// Binary message.
    Binary(Bytes),
}

impl WsMessage {
    /// Create a text message.
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Create a binary message.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::Binary(data.into())
    }

    /// Get as text if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Binary(_) => None,
        }
    }

    /// Size of the frame payload in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An application-level message, opaque to the link.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Structured JSON value.
    Json(Value),
    /// Plain string, sent verbatim.
    Text(String),
    /// Raw bytes, sent as a binary frame.
    Binary(Bytes),
}

impl Payload {
    /// Build a payload from any serializable value.
    ///
    /// If serialization fails the value's `Display` form is used instead, so
    /// building a payload never fails.
    pub fn json<T>(value: &T) -> Self
    where
        T: Serialize + fmt::Display + ?Sized,
    {
        match serde_json::to_value(value) {
            Ok(value) => Self::Json(value),
            Err(err) => {
                tracing::debug!(error = %err, "Payload serialization failed, sending display form");
                Self::Text(value.to_string())
            }
        }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a top-level field of a JSON object payload.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.as_json()?.get(name)
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

impl From<String> for Payload {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Payload {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Bytes> for Payload {
    fn from(data: Bytes) -> Self {
        Self::Binary(data)
    }
}

/// Serialize an outbound payload to its wire frame.
///
/// Strings go out verbatim (no extra quoting); JSON values are rendered as
/// JSON text, falling back to their `Display` form.
pub fn encode(payload: &Payload) -> WsMessage {
    match payload {
        Payload::Text(s) => WsMessage::Text(s.clone()),
        Payload::Json(value) => {
            WsMessage::Text(serde_json::to_string(value).unwrap_or_else(|_| value.to_string()))
        }
        Payload::Binary(data) => WsMessage::Binary(data.clone()),
    }
}

/// Deserialize an inbound wire frame.
///
/// Text that parses as JSON becomes [`Payload::Json`]; any other text is
/// delivered as [`Payload::Text`] unchanged. Binary frames pass through.
pub fn decode(message: WsMessage) -> Payload {
    match message {
        WsMessage::Text(text) => match serde_json::from_str::<Value>(&text) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Text(text),
        },
        WsMessage::Binary(data) => Payload::Binary(data),
    }
}

#[cfg(test)]
mod tests {
    use serde::ser::Error as _;
    use serde_json::json;

    use super::*;

    #[test]
    fn encode_json_object() {
        let frame = encode(&Payload::Json(json!({"type": "subscribe", "canvasId": "1"})));
        let text = frame.as_text().expect("text frame");
        let back: Value = serde_json::from_str(text).expect("valid json");
        assert_eq!(back, json!({"type": "subscribe", "canvasId": "1"}));
    }

    #[test]
    fn encode_text_is_verbatim() {
        assert_eq!(
            encode(&Payload::text("hello")),
            WsMessage::text("hello")
        );
        // Not re-quoted as a JSON string.
        assert_eq!(encode(&Payload::text("\"x\"")), WsMessage::text("\"x\""));
    }

    #[test]
    fn decode_json_text() {
        let payload = decode(WsMessage::text(r#"{"fileId":"7","fileName":"spec.pdf"}"#));
        assert_eq!(payload.field("fileId"), Some(&json!("7")));
        assert_eq!(payload.field("fileName"), Some(&json!("spec.pdf")));
    }

    #[test]
    fn decode_scalar_json() {
        assert_eq!(decode(WsMessage::text("42")), Payload::Json(json!(42)));
    }

    #[test]
    fn decode_falls_back_to_raw_text() {
        assert_eq!(
            decode(WsMessage::text("not json {")),
            Payload::Text("not json {".to_string())
        );
        assert_eq!(decode(WsMessage::text("")), Payload::Text(String::new()));
    }

    #[test]
    fn decode_binary_passes_through() {
        let data = Bytes::from_static(&[0xff, 0x00, 0x01]);
        assert_eq!(
            decode(WsMessage::Binary(data.clone())),
            Payload::Binary(data)
        );
    }

    struct Unserializable;

    impl Serialize for Unserializable {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("refused"))
        }
    }

    impl fmt::Display for Unserializable {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("unserializable")
        }
    }

    #[test]
    fn payload_json_falls_back_to_display() {
        assert_eq!(
            Payload::json(&Unserializable),
            Payload::Text("unserializable".to_string())
        );
        assert_eq!(Payload::json(&5), Payload::Json(json!(5)));
    }
}
