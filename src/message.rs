//! Frame-level message types.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Kind of a WebSocket frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// UTF-8 text frame
    Text,
    /// Binary frame
    Binary,
    /// Ping control frame
    Ping,
    /// Pong control frame
    Pong,
    /// Close control frame
    Close,
}

/// A single WebSocket message: an opaque payload plus its kind.
///
/// The sender's identity for inbound messages travels alongside the
/// message through the dispatch path rather than inside the frame.
#[derive(Debug, Clone)]
pub struct Message {
    /// The frame kind
    pub kind: MessageKind,
    /// The frame payload
    pub payload: Bytes,
}

impl Message {
    /// Create a text message.
    pub fn text<S: Into<String>>(text: S) -> Self {
        Self {
            kind: MessageKind::Text,
            payload: Bytes::from(text.into()),
        }
    }

    /// Create a binary message.
    pub fn binary<B: Into<Bytes>>(data: B) -> Self {
        Self {
            kind: MessageKind::Binary,
            payload: data.into(),
        }
    }

    /// Create a ping message.
    pub fn ping<B: Into<Bytes>>(data: B) -> Self {
        Self {
            kind: MessageKind::Ping,
            payload: data.into(),
        }
    }

    /// Create a pong message.
    pub fn pong<B: Into<Bytes>>(data: B) -> Self {
        Self {
            kind: MessageKind::Pong,
            payload: data.into(),
        }
    }

    /// Create a close message.
    pub fn close() -> Self {
        Self {
            kind: MessageKind::Close,
            payload: Bytes::new(),
        }
    }

    /// Create a text message from a serializable value.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::text(serde_json::to_string(value)?))
    }

    /// Parse the payload as JSON.
    pub fn parse_json<'a, T: Deserialize<'a>>(&'a self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    /// The payload as a string, for text messages.
    pub fn as_text(&self) -> Option<&str> {
        if self.kind == MessageKind::Text {
            std::str::from_utf8(&self.payload).ok()
        } else {
            None
        }
    }

    /// The raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    /// Whether this is a text message.
    pub fn is_text(&self) -> bool {
        self.kind == MessageKind::Text
    }

    /// Whether this is a binary message.
    pub fn is_binary(&self) -> bool {
        self.kind == MessageKind::Binary
    }

    /// Whether this is a ping frame.
    pub fn is_ping(&self) -> bool {
        self.kind == MessageKind::Ping
    }

    /// Whether this is a pong frame.
    pub fn is_pong(&self) -> bool {
        self.kind == MessageKind::Pong
    }

    /// Whether this is a close frame.
    pub fn is_close(&self) -> bool {
        self.kind == MessageKind::Close
    }
}

impl From<tungstenite::Message> for Message {
    fn from(raw: tungstenite::Message) -> Self {
        match raw {
            tungstenite::Message::Text(text) => Self::text(text.to_string()),
            tungstenite::Message::Binary(data) => Self::binary(data),
            tungstenite::Message::Ping(data) => Self::ping(data),
            tungstenite::Message::Pong(data) => Self::pong(data),
            tungstenite::Message::Close(_) => Self::close(),
            // Raw frames never surface from a read with default settings.
            tungstenite::Message::Frame(_) => Self::binary(Bytes::new()),
        }
    }
}

impl From<Message> for tungstenite::Message {
    fn from(message: Message) -> Self {
        match message.kind {
            MessageKind::Text => tungstenite::Message::Text(
                String::from_utf8_lossy(&message.payload).into_owned().into(),
            ),
            MessageKind::Binary => tungstenite::Message::Binary(message.payload),
            MessageKind::Ping => tungstenite::Message::Ping(message.payload),
            MessageKind::Pong => tungstenite::Message::Pong(message.payload),
            MessageKind::Close => tungstenite::Message::Close(None),
        }
    }
}
