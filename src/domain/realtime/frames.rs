//! Frame vocabulary of the chat server's streams.
//!
//! Every frame is a JSON object tagged by a `type` discriminant.
//! - Server → Client: chat messages, presence, typing, read receipts
//! - Client → Server: chat messages, typing start/stop, read receipts

use serde::Serialize;
use serde_json::Value;

// ============================================
// Server → Client Frames
// ============================================

/// Inbound frame classes this client understands.
///
/// Anything the server sends with another `type` is unrecognized and dropped,
/// so new server-side frame types never break older clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InboundKind {
    /// A chat message; only its `message` field is handed on.
    ChatMessage,
    /// Someone joined the channel.
    UserJoined,
    /// Someone left the channel.
    UserLeft,
    /// Someone started or stopped typing.
    UserTyping,
    /// Read receipt. Reserved: recognized but not routed to a handler.
    MessageRead,
}

impl InboundKind {
    /// Every recognized class.
    pub const ALL: [InboundKind; 5] = [
        InboundKind::ChatMessage,
        InboundKind::UserJoined,
        InboundKind::UserLeft,
        InboundKind::UserTyping,
        InboundKind::MessageRead,
    ];

    /// Classify a `type` discriminant.
    pub fn from_discriminant(discriminant: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == discriminant)
    }

    /// Wire name of the class.
    pub fn as_str(&self) -> &'static str {
        match self {
            InboundKind::ChatMessage => "chat_message",
            InboundKind::UserJoined => "user_joined",
            InboundKind::UserLeft => "user_left",
            InboundKind::UserTyping => "user_typing",
            InboundKind::MessageRead => "message_read",
        }
    }
}

/// Why an inbound payload could not be read as a frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Payload is not a JSON object")]
    NotAnObject,

    #[error("Frame has no string 'type' field")]
    MissingType,

    #[error("'{kind}' frame is missing field '{field}'")]
    MissingField {
        kind: &'static str,
        field: &'static str,
    },
}

/// A parsed inbound frame: its discriminant and the full JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub discriminant: String,
    pub body: Value,
}

impl RawFrame {
    /// Parse a text payload into a tagged frame.
    pub fn parse(raw: &str) -> Result<Self, FrameError> {
        let body: Value = serde_json::from_str(raw)?;
        let discriminant = body
            .as_object()
            .ok_or(FrameError::NotAnObject)?
            .get("type")
            .and_then(Value::as_str)
            .ok_or(FrameError::MissingType)?
            .to_string();
        Ok(Self { discriminant, body })
    }

    /// The recognized class, if any.
    pub fn kind(&self) -> Option<InboundKind> {
        InboundKind::from_discriminant(&self.discriminant)
    }
}

// ============================================
// Client → Server Frames
// ============================================

/// All frames this client sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    /// Post a chat message to the channel.
    ChatMessage { message: String },

    /// The local user started typing.
    TypingStart,

    /// The local user stopped typing.
    TypingStop,

    /// The local user read a channel message.
    MessageRead { message_id: String },

    /// Mark a notification as read (notification stream only).
    MarkRead { notification_id: String },
}

impl OutboundFrame {
    /// Serialize for the wire.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Wire name of the frame, for logging.
    pub fn type_name(&self) -> &'static str {
        match self {
            OutboundFrame::ChatMessage { .. } => "chat_message",
            OutboundFrame::TypingStart => "typing_start",
            OutboundFrame::TypingStop => "typing_stop",
            OutboundFrame::MessageRead { .. } => "message_read",
            OutboundFrame::MarkRead { .. } => "mark_read",
        }
    }
}
