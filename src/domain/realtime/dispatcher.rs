//! Frame Dispatcher: inbound payload → exactly one handler, or nothing.
//!
//! Dispatch never fails. Malformed payloads and unrecognized frame classes
//! are dropped and reported in the returned [`Dispatch`] so the caller can
//! log them; they never affect the connection. A handler that panics is
//! contained here and reported the same way.

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::frames::{FrameError, InboundKind, RawFrame};
use super::handlers::{ChannelHandlers, NotificationHandler};

/// What happened to one inbound payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Delivered to the handler of this class.
    Delivered(InboundKind),

    /// Delivered to the notification handler.
    Notified,

    /// Recognized class with no handler slot.
    Reserved(InboundKind),

    /// Well-formed frame of an unknown class.
    Unrecognized(String),

    /// Not a readable frame.
    Malformed(String),

    /// The handler for this frame class panicked; the frame is lost.
    HandlerPanicked { kind: &'static str, message: String },
}

/// Run a caller callback, turning a panic into a message.
fn invoke(callback: impl FnOnce()) -> Result<(), String> {
    catch_unwind(AssertUnwindSafe(callback)).map_err(|panic| {
        panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string())
    })
}

/// Route a chat channel payload to its handler.
pub fn dispatch_channel_frame(handlers: &ChannelHandlers, raw: &str) -> Dispatch {
    let frame = match RawFrame::parse(raw) {
        Ok(frame) => frame,
        Err(e) => return Dispatch::Malformed(e.to_string()),
    };

    let Some(kind) = frame.kind() else {
        return Dispatch::Unrecognized(frame.discriminant);
    };

    let Some(slot) = handlers.slot(kind) else {
        return Dispatch::Reserved(kind);
    };

    let payload = match kind {
        InboundKind::ChatMessage => {
            let mut body = frame.body;
            match body.get_mut("message").map(serde_json::Value::take) {
                Some(message) => message,
                None => {
                    let err = FrameError::MissingField {
                        kind: kind.as_str(),
                        field: "message",
                    };
                    return Dispatch::Malformed(err.to_string());
                }
            }
        }
        _ => frame.body,
    };

    match invoke(|| slot(payload)) {
        Ok(()) => Dispatch::Delivered(kind),
        Err(message) => Dispatch::HandlerPanicked {
            kind: kind.as_str(),
            message,
        },
    }
}

/// Route a notification payload. Any JSON object is delivered whole.
pub fn dispatch_notification_frame(handler: &NotificationHandler, raw: &str) -> Dispatch {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(frame) if frame.is_object() => match invoke(|| handler.call(frame)) {
            Ok(()) => Dispatch::Notified,
            Err(message) => Dispatch::HandlerPanicked {
                kind: "notification",
                message,
            },
        },
        Ok(_) => Dispatch::Malformed("Payload is not a JSON object".to_string()),
        Err(e) => Dispatch::Malformed(e.to_string()),
    }
}
