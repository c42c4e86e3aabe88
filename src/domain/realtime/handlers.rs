//! Caller-supplied callbacks bound to a connection.
//!
//! A handler set is fixed when the connection is requested and reused on
//! every reconnect; callers never re-register after a drop.
//!
//! Callbacks run on the manager's task and must not block. Hand heavy work
//! to a channel or a spawned task.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::frames::InboundKind;

/// A frame callback.
pub type FrameCallback = Arc<dyn Fn(Value) + Send + Sync>;

fn noop() -> FrameCallback {
    Arc::new(|_: Value| {})
}

/// The four callbacks of a chat channel.
///
/// # Example
///
/// ```ignore
/// let handlers = ChannelHandlers::new()
///     .on_message(|message| println!("{message}"))
///     .on_typing(|frame| println!("typing: {}", frame["username"]));
/// ```
#[derive(Clone)]
pub struct ChannelHandlers {
    message: FrameCallback,
    user_joined: FrameCallback,
    user_left: FrameCallback,
    typing: FrameCallback,
}

impl ChannelHandlers {
    /// A handler set whose slots all ignore their frames.
    pub fn new() -> Self {
        Self {
            message: noop(),
            user_joined: noop(),
            user_left: noop(),
            typing: noop(),
        }
    }

    /// Receives the `message` field of `chat_message` frames.
    pub fn on_message(mut self, f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.message = Arc::new(f);
        self
    }

    /// Receives full `user_joined` frames.
    pub fn on_user_joined(mut self, f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.user_joined = Arc::new(f);
        self
    }

    /// Receives full `user_left` frames.
    pub fn on_user_left(mut self, f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.user_left = Arc::new(f);
        self
    }

    /// Receives full `user_typing` frames.
    pub fn on_typing(mut self, f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.typing = Arc::new(f);
        self
    }

    /// Routing table from frame class to handler slot.
    ///
    /// `None` for classes that are recognized but not routed.
    pub fn slot(&self, kind: InboundKind) -> Option<&FrameCallback> {
        match kind {
            InboundKind::ChatMessage => Some(&self.message),
            InboundKind::UserJoined => Some(&self.user_joined),
            InboundKind::UserLeft => Some(&self.user_left),
            InboundKind::UserTyping => Some(&self.typing),
            InboundKind::MessageRead => None,
        }
    }
}

impl Default for ChannelHandlers {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChannelHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandlers").finish_non_exhaustive()
    }
}

/// The single callback of the notification stream.
#[derive(Clone)]
pub struct NotificationHandler(FrameCallback);

impl NotificationHandler {
    pub fn new(f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub(crate) fn call(&self, frame: Value) {
        (self.0)(frame)
    }
}

impl fmt::Debug for NotificationHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationHandler").finish_non_exhaustive()
    }
}
