//! Transport port - Interface for opening persistent message streams.
//!
//! The manager never touches sockets. It asks a [`Transport`] to open a
//! stream and gets back a [`Link`] it can write to and close. Everything
//! the stream does afterwards (ready, frame received, error, closed) is
//! reported through the [`LinkEvents`] sink the manager handed over, tagged
//! with the link's [`LinkId`] so reports from a replaced or closed link can
//! be recognized and ignored.
//!
//! ## Event sequence of one link
//!
//! ```text
//! connect() ──► [Opened] ──► Message* ──► [Error] ──► Closed
//!          └──────────────────────────► [Error] ──► Closed   (never opened)
//! ```
//!
//! `Closed` is reported exactly once per link, also after the manager called
//! [`Link::close`]. An `Error` is always followed by a `Closed`.

use std::fmt;
use std::sync::Arc;

/// Identifies one stream open attempt. Never reused by a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(u64);

impl LinkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link-{}", self.0)
    }
}

/// Something that happened on a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The stream is established and accepts frames.
    Opened,

    /// A text payload arrived.
    Message(String),

    /// A transport-level failure. A `Closed` follows.
    Error(String),

    /// The stream is gone.
    Closed {
        code: Option<u16>,
        reason: String,
    },
}

/// Errors that can occur when writing to a link.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The link's writer has already shut down.
    #[error("Link is closed")]
    LinkClosed,

    /// The transport refused the payload.
    #[error("Send failed: {0}")]
    Send(String),
}

type EventSink = Arc<dyn Fn(LinkId, TransportEvent) + Send + Sync>;

/// Reporting handle a transport uses to tell the manager about one link.
#[derive(Clone)]
pub struct LinkEvents {
    link: LinkId,
    sink: EventSink,
}

impl LinkEvents {
    /// Wrap a sink for the given link.
    pub fn new(link: LinkId, sink: impl Fn(LinkId, TransportEvent) + Send + Sync + 'static) -> Self {
        Self {
            link,
            sink: Arc::new(sink),
        }
    }

    pub fn link_id(&self) -> LinkId {
        self.link
    }

    pub fn emit(&self, event: TransportEvent) {
        (self.sink)(self.link, event)
    }

    pub fn opened(&self) {
        self.emit(TransportEvent::Opened)
    }

    pub fn message(&self, text: impl Into<String>) {
        self.emit(TransportEvent::Message(text.into()))
    }

    pub fn error(&self, error: impl Into<String>) {
        self.emit(TransportEvent::Error(error.into()))
    }

    pub fn closed(&self, code: Option<u16>, reason: impl Into<String>) {
        self.emit(TransportEvent::Closed {
            code,
            reason: reason.into(),
        })
    }
}

impl fmt::Debug for LinkEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkEvents")
            .field("link", &self.link)
            .finish_non_exhaustive()
    }
}

/// Write side of an open (or opening) stream.
pub trait Link: Send {
    /// Queue a text frame. Never blocks.
    fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Ask the stream to shut down. Idempotent.
    fn close(&mut self);
}

/// Port for opening streams.
///
/// Implementations must return immediately; establishment happens in the
/// background and is reported through `events`.
///
/// # Example
///
/// ```ignore
/// let events = LinkEvents::new(link_id, move |link, event| inbox.send((link, event)));
/// let mut link = transport.connect("wss://chat.example.com/ws/chat/general/", events);
/// // later, once Opened was reported:
/// link.send_text(r#"{"type":"typing_start"}"#.to_string())?;
/// ```
pub trait Transport: Send + Sync {
    fn connect(&self, url: &str, events: LinkEvents) -> Box<dyn Link>;
}
