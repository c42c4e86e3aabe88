//! Mock transport for testing.
//!
//! Records every connect and hands tests a [`MockLinkController`] per link to
//! script what the "server" does: accept, push frames, fail, drop.
//!
//! # Example
//!
//! ```ignore
//! let transport = MockTransport::new();
//! let manager = RealtimeManager::start(config, Arc::new(transport.clone()));
//! manager.open_channel(channel, handlers).await?;
//!
//! let link = transport.last_link().unwrap();
//! link.open();
//! link.deliver(r#"{"type":"user_joined","username":"ada"}"#);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::ports::{Link, LinkEvents, LinkId, Transport, TransportError};

#[derive(Debug, Default)]
struct LinkRecord {
    url: String,
    sent: Vec<String>,
    closed_by_client: bool,
}

#[derive(Debug)]
struct LinkEntry {
    events: LinkEvents,
    record: Arc<Mutex<LinkRecord>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transport whose links are driven by the test.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    links: Arc<Mutex<Vec<LinkEntry>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `connect` calls so far.
    pub fn connect_count(&self) -> usize {
        lock(&self.links).len()
    }

    /// URL of every `connect` call, in order.
    pub fn urls(&self) -> Vec<String> {
        lock(&self.links)
            .iter()
            .map(|entry| lock(&entry.record).url.clone())
            .collect()
    }

    /// Controller for the `index`-th link (0-based, in connect order).
    pub fn link(&self, index: usize) -> Option<MockLinkController> {
        lock(&self.links).get(index).map(MockLinkController::from_entry)
    }

    /// Controller for the most recent link.
    pub fn last_link(&self) -> Option<MockLinkController> {
        lock(&self.links).last().map(MockLinkController::from_entry)
    }

    /// Controllers of every link opened for `url`.
    pub fn links_for(&self, url: &str) -> Vec<MockLinkController> {
        lock(&self.links)
            .iter()
            .filter(|entry| lock(&entry.record).url == url)
            .map(MockLinkController::from_entry)
            .collect()
    }
}

impl Transport for MockTransport {
    fn connect(&self, url: &str, events: LinkEvents) -> Box<dyn Link> {
        let record = Arc::new(Mutex::new(LinkRecord {
            url: url.to_string(),
            ..LinkRecord::default()
        }));
        lock(&self.links).push(LinkEntry {
            events,
            record: record.clone(),
        });
        Box::new(MockLink { record })
    }
}

/// Write half given to the manager. Records instead of transmitting.
struct MockLink {
    record: Arc<Mutex<LinkRecord>>,
}

impl Link for MockLink {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let mut record = lock(&self.record);
        if record.closed_by_client {
            return Err(TransportError::LinkClosed);
        }
        record.sent.push(text);
        Ok(())
    }

    fn close(&mut self) {
        lock(&self.record).closed_by_client = true;
    }
}

/// Test-side handle on one link.
#[derive(Debug, Clone)]
pub struct MockLinkController {
    events: LinkEvents,
    record: Arc<Mutex<LinkRecord>>,
}

impl MockLinkController {
    fn from_entry(entry: &LinkEntry) -> Self {
        Self {
            events: entry.events.clone(),
            record: entry.record.clone(),
        }
    }

    pub fn id(&self) -> LinkId {
        self.events.link_id()
    }

    pub fn url(&self) -> String {
        lock(&self.record).url.clone()
    }

    /// Complete the handshake.
    pub fn open(&self) {
        self.events.opened();
    }

    /// Push a text frame from the server.
    pub fn deliver(&self, text: impl Into<String>) {
        self.events.message(text);
    }

    /// Report a transport error without closing.
    pub fn error(&self, error: impl Into<String>) {
        self.events.error(error);
    }

    /// Report a transport error followed by an abnormal close.
    pub fn fail(&self, error: impl Into<String>) {
        self.events.error(error);
        self.events.closed(Some(1006), "abnormal closure");
    }

    /// Server-side drop without an error report.
    pub fn drop_connection(&self) {
        self.events.closed(Some(1006), "connection dropped");
    }

    /// Report an arbitrary event, e.g. a duplicate close.
    pub fn closed(&self, code: Option<u16>, reason: &str) {
        self.events.closed(code, reason);
    }

    /// Frames the manager wrote, in order.
    pub fn sent_frames(&self) -> Vec<String> {
        lock(&self.record).sent.clone()
    }

    /// Frames the manager wrote, parsed as JSON.
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent_frames()
            .iter()
            .filter_map(|text| serde_json::from_str(text).ok())
            .collect()
    }

    pub fn was_closed_by_client(&self) -> bool {
        lock(&self.record).closed_by_client
    }
}
