//! WebSocket transport built on tokio-tungstenite.
//!
//! Each link is one spawned task that owns the socket. The manager writes
//! through an unbounded queue and hears back through [`LinkEvents`].
//!
//! ```text
//! WebSocketLink ──Outgoing──► run_link task ──► socket
//!                                   │
//!                                   └──► LinkEvents (opened / message / error / closed)
//! ```

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::protocol::{frame::coding::CloseCode, CloseFrame};
use tokio_tungstenite::tungstenite::Message;

use crate::ports::{Link, LinkEvents, Transport, TransportError};

/// How long a link may take to complete the opening handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens real WebSocket streams (`ws://` and `wss://`).
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    connect_timeout: Duration,
}

impl WebSocketTransport {
    pub fn new(connect_timeout: Duration) -> Self {
        // Fails when a provider is already installed, which is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl Transport for WebSocketTransport {
    fn connect(&self, url: &str, events: LinkEvents) -> Box<dyn Link> {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_link(
            url.to_string(),
            events,
            outbound_rx,
            self.connect_timeout,
        ));
        Box::new(WebSocketLink {
            outbound: outbound_tx,
            closed: false,
        })
    }
}

/// Instructions from the manager to a link task.
#[derive(Debug)]
enum Outgoing {
    Text(String),
    Close,
}

/// Write half handed to the manager.
struct WebSocketLink {
    outbound: mpsc::UnboundedSender<Outgoing>,
    closed: bool,
}

impl Link for WebSocketLink {
    fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::LinkClosed);
        }
        self.outbound
            .send(Outgoing::Text(text))
            .map_err(|_| TransportError::LinkClosed)
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            let _ = self.outbound.send(Outgoing::Close);
        }
    }
}

impl Drop for WebSocketLink {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_link(
    url: String,
    events: LinkEvents,
    mut outbound: mpsc::UnboundedReceiver<Outgoing>,
    connect_timeout: Duration,
) {
    let link = events.link_id();
    tracing::debug!(%link, url = %url, "Opening WebSocket");

    let connect = tokio::time::timeout(connect_timeout, connect_async(url.as_str()));
    let ws_stream = tokio::select! {
        result = connect => match result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                events.error(format!("connect failed: {e}"));
                events.closed(None, "connect failed");
                return;
            }
            Err(_) => {
                events.error(format!(
                    "connect timed out after {}s",
                    connect_timeout.as_secs()
                ));
                events.closed(None, "connect timed out");
                return;
            }
        },
        // Closed (or dropped) before the handshake finished.
        _ = outbound.recv() => {
            events.closed(None, "closed before open");
            return;
        }
    };

    events.opened();
    let (mut sink, mut stream) = ws_stream.split();

    let (code, reason) = loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outgoing::Text(text)) => {
                    if let Err(e) = sink.send(Message::text(text)).await {
                        events.error(format!("send failed: {e}"));
                        break (None, "send failed".to_string());
                    }
                }
                Some(Outgoing::Close) | None => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "closed by client".into(),
                    };
                    let _ = sink.send(Message::Close(Some(frame))).await;
                    break (Some(1000), "closed by client".to_string());
                }
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => events.message(text.as_str()),
                Some(Ok(Message::Binary(data))) => {
                    tracing::warn!(%link, bytes = data.len(), "Ignoring binary frame");
                }
                Some(Ok(Message::Close(frame))) => {
                    break match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.as_str().to_string()),
                        None => (None, String::new()),
                    };
                }
                // Ping/pong is answered by tungstenite.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    events.error(e.to_string());
                    break (None, "stream error".to_string());
                }
                None => break (None, "stream ended".to_string()),
            },
        }
    };

    tracing::debug!(%link, ?code, reason = %reason, "WebSocket closed");
    events.closed(code, reason);
}
