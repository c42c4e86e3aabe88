//! Transport adapters - implementations of the `Transport` port.
//!
//! - `WebSocketTransport` - real WebSocket streams via tokio-tungstenite
//! - `MockTransport` - scripted links for tests

mod mock_transport;
mod websocket;

pub use mock_transport::{MockLinkController, MockTransport};
pub use websocket::{WebSocketTransport, DEFAULT_CONNECT_TIMEOUT};
