//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the connection manager and the outside world. Adapters implement these
//! ports.
//!
//! - `Transport` / `Link` - opening and writing persistent message streams
//! - `LinkEvents` - how a transport reports stream events back

mod transport;

pub use transport::{Link, LinkEvents, LinkId, Transport, TransportError, TransportEvent};
