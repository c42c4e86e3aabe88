//! Realtime module - the connection manager's domain vocabulary.
//!
//! - [`connection`] - lifecycle states and status snapshots
//! - [`backoff`] - reconnect policy
//! - [`endpoint`] - stream URL construction
//! - [`frames`] - inbound and outbound frame vocabulary
//! - [`handlers`] - caller callbacks
//! - [`dispatcher`] - inbound frame routing

pub mod backoff;
pub mod connection;
pub mod dispatcher;
pub mod endpoint;
pub mod frames;
pub mod handlers;

pub use backoff::{Backoff, ReconnectPolicy};
pub use connection::{ConnectionKey, ConnectionState, ConnectionStatus};
pub use dispatcher::{dispatch_channel_frame, dispatch_notification_frame, Dispatch};
pub use endpoint::Endpoint;
pub use frames::{FrameError, InboundKind, OutboundFrame, RawFrame};
pub use handlers::{ChannelHandlers, FrameCallback, NotificationHandler};
