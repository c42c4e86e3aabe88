//! Application layer - the connection manager.
//!
//! Coordinates the realtime domain with the transport port:
//! - `registry` - Connection Registry (channel map + notification slot)
//! - `lifecycle` - per-connection lifecycle controller and reconnect decisions
//! - `manager` - the actor task and its public `RealtimeManager` handle
//! - `handle` - caller-side status view of one connection

mod handle;
mod lifecycle;
mod manager;
mod registry;

pub use handle::ConnectionHandle;
pub use manager::{ManagerConfig, ManagerError, RealtimeManager};
