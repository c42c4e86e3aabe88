//! Domain layer containing connection rules and domain types.
//!
//! # Module Organization
//!
//! - `foundation` - Shared domain primitives (IDs, errors, state machine trait)
//! - `realtime` - Connection lifecycle, reconnect policy, frames and dispatch

pub mod foundation;
pub mod realtime;
