//! Chat Realtime - WebSocket connection manager for chat channels
//!
//! Keeps one persistent stream per joined chat channel plus one account-wide
//! notification stream, routes inbound frames to caller callbacks and
//! reconnects dropped streams with backoff.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
