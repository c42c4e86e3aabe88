//! Foundation module - Shared domain primitives.
//!
//! Identifiers, validation errors and the state machine trait used by the
//! realtime domain.

mod errors;
mod ids;
mod state_machine;

pub use errors::ValidationError;
pub use ids::ChannelId;
pub use state_machine::StateMachine;
