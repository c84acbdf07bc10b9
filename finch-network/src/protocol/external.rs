//! The messages and state machines of the external wire protocol.

pub mod message;
pub mod reconstruct;
