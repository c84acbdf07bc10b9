//! Consensus checks for Finch.
//!
//! The chain database stores whatever it is given; the functions in this
//! crate decide what deserves to be given to it. Checks return structured
//! errors carrying the protocol reject reason and a peer misbehavior score,
//! so the network layer can punish peers that relay garbage.

pub mod block;
pub mod error;
pub mod parameters;
pub mod transaction;

pub use error::{BlockError, TransactionError};
