//! The compact-block relay protocol for Finch.
//!
//! This crate holds the wire messages and the reconstruction state machine
//! of BIP 152. The peer plumbing that carries these messages lives with the
//! host application; everything here is pure protocol.

pub mod protocol;

pub use protocol::external::message::{
    BlockTxn, CompactBlock, GetBlockTxn, PrefilledTransaction, ShortId,
};
pub use protocol::external::reconstruct::{ReconstructError, Reconstructor};
