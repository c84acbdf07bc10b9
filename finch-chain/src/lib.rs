//! Core Bitcoin data structures and consensus serialization for Finch.
//!
//! This crate holds the types every other Finch crate builds on: blocks,
//! transactions (legacy and segwit), scripts, coins and the UTXO view, and
//! the consensus wire encodings for all of them.

#![allow(clippy::unit_arg)]

#[macro_use]
extern crate serde;

pub mod amount;
pub mod block;
pub mod compactint;
pub mod parameters;
pub mod serialization;
pub mod transaction;
pub mod transparent;
pub mod work;

pub use serialization::{
    BitcoinDeserialize, BitcoinDeserializeInto, BitcoinSerialize, SerializationError,
};

use crate::parameters::Network;

/// Chain context for generating arbitrary ledger data in tests.
#[derive(Clone, Copy, Debug)]
pub struct LedgerState {
    /// The height of the current chain tip.
    pub tip_height: block::Height,
    /// Whether the next generated transaction should be a coinbase.
    pub is_coinbase: bool,
    /// The network the generated chain belongs to.
    pub network: Network,
}

impl Default for LedgerState {
    fn default() -> Self {
        LedgerState {
            tip_height: block::Height(0),
            is_coinbase: true,
            network: Network::Mainnet,
        }
    }
}
