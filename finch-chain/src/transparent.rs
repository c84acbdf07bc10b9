//! Transaction inputs, outputs, and the unspent-output model.

mod coin;
mod compress;
mod script;
mod serialize;

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;

pub use coin::{Coin, CoinView, ViewError};
pub use script::{hash160, Script, VerificationFlags, MAX_SCRIPT_SIZE};

use crate::{compactint::CompactInt, transaction};

/// The sequence number that disables locktime for an input.
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// The output index used in the null outpoint of a coinbase input.
const NULL_INDEX: u32 = 0xffff_ffff;

/// OutPoint
///
/// A particular transaction output reference.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct OutPoint {
    /// References the transaction that contains the UTXO being spent.
    pub hash: transaction::Hash,

    /// Identifies which UTXO from that transaction is referenced; the
    /// first output is 0, etc.
    pub index: u32,
}

impl OutPoint {
    #[inline]
    pub const fn len() -> usize {
        36
    }

    /// Returns the null outpoint used by coinbase inputs.
    pub fn null() -> OutPoint {
        OutPoint {
            hash: transaction::Hash([0; 32]),
            index: NULL_INDEX,
        }
    }

    /// Returns `true` if this is the null outpoint of a coinbase input.
    pub fn is_null(&self) -> bool {
        self.hash.0 == [0; 32] && self.index == NULL_INDEX
    }
}

/// The per-input witness: a stack of byte strings consumed by segwit script
/// evaluation.
///
/// Legacy inputs carry an empty witness, which is never serialized.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct Witness(pub Vec<Vec<u8>>);

impl Witness {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the serialized length (in bytes) of this witness stack.
    pub fn serialized_size(&self) -> usize {
        let mut size = CompactInt::size(self.0.len());
        for item in self.0.iter() {
            size += CompactInt::size(item.len()) + item.len();
        }
        size
    }
}

/// A transparent input to a transaction.
///
/// A coinbase input is represented with the null outpoint; its
/// `unlock_script` then carries the arbitrary coinbase data instead of a
/// spending script.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Input {
    /// The previous output transaction reference.
    pub outpoint: OutPoint,
    /// The script that authorizes spending `outpoint`.
    pub unlock_script: Script,
    /// The sequence number for the input.
    pub sequence: u32,
    /// The segwit witness stack; empty for legacy inputs.
    pub witness: Witness,
}

impl Input {
    /// Returns the serialized length (in bytes) of this input, excluding its
    /// witness.
    pub fn len(&self) -> usize {
        OutPoint::len() + self.unlock_script.serialized_size() + 4
    }

    /// Returns `true` if this input opts in to replace-by-fee.
    pub fn signals_rbf(&self) -> bool {
        self.sequence < SEQUENCE_FINAL - 1
    }
}

/// A transparent output from a transaction.
///
/// The most fundamental building block of a transaction is a transaction
/// output -- the BTC you own in your "wallet" is in fact a subset of unspent
/// transaction outputs (or "UTXO"s) of the global UTXO set.
///
/// UTXOs are indivisible, discrete units of value which can only be consumed
/// in their entirety.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct Output {
    /// Transaction value, in satoshis.
    ///
    /// This is a raw wire value: the `0..=MAX_MONEY` invariant is enforced by
    /// the consensus checks, not the type, because those checks must be able
    /// to observe (and reject) out-of-range values.
    pub value: i64,

    /// The lock script defines the conditions under which this output can be
    /// spent.
    pub lock_script: Script,
}

impl Output {
    /// Returns the serialized length (in bytes) of this Output
    pub fn len(&self) -> usize {
        8 + self.lock_script.serialized_size()
    }
}
