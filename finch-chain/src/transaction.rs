//! Transactions and transaction-related structures.

use crate::compactint::CompactInt;

mod hash;
mod lock_time;
mod serialize;
mod sighash;
mod sign;

#[cfg(any(test, feature = "proptest-impl"))]
mod arbitrary;
#[cfg(test)]
mod tests;

pub use hash::{Hash, WtxHash};
pub use lock_time::LockTime;
pub use serialize::MAX_TX_SIZE;
pub use sighash::{
    SigHash, SigHashCache, SIGHASH_ALL, SIGHASH_ANYONECANPAY, SIGHASH_MASK, SIGHASH_NONE,
    SIGHASH_SINGLE,
};
pub use sign::{SignError, VerifyError};

use crate::transparent;

/// A Bitcoin transaction, in either its legacy or segwit form.
///
/// A transaction is an encoded data structure that facilitates the transfer
/// of value between two public key addresses. Everything is designed to
/// ensure that transactions can be created, propagated on the network,
/// validated, and finally added to the global ledger of transactions (the
/// blockchain).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    /// The transaction version. Versions greater than 1 mean that BIP 68
    /// applies
    pub version: i32,
    /// The transaction Inputs
    pub inputs: Vec<transparent::Input>,
    /// The transaction Outputs
    pub outputs: Vec<transparent::Output>,
    /// The transaction LockTime
    pub locktime: LockTime,
    /// The txid, filled in when the transaction is deserialized; `None` for
    /// transactions built in memory.
    #[serde(skip)]
    hash: Option<Hash>,
    /// The wtxid, filled in alongside the txid.
    #[serde(skip)]
    wtx_hash: Option<WtxHash>,
}

/// Transactions compare by their consensus fields alone.
///
/// Both ids are derived from those fields, so including them would only
/// make a freshly built transaction unequal to its own decoded image.
impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.locktime == other.locktime
    }
}

impl Eq for Transaction {}

impl Transaction {
    pub fn new(
        version: i32,
        inputs: Vec<transparent::Input>,
        outputs: Vec<transparent::Output>,
        locktime: LockTime,
    ) -> Transaction {
        Transaction {
            version,
            inputs,
            outputs,
            locktime,
            hash: None,
            wtx_hash: None,
        }
    }

    /// Get the txid of this transaction: the hash of its legacy encoding,
    /// whether or not any input carries a witness.
    pub fn hash(&self) -> Hash {
        match self.hash {
            // Deserialized transactions already know their id.
            Some(hash) => hash,
            // Otherwise, serialize the tx to calculate the hash.
            None => Hash::from(self),
        }
    }

    /// Get the wtxid of this transaction: the hash of its segwit encoding.
    ///
    /// Equal to the txid when no input has a witness.
    pub fn wtx_hash(&self) -> WtxHash {
        match self.wtx_hash {
            Some(hash) => hash,
            None if self.has_witness() => WtxHash::from(self),
            None => WtxHash(self.hash().0),
        }
    }

    /// Returns `true` if any input carries a non-empty witness, which
    /// selects the segwit encoding.
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }

    /// Returns `true` if this transaction is a coinbase transaction.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].outpoint.is_null()
    }

    /// Returns `true` if any input has the null outpoint reserved for
    /// coinbases.
    pub fn contains_coinbase_input(&self) -> bool {
        self.inputs.iter().any(|input| input.outpoint.is_null())
    }

    /// Returns the serialized length (in bytes) of this transaction,
    /// including any witness data.
    pub fn len(&self) -> usize {
        self.base_size() + self.witness_size()
    }

    /// Returns the serialized length of this transaction without witness
    /// data.
    pub fn base_size(&self) -> usize {
        let mut size = 4 + CompactInt::size(self.inputs.len());
        for input in self.inputs.iter() {
            size += input.len();
        }
        size += CompactInt::size(self.outputs.len());
        for output in self.outputs.iter() {
            size += output.len();
        }
        size + 4
    }

    /// Returns the serialized length of the witness section: the marker and
    /// flag bytes plus every witness stack, or zero for a legacy
    /// transaction.
    pub fn witness_size(&self) -> usize {
        if !self.has_witness() {
            return 0;
        }
        let mut size = 2;
        for input in self.inputs.iter() {
            size += input.witness.serialized_size();
        }
        size
    }

    /// The BIP 141 weight: base bytes count four times, witness bytes once.
    pub fn weight(&self) -> usize {
        4 * self.base_size() + self.witness_size()
    }

    /// The virtual size used for fee rates: the weight rounded up to whole
    /// virtual bytes.
    pub fn vsize(&self) -> usize {
        (self.weight() + 3) / 4
    }

    /// Counts the legacy signature operations in every input and output
    /// script of this transaction.
    pub fn legacy_sigop_count(&self) -> u64 {
        let mut count = 0;
        for input in self.inputs.iter() {
            count += input.unlock_script.sigop_count(false);
        }
        for output in self.outputs.iter() {
            count += output.lock_script.sigop_count(false);
        }
        count
    }
}
