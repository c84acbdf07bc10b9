//! The legacy and segwit transaction encodings.
//!
//! Segwit (BIP 144) inserts a zero marker byte and a flag byte after the
//! version, then appends one witness stack per input between the outputs and
//! the locktime. The marker is only emitted when some input actually carries
//! a witness, so a witness-less transaction always round-trips through the
//! legacy encoding.

use std::io;

use crate::compactint::CompactInt;
use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use crate::transparent;

use super::{Hash, LockTime, Transaction, WtxHash};

/// The maximum size of a transaction (excluding the witness) in bytes.
pub const MAX_TX_SIZE: u64 = 1_000_000;

impl Transaction {
    /// Writes the legacy encoding, skipping all witness data.
    ///
    /// This is also the preimage of the txid.
    pub(crate) fn write_without_witness<W: io::Write>(
        &self,
        mut writer: W,
    ) -> Result<(), io::Error> {
        self.version.bitcoin_serialize(&mut writer)?;
        self.inputs.bitcoin_serialize(&mut writer)?;
        self.outputs.bitcoin_serialize(&mut writer)?;
        self.locktime.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinSerialize for Transaction {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        if !self.has_witness() {
            return self.write_without_witness(writer);
        }

        self.version.bitcoin_serialize(&mut writer)?;
        writer.write_all(&[0x00, 0x01])?;
        self.inputs.bitcoin_serialize(&mut writer)?;
        self.outputs.bitcoin_serialize(&mut writer)?;
        for input in self.inputs.iter() {
            input.witness.bitcoin_serialize(&mut writer)?;
        }
        self.locktime.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

/// Deserializes a transaction, calculating and caching its txid and wtxid.
impl BitcoinDeserialize for Transaction {
    fn bitcoin_deserialize<R: io::Read>(src: R) -> Result<Self, SerializationError> {
        // Put a sanity limit on the size of a transaction to protect against
        // DOS attacks
        let mut src = src.take(MAX_TX_SIZE);

        let version = i32::bitcoin_deserialize(&mut src)?;

        // The next byte is either the start of the input count, or the zero
        // marker of the segwit encoding: a legal legacy parse can only start
        // with zero if the transaction has no inputs, which is handled below.
        let first = u8::bitcoin_deserialize(&mut src)?;
        let (mut inputs, segwit) = if first == 0x00 {
            let flag = u8::bitcoin_deserialize(&mut src)?;
            if flag & 0x01 == 0 || flag & !0x01 != 0 {
                return Err(SerializationError::Parse("unknown transaction flag"));
            }
            (
                <Vec<transparent::Input>>::bitcoin_deserialize(&mut src)?,
                true,
            )
        } else {
            let count = CompactInt::bitcoin_deserialize_tail(first, &mut src)?.value();
            let mut inputs = Vec::with_capacity(std::cmp::min(count as usize, 1024));
            for _ in 0..count {
                inputs.push(transparent::Input::bitcoin_deserialize(&mut src)?);
            }
            (inputs, false)
        };

        let outputs = <Vec<transparent::Output>>::bitcoin_deserialize(&mut src)?;

        if segwit {
            let mut any_witness = false;
            for input in inputs.iter_mut() {
                input.witness = transparent::Witness::bitcoin_deserialize(&mut src)?;
                any_witness |= !input.witness.is_empty();
            }
            if !any_witness {
                return Err(SerializationError::Parse(
                    "segwit marker without witness data",
                ));
            }
        } else if inputs.is_empty() && !outputs.is_empty() {
            // Reserializing this transaction would emit a zero input count
            // that decodes as a segwit marker.
            return Err(SerializationError::Parse(
                "transaction with no inputs and some outputs",
            ));
        }

        let locktime = LockTime::bitcoin_deserialize(&mut src)?;

        let mut tx = Transaction {
            version,
            inputs,
            outputs,
            locktime,
            hash: None,
            wtx_hash: None,
        };

        // Calculate and cache the ids while the bytes are hot.
        let txid = Hash::from(&tx);
        tx.hash = Some(txid);
        tx.wtx_hash = Some(if tx.has_witness() {
            WtxHash::from(&tx)
        } else {
            WtxHash(txid.0)
        });
        Ok(tx)
    }
}
