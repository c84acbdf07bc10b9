use std::{convert::TryInto, io, sync::Arc};

use crate::serialization::{
    BitcoinDeserialize, BitcoinSerialize, SerializationError,
};
use crate::{compactint::CompactInt, transaction::Transaction};

use super::{Block, Header};

/// The maximum size of a Bitcoin block, in bytes.
///
/// After SegWit, this includes the size of the witness data.
pub const MAX_BLOCK_BYTES: u64 = 4_000_000;

/// The maximum base (non-witness) size of a Bitcoin block, in bytes.
pub const MAX_BLOCK_SIZE: u64 = 1_000_000;

impl BitcoinSerialize for Block {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.header.bitcoin_serialize(&mut writer)?;
        self.transactions.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for Block {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        // If the limit is reached, we'll get an UnexpectedEof error
        let mut reader = reader.take(MAX_BLOCK_BYTES);

        let header = Header::bitcoin_deserialize(&mut reader)?;
        let transaction_count = CompactInt::bitcoin_deserialize(&mut reader)?.value();

        // Sanity check the transaction count to prevent DOS attacks: every
        // transaction needs at least one input, and every input is at least
        // an outpoint plus a sequence number.
        if transaction_count > MAX_BLOCK_BYTES / (36 + 4) {
            return Err(SerializationError::Parse(
                "block transaction count too large for the block size limit",
            ));
        }

        let mut transactions = Vec::with_capacity(
            transaction_count
                .try_into()
                .expect("transaction count was bounds checked"),
        );
        for _ in 0..transaction_count {
            transactions.push(<Arc<Transaction>>::bitcoin_deserialize(&mut reader)?);
        }

        Ok(Block {
            header,
            transactions,
        })
    }
}
