//! The `blocktxn` message: the transactions answering a `getblocktxn`
//! request, in block order.

use std::io;
use std::sync::Arc;

use finch_chain::{
    block, compactint::CompactInt, transaction::Transaction, BitcoinDeserialize, BitcoinSerialize,
    SerializationError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockTxn {
    pub block_hash: block::Hash,
    pub txs: Vec<Arc<Transaction>>,
}

impl BlockTxn {
    /// Returns the serialized length of this message.
    pub fn serialized_size(&self) -> usize {
        let mut size = 32;
        size += CompactInt::size(self.txs.len());
        for transaction in self.txs.iter() {
            size += transaction.len();
        }
        size
    }
}

impl BitcoinSerialize for BlockTxn {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.block_hash.bitcoin_serialize(&mut writer)?;
        self.txs.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for BlockTxn {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(BlockTxn {
            block_hash: block::Hash::bitcoin_deserialize(&mut reader)?,
            txs: <Vec<Arc<Transaction>>>::bitcoin_deserialize(&mut reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finch_chain::BitcoinSerialize;

    #[test]
    fn serial_size_empty() {
        let msg = BlockTxn {
            block_hash: block::Hash::from_bytes_exact([1u8; 32]),
            txs: Vec::new(),
        };
        let serial = msg
            .bitcoin_serialize_to_vec()
            .expect("Serializing into vec shouldn't fail");
        assert_eq!(serial.len(), msg.serialized_size());
    }

    #[test]
    fn serial_size_full() {
        finch_test::init();

        let block = finch_chain::parameters::genesis_block(
            finch_chain::parameters::Network::Mainnet,
        );
        let msg = BlockTxn {
            block_hash: block.hash(),
            txs: block.transactions.clone(),
        };
        let serial = msg
            .bitcoin_serialize_to_vec()
            .expect("Serializing into vec shouldn't fail");
        assert_eq!(serial.len(), msg.serialized_size());
    }
}
