//! The `getblocktxn` message: a request for the transactions a compact
//! block's receiver could not reconstruct from its mempool.

use std::io;

use finch_chain::{
    block, compactint::CompactInt, BitcoinDeserialize, BitcoinSerialize, SerializationError,
};

/// A request for the block transactions at the given (ascending, absolute)
/// indexes.
///
/// On the wire the indexes are differentially encoded: the first is
/// absolute, every later one is the gap to its predecessor minus one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetBlockTxn {
    pub block_hash: block::Hash,
    pub indexes: Vec<u64>,
}

impl GetBlockTxn {
    /// Returns the serialized length of this message.
    pub fn serialized_size(&self) -> usize {
        let mut len = 32 + CompactInt::size(self.indexes.len());
        let mut last = None;
        for index in self.indexes.iter() {
            let diff = match last {
                None => *index,
                Some(last) => index - last - 1,
            };
            len += CompactInt::size(diff as usize);
            last = Some(*index);
        }
        len
    }
}

impl BitcoinSerialize for GetBlockTxn {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.block_hash.bitcoin_serialize(&mut writer)?;
        CompactInt::from(self.indexes.len()).bitcoin_serialize(&mut writer)?;
        let mut last = None;
        for index in self.indexes.iter() {
            let diff = match last {
                None => *index,
                Some(last) => index - last - 1,
            };
            CompactInt::from_u64(diff).bitcoin_serialize(&mut writer)?;
            last = Some(*index);
        }
        Ok(())
    }
}

impl BitcoinDeserialize for GetBlockTxn {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let block_hash = block::Hash::bitcoin_deserialize(&mut reader)?;
        let count = CompactInt::bitcoin_deserialize(&mut reader)?.value();
        if count > finch_chain::block::MAX_BLOCK_SIZE / 10 {
            return Err(SerializationError::Parse("too many requested indexes"));
        }

        let mut indexes = Vec::with_capacity(count as usize);
        let mut last: Option<u64> = None;
        for _ in 0..count {
            let diff = CompactInt::bitcoin_deserialize(&mut reader)?.value();
            let index = match last {
                None => diff,
                Some(last) => last
                    .checked_add(diff)
                    .and_then(|i| i.checked_add(1))
                    .ok_or(SerializationError::Parse("transaction index overflow"))?,
            };
            indexes.push(index);
            last = Some(index);
        }
        Ok(GetBlockTxn {
            block_hash,
            indexes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finch_chain::BitcoinDeserializeInto;
    use proptest::{collection::btree_set, prelude::*};

    #[test]
    fn serial_size() {
        let msg = GetBlockTxn {
            block_hash: block::Hash::from_bytes_exact([242u8; 32]),
            indexes: vec![0, 1, 5, 700, 16_000],
        };
        let serial = msg
            .bitcoin_serialize_to_vec()
            .expect("Serializing into vec shouldn't fail");
        assert_eq!(serial.len(), msg.serialized_size());
    }

    #[test]
    fn consecutive_indexes_encode_as_zero_deltas() {
        let msg = GetBlockTxn {
            block_hash: block::Hash::from_bytes_exact([0u8; 32]),
            indexes: vec![3, 4, 5],
        };
        let serial = msg.bitcoin_serialize_to_vec().unwrap();
        // hash ‖ count ‖ 3 ‖ 0 ‖ 0
        assert_eq!(&serial[32..], &[3, 3, 0, 0]);
    }

    proptest! {
        #[test]
        fn index_encoding_roundtrip(indexes in btree_set(0u64..100_000, 0..64)) {
            finch_test::init();

            let msg = GetBlockTxn {
                block_hash: block::Hash::from_bytes_exact([7u8; 32]),
                indexes: indexes.into_iter().collect(),
            };
            let serial = msg.bitcoin_serialize_to_vec()?;
            let decoded: GetBlockTxn = serial.as_slice().bitcoin_deserialize_into()?;
            prop_assert_eq!(msg, decoded);
        }
    }
}
