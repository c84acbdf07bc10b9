//! The `cmpctblock` message: a block header plus 48-bit fingerprints of its
//! transactions, with the coinbase sent in full.

use std::convert::TryInto;
use std::hash::Hasher;
use std::io;
use std::sync::Arc;

use rand::Rng;
use sha2::{Digest, Sha256};
use siphasher::sip::SipHasher24;

use finch_chain::{
    block, compactint::CompactInt, transaction::Transaction, BitcoinDeserialize, BitcoinSerialize,
    SerializationError,
};

/// A 48-bit short transaction id: a keyed siphash fingerprint of the txid or
/// wtxid, transmitted as `le32(low) ‖ le16(high)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShortId(pub u64);

impl ShortId {
    /// Fingerprints `hash` under the block's siphash key.
    pub fn new(hash: &[u8; 32], key: (u64, u64)) -> ShortId {
        let mut hasher = SipHasher24::new_with_keys(key.0, key.1);
        hasher.write(hash);
        ShortId(hasher.finish() & 0xffff_ffff_ffff)
    }
}

impl BitcoinSerialize for ShortId {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        (self.0 as u32).bitcoin_serialize(&mut writer)?;
        ((self.0 >> 32) as u16).bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for ShortId {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let low = u32::bitcoin_deserialize(&mut reader)? as u64;
        let high = u16::bitcoin_deserialize(&mut reader)? as u64;
        Ok(ShortId(high << 32 | low))
    }
}

/// A transaction sent in full inside a compact block, at a differentially
/// encoded position.
///
/// The index on the wire is the gap since the previous prefilled
/// transaction, so consecutive prefills encode as zeroes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefilledTransaction {
    pub index: CompactInt,
    pub tx: Arc<Transaction>,
}

impl PrefilledTransaction {
    /// Returns the serialized length of a PrefilledTx
    pub fn len(&self) -> usize {
        self.tx.len() + CompactInt::size(self.index.value().try_into().unwrap_or(usize::MAX))
    }
}

impl BitcoinSerialize for PrefilledTransaction {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.index.bitcoin_serialize(&mut writer)?;
        self.tx.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for PrefilledTransaction {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(PrefilledTransaction {
            index: CompactInt::bitcoin_deserialize(&mut reader)?,
            tx: <Arc<Transaction>>::bitcoin_deserialize(&mut reader)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactBlock {
    pub header: block::Header,
    pub nonce: u64,
    pub short_ids: Vec<ShortId>,
    pub prefilled_txns: Vec<PrefilledTransaction>,
}

impl CompactBlock {
    /// Builds the compact form of `block` for relay: a fresh random key
    /// nonce, a short id for every non-coinbase transaction, and the
    /// coinbase prefilled at position zero.
    pub fn from_block(block: &block::Block) -> CompactBlock {
        CompactBlock::with_nonce(block, rand::thread_rng().gen())
    }

    /// [`CompactBlock::from_block`] with a caller-chosen nonce, for tests
    /// that need a deterministic key.
    pub fn with_nonce(block: &block::Block, nonce: u64) -> CompactBlock {
        let key = short_id_key(&block.header, nonce);
        let short_ids = block
            .transactions
            .iter()
            .skip(1)
            .map(|tx| ShortId::new(&tx.wtx_hash().0, key))
            .collect();
        let prefilled_txns = block
            .transactions
            .first()
            .map(|coinbase| PrefilledTransaction {
                index: CompactInt::from(0),
                tx: coinbase.clone(),
            })
            .into_iter()
            .collect();

        CompactBlock {
            header: block.header,
            nonce,
            short_ids,
            prefilled_txns,
        }
    }

    /// The siphash key for this compact block's short ids.
    pub fn short_id_key(&self) -> (u64, u64) {
        short_id_key(&self.header, self.nonce)
    }

    /// Returns the serialized length of this message.
    pub fn serialized_size(&self) -> usize {
        let mut len = block::Header::len()
            + 8
            + CompactInt::size(self.short_ids.len())
            + 6 * self.short_ids.len()
            + CompactInt::size(self.prefilled_txns.len());
        for txn in self.prefilled_txns.iter() {
            len += txn.len();
        }
        len
    }
}

/// Derives the short id key: the first 16 bytes of
/// `SHA-256(header ‖ le64(nonce))`, taken as two little-endian u64s.
fn short_id_key(header: &block::Header, nonce: u64) -> (u64, u64) {
    let mut hasher = Sha256::new();
    hasher.update(&header.bitcoin_serialize_to_vec());
    hasher.update(&nonce.to_le_bytes());
    let digest = hasher.finalize();

    let k0 = u64::from_le_bytes(digest[0..8].try_into().expect("slice is 8 bytes"));
    let k1 = u64::from_le_bytes(digest[8..16].try_into().expect("slice is 8 bytes"));
    (k0, k1)
}

impl BitcoinSerialize for CompactBlock {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.header.bitcoin_serialize(&mut writer)?;
        self.nonce.bitcoin_serialize(&mut writer)?;
        self.short_ids.bitcoin_serialize(&mut writer)?;
        self.prefilled_txns.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for CompactBlock {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(CompactBlock {
            header: block::Header::bitcoin_deserialize(&mut reader)?,
            nonce: u64::bitcoin_deserialize(&mut reader)?,
            short_ids: <Vec<ShortId>>::bitcoin_deserialize(&mut reader)?,
            prefilled_txns: <Vec<PrefilledTransaction>>::bitcoin_deserialize(&mut reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finch_chain::BitcoinDeserializeInto;

    #[test]
    fn short_id_wire_layout() {
        let id = ShortId(0x0000_8899_aabb_ccdd);
        let bytes = id.bitcoin_serialize_to_vec().unwrap();
        // le32 of the low bits, then le16 of the high bits.
        assert_eq!(bytes, vec![0xdd, 0xcc, 0xbb, 0xaa, 0x99, 0x88]);
        let decoded: ShortId = bytes.as_slice().bitcoin_deserialize_into().unwrap();
        assert_eq!(decoded, id);
    }

    #[test]
    fn serial_size() {
        finch_test::init();

        let block = finch_chain::parameters::genesis_block(
            finch_chain::parameters::Network::Mainnet,
        );
        let msg = CompactBlock::with_nonce(&block, 1_928_712);
        let serial = msg
            .bitcoin_serialize_to_vec()
            .expect("Serializing into vec shouldn't fail");
        assert_eq!(serial.len(), msg.serialized_size());

        let decoded: CompactBlock = serial.as_slice().bitcoin_deserialize_into().unwrap();
        assert_eq!(decoded, msg);
    }
}
