use chrono::{DateTime, Utc};

use crate::{
    serialization::sha256d, work::difficulty::CompactDifficulty, BitcoinDeserialize,
    BitcoinSerialize, SerializationError,
};

use super::{merkle, Hash};

/// A block header, containing metadata about a block.
///
/// How are blocks chained together? They are chained together via the
/// backwards reference (previous header hash) present in the block
/// header. Each block points backwards to its parent, all the way
/// back to the genesis block (the first block in the blockchain).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Header {
    /// The block's version field.
    pub version: i32,

    /// The hash of the previous block, used to create a chain of blocks back
    /// to the genesis block.
    ///
    /// This ensures no previous block can be changed without also changing
    /// this block's header.
    pub previous_block_hash: Hash,

    /// The root of the transaction Merkle tree, binding the block header to
    /// the transactions in the block.
    pub merkle_root: merkle::Root,

    /// The block timestamp is a Unix epoch time (UTC) when the miner started
    /// hashing the header (according to the miner).
    pub time: DateTime<Utc>,

    /// An encoded version of the target threshold this block's header hash
    /// must be less than or equal to, in the same nBits format used by
    /// bitcoind.
    pub difficulty_threshold: CompactDifficulty,

    /// An arbitrary field that miners can change to modify the header hash in
    /// order to produce a hash less than or equal to the target threshold.
    pub nonce: u32,

    /// The header's own hash, filled in when the header is deserialized.
    ///
    /// Headers built in memory carry `None` until someone asks for the
    /// hash. Not part of the consensus serialization.
    #[serde(skip)]
    hash: Option<Hash>,
}

/// Two headers are equal when their consensus fields are equal.
///
/// The hash is derived from those fields, so comparing it would only let a
/// freshly built header disagree with its own decoded image.
impl PartialEq for Header {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version
            && self.previous_block_hash == other.previous_block_hash
            && self.merkle_root == other.merkle_root
            && self.time == other.time
            && self.difficulty_threshold == other.difficulty_threshold
            && self.nonce == other.nonce
    }
}

impl Eq for Header {}

impl Header {
    /// Returns the length of a serialized header in bytes.
    pub const fn len() -> usize {
        80
    }

    pub fn new(
        version: i32,
        previous_block_hash: Hash,
        merkle_root: merkle::Root,
        time: DateTime<Utc>,
        difficulty_threshold: CompactDifficulty,
        nonce: u32,
    ) -> Header {
        Header {
            version,
            previous_block_hash,
            merkle_root,
            time,
            difficulty_threshold,
            nonce,
            hash: None,
        }
    }

    /// Get the hash of this header.
    pub fn hash(&self) -> Hash {
        match self.hash {
            Some(hash) => hash,
            None => Hash::from(self),
        }
    }

    pub fn bitcoin_serialize_to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Header::len());
        self.bitcoin_serialize(&mut out)
            .expect("writing to a vec never fails");
        out
    }
}

impl BitcoinSerialize for Header {
    fn bitcoin_serialize<W: std::io::Write>(&self, mut writer: W) -> Result<(), std::io::Error> {
        self.version.bitcoin_serialize(&mut writer)?;
        self.previous_block_hash.bitcoin_serialize(&mut writer)?;
        self.merkle_root.bitcoin_serialize(&mut writer)?;
        self.time.bitcoin_serialize(&mut writer)?;
        self.difficulty_threshold.bitcoin_serialize(&mut writer)?;
        self.nonce.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for Header {
    fn bitcoin_deserialize<R: std::io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut header = Header {
            version: i32::bitcoin_deserialize(&mut reader)?,
            previous_block_hash: Hash::bitcoin_deserialize(&mut reader)?,
            merkle_root: merkle::Root::bitcoin_deserialize(&mut reader)?,
            time: <DateTime<Utc>>::bitcoin_deserialize(&mut reader)?,
            difficulty_threshold: CompactDifficulty::bitcoin_deserialize(&mut reader)?,
            nonce: u32::bitcoin_deserialize(&mut reader)?,
            hash: None,
        };

        // Calculate and cache the hash. The reserialization is cheap: a
        // header is only 80 bytes.
        let mut hash_writer = sha256d::Writer::default();
        header
            .bitcoin_serialize(&mut hash_writer)
            .expect("Sha256dWriter is infallible");
        header.hash = Some(Hash(hash_writer.finish()));
        Ok(header)
    }
}
