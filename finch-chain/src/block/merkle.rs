//! The Bitcoin transaction Merkle tree.

use std::{fmt, io, iter::FromIterator};

use crate::serialization::{sha256d, BitcoinDeserialize, BitcoinSerialize, SerializationError};
use crate::transaction;

/// The root of the transaction Merkle tree.
///
/// Note that because of a flaw in Bitcoin's design, the root does not always
/// precisely bind the contents of the block (CVE-2012-2459): it is sometimes
/// possible to create multiple distinct transaction lists with the same
/// Merkle root, although only one list can be valid.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct Root(pub [u8; 32]);

impl fmt::Debug for Root {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("merkle::Root")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl BitcoinSerialize for Root {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_all(&self.0)
    }
}

impl BitcoinDeserialize for Root {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Root(<[u8; 32]>::bitcoin_deserialize(reader)?))
    }
}

fn hash_pair(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left);
    data[32..].copy_from_slice(right);
    sha256d::digest(&data)
}

impl FromIterator<transaction::Hash> for Root {
    /// Computes the Merkle root of an ordered list of transaction ids, with
    /// Bitcoin's odd-node rule: the last node at each level is paired with
    /// itself when the level has an odd length.
    fn from_iter<I: IntoIterator<Item = transaction::Hash>>(hashes: I) -> Self {
        let mut level: Vec<[u8; 32]> = hashes.into_iter().map(|hash| hash.0).collect();

        if level.is_empty() {
            return Root([0; 32]);
        }

        while level.len() > 1 {
            level = level
                .chunks(2)
                .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
                .collect();
        }

        Root(level[0])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_transaction_root_is_txid() {
        let txid = transaction::Hash([7; 32]);
        let root = Root::from_iter(vec![txid]);
        assert_eq!(root.0, txid.0);
    }

    #[test]
    fn odd_level_duplicates_last() {
        let a = transaction::Hash([1; 32]);
        let b = transaction::Hash([2; 32]);
        let c = transaction::Hash([3; 32]);

        let ab = hash_pair(&a.0, &b.0);
        let cc = hash_pair(&c.0, &c.0);
        let expected = hash_pair(&ab, &cc);

        assert_eq!(Root::from_iter(vec![a, b, c]).0, expected);
    }
}
