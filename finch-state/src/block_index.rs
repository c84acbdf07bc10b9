//! The in-memory block index: every known block header, linked into a tree
//! by arena indices.
//!
//! Entries own no pointers. `prev` and `next` are indices into the arena,
//! which sidesteps ownership cycles entirely: the arena owns the nodes and
//! everything else is a copyable handle. `next` only tracks the main-chain
//! successor; side-chain children reach their parent through `prev` but are
//! not reachable from it.

use std::collections::HashMap;
use std::io;

use primitive_types::U256;

use finch_chain::{
    block,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};

/// A stable handle to an [`Entry`] in a [`BlockIndex`] arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryIndex(usize);

/// A block-index node: a header plus its chain position and the on-disk
/// locations of its block and undo records.
///
/// A file field of `-1` means "not yet written".
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub hash: block::Hash,
    pub header: block::Header,
    pub height: block::Height,
    /// The total work of the chain ending in this block.
    pub chainwork: U256,
    pub block_file: i32,
    pub block_pos: i32,
    pub undo_file: i32,
    pub undo_pos: i32,
    /// The parent entry; `None` only for the genesis block.
    pub prev: Option<EntryIndex>,
    /// The main-chain child, if this entry is on the main chain and not the
    /// tip.
    pub next: Option<EntryIndex>,
}

impl Entry {
    /// The fixed serialized size: hash, header, height, chainwork, and four
    /// file fields.
    pub const SERIALIZED_LEN: usize = 32 + 80 + 4 + 32 + 4 * 4;

    pub fn new(
        hash: block::Hash,
        header: block::Header,
        height: block::Height,
        chainwork: U256,
    ) -> Entry {
        Entry {
            hash,
            header,
            height,
            chainwork,
            block_file: -1,
            block_pos: -1,
            undo_file: -1,
            undo_pos: -1,
            prev: None,
            next: None,
        }
    }

    /// Returns `true` once the raw block has been written to a flat file.
    pub fn has_block(&self) -> bool {
        self.block_pos >= 0
    }

    /// Returns `true` once an undo record has been written for this block.
    pub fn has_undo(&self) -> bool {
        self.undo_pos >= 0
    }
}

impl BitcoinSerialize for Entry {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.hash.bitcoin_serialize(&mut writer)?;
        self.header.bitcoin_serialize(&mut writer)?;
        self.height.bitcoin_serialize(&mut writer)?;
        let mut chainwork = [0u8; 32];
        self.chainwork.to_little_endian(&mut chainwork);
        writer.write_all(&chainwork)?;
        self.block_file.bitcoin_serialize(&mut writer)?;
        self.block_pos.bitcoin_serialize(&mut writer)?;
        self.undo_file.bitcoin_serialize(&mut writer)?;
        self.undo_pos.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for Entry {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Entry {
            hash: block::Hash::bitcoin_deserialize(&mut reader)?,
            header: block::Header::bitcoin_deserialize(&mut reader)?,
            height: block::Height::bitcoin_deserialize(&mut reader)?,
            chainwork: U256::from_little_endian(&<[u8; 32]>::bitcoin_deserialize(&mut reader)?),
            block_file: i32::bitcoin_deserialize(&mut reader)?,
            block_pos: i32::bitcoin_deserialize(&mut reader)?,
            undo_file: i32::bitcoin_deserialize(&mut reader)?,
            undo_pos: i32::bitcoin_deserialize(&mut reader)?,
            prev: None,
            next: None,
        })
    }
}

/// The arena of block entries, with a hash lookup table and the main-chain
/// height index.
#[derive(Default)]
pub struct BlockIndex {
    arena: Vec<Entry>,
    by_hash: HashMap<block::Hash, EntryIndex>,
    /// Invariant: `heights[h]` is the main-chain entry at height `h`, and
    /// the last element is the tip.
    heights: Vec<EntryIndex>,
}

impl BlockIndex {
    pub fn new() -> BlockIndex {
        BlockIndex::default()
    }

    pub fn get(&self, index: EntryIndex) -> &Entry {
        &self.arena[index.0]
    }

    pub fn get_mut(&mut self, index: EntryIndex) -> &mut Entry {
        &mut self.arena[index.0]
    }

    pub fn by_hash(&self, hash: &block::Hash) -> Option<EntryIndex> {
        self.by_hash.get(hash).copied()
    }

    /// Adds an entry to the arena and the hash table, without linking it
    /// into any chain.
    pub fn insert(&mut self, entry: Entry) -> EntryIndex {
        let index = EntryIndex(self.arena.len());
        self.by_hash.insert(entry.hash, index);
        self.arena.push(entry);
        index
    }

    /// The number of known entries, side chains included.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// The genesis entry of the main chain.
    pub fn head(&self) -> Option<EntryIndex> {
        self.heights.first().copied()
    }

    /// The main-chain tip.
    pub fn tail(&self) -> Option<EntryIndex> {
        self.heights.last().copied()
    }

    /// The number of main-chain entries, i.e. tip height plus one.
    pub fn main_chain_len(&self) -> usize {
        self.heights.len()
    }

    pub fn at_height(&self, height: block::Height) -> Option<EntryIndex> {
        self.heights.get(height.0 as usize).copied()
    }

    /// Extends the main chain with `index`, linking its parent's `next`.
    ///
    /// The entry's height must equal the current main-chain length; the
    /// caller establishes this by always connecting at the tip.
    pub fn push_main(&mut self, index: EntryIndex) {
        let entry = self.get(index);
        debug_assert_eq!(entry.height.0 as usize, self.heights.len());
        if let Some(prev) = entry.prev {
            self.get_mut(prev).next = Some(index);
        }
        self.heights.push(index);
    }

    /// Removes the tip from the main chain, clearing its parent's `next`
    /// link. The entry itself stays in the arena as a side-chain leaf.
    pub fn pop_main(&mut self) -> Option<EntryIndex> {
        let index = self.heights.pop()?;
        if let Some(prev) = self.get(index).prev {
            self.get_mut(prev).next = None;
        }
        self.get_mut(index).next = None;
        Some(index)
    }

    /// Replaces the main-chain height index wholesale; used by load.
    pub(crate) fn set_main_chain(&mut self, heights: Vec<EntryIndex>) {
        self.heights = heights;
    }

    /// Iterates every entry in the arena, in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (EntryIndex, &Entry)> {
        self.arena
            .iter()
            .enumerate()
            .map(|(i, entry)| (EntryIndex(i), entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finch_chain::parameters::{genesis_block, Network};
    use finch_chain::serialization::BitcoinDeserializeInto;

    fn genesis_entry() -> Entry {
        let block = genesis_block(Network::Mainnet);
        Entry::new(
            block.hash(),
            block.header,
            block::Height(0),
            U256::from(0x1_0001_0001_u64),
        )
    }

    #[test]
    fn entry_serialization_roundtrip() {
        finch_test::init();

        let mut entry = genesis_entry();
        entry.block_file = 0;
        entry.block_pos = 1234;

        let bytes = entry.bitcoin_serialize_to_vec().unwrap();
        assert_eq!(bytes.len(), Entry::SERIALIZED_LEN);
        let decoded: Entry = bytes.as_slice().bitcoin_deserialize_into().unwrap();
        assert_eq!(entry, decoded);

        // -1 encodes as 0xFFFFFFFF.
        assert_eq!(&bytes[Entry::SERIALIZED_LEN - 8..Entry::SERIALIZED_LEN - 4], &[0xff; 4]);
    }

    #[test]
    fn main_chain_push_pop() {
        finch_test::init();

        let mut index = BlockIndex::new();
        let genesis = genesis_entry();
        let genesis_hash = genesis.hash;
        let genesis_idx = index.insert(genesis);
        index.push_main(genesis_idx);

        let mut child = genesis_entry();
        child.hash = block::Hash([0xcc; 32]);
        child.height = block::Height(1);
        child.prev = Some(genesis_idx);
        let child_idx = index.insert(child);
        index.push_main(child_idx);

        assert_eq!(index.head(), Some(genesis_idx));
        assert_eq!(index.tail(), Some(child_idx));
        assert_eq!(index.get(genesis_idx).next, Some(child_idx));
        assert_eq!(index.by_hash(&genesis_hash), Some(genesis_idx));

        assert_eq!(index.pop_main(), Some(child_idx));
        assert_eq!(index.tail(), Some(genesis_idx));
        assert_eq!(index.get(genesis_idx).next, None);
        // The popped entry is still known, just not on the main chain.
        assert_eq!(index.by_hash(&block::Hash([0xcc; 32])), Some(child_idx));
    }
}
