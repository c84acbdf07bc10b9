//! The primary implementation of the Finch chain database, built upon sled.
//!
//! The database coordinates three stores that must never disagree:
//!
//! - the sled trees `meta`, `coin`, `index`, and `tip`, updated atomically
//!   per operation through one multi-tree transaction;
//! - the append-only flat files holding raw block and undo bytes, written
//!   strictly *before* the transaction that references them commits;
//! - the in-memory [`BlockIndex`], updated strictly *after* the commit.
//!
//! The transaction commit is the linearization point. A crash before it
//! leaves at most unreferenced bytes at the end of a flat file, which no
//! reader can observe because readers only follow `(file, pos)` locations
//! recorded in committed index entries.

use std::sync::Arc;

use chrono::{Duration, Utc};
use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::Transactional;
use tracing::{debug, info, trace};

use finch_chain::{
    block::{self, Block},
    parameters::{genesis_block, Network},
    transaction::Transaction,
    transparent::{Coin, CoinView},
    BitcoinSerialize,
};

use crate::block_files::BlockFiles;
use crate::block_index::{BlockIndex, Entry, EntryIndex};
use crate::{BoxError, Config};

mod sled_format;

use sled_format::{
    coin_bytes, coin_from_bytes, entry_bytes, entry_from_bytes, file_pointer_bytes,
    file_pointer_from_bytes, outpoint_key, undo_bytes, undo_from_bytes,
};

/// `meta` key for the active block file pointer.
const FILE_POINTER_KEY: &[u8] = b"F";
/// `meta` key for the main-chain tip hash.
const TIP_KEY: &[u8] = b"R";

/// The finalized chain state: block index, UTXO set, and raw block files.
///
/// All mutating operations take `&mut self`; the database is single-writer
/// by construction. Read-only coin lookups go straight to sled, which gives
/// each read a consistent view without blocking the writer.
pub struct FinalizedState {
    network: Network,
    db: sled::Db,
    meta: sled::Tree,
    coin: sled::Tree,
    index_tree: sled::Tree,
    tip_tree: sled::Tree,
    files: BlockFiles,
    index: BlockIndex,
    /// Reused serialization buffer, so the hot write path does not allocate
    /// per block.
    scratch: Vec<u8>,
}

impl FinalizedState {
    /// Opens (or creates) the chain database under `config.prefix()`,
    /// recovering the block index and bootstrapping a fresh store with the
    /// network's genesis block.
    pub fn new(config: &Config) -> Result<Self, BoxError> {
        let prefix = config.prefix();
        std::fs::create_dir_all(&prefix)?;

        let db = sled::Config::new().path(prefix.join("chain")).open()?;
        let meta = db.open_tree(b"meta")?;
        let coin = db.open_tree(b"coin")?;
        let index_tree = db.open_tree(b"index")?;
        let tip_tree = db.open_tree(b"tip")?;

        let (active_file, active_pos) = match meta.get(FILE_POINTER_KEY)? {
            Some(bytes) => file_pointer_from_bytes(&bytes)?,
            None => (0, 0),
        };
        let files = BlockFiles::open(
            &prefix.join("blocks"),
            active_file,
            active_pos,
            config.block_file_size,
        )?;

        let mut state = FinalizedState {
            network: config.network,
            db,
            meta,
            coin,
            index_tree,
            tip_tree,
            files,
            index: BlockIndex::new(),
            scratch: Vec::with_capacity(1024 * 1024),
        };
        state.load()?;
        Ok(state)
    }

    /// Rebuilds the in-memory block index from the store, or bootstraps a
    /// fresh store with the genesis block.
    fn load(&mut self) -> Result<(), BoxError> {
        let tip_hash = match self.meta.get(TIP_KEY)? {
            Some(bytes) if bytes.len() == 32 => {
                let mut hash = [0u8; 32];
                hash.copy_from_slice(&bytes);
                block::Hash(hash)
            }
            Some(_) => return Err("corrupt chain store: malformed tip record".into()),
            None => {
                info!(network = ?self.network, "no tip recorded, writing genesis block");
                let genesis = Arc::new(genesis_block(self.network));
                let mut view = CoinView::new();
                self.commit_block(genesis, &mut view)?;
                return Ok(());
            }
        };

        // Pass one: load every entry into the arena.
        for item in self.index_tree.iter() {
            let (key, value) = item?;
            let entry = entry_from_bytes(&value)?;
            if key.as_ref() != entry.hash.0 {
                return Err("corrupt chain store: entry stored under wrong hash".into());
            }
            self.index.insert(entry);
        }

        // Pass two: resolve parent links; every non-genesis entry must have
        // its parent present.
        let mut genesis = None;
        let mut links = Vec::with_capacity(self.index.len());
        for (index, entry) in self.index.entries() {
            if entry.height == block::Height(0) {
                if genesis.replace(index).is_some() {
                    return Err("corrupt chain store: multiple genesis entries".into());
                }
                continue;
            }
            let prev = self
                .index
                .by_hash(&entry.header.previous_block_hash)
                .ok_or("corrupt chain store: entry with missing parent")?;
            links.push((index, prev));
        }
        for (index, prev) in links {
            self.index.get_mut(index).prev = Some(prev);
        }
        let genesis = genesis.ok_or("corrupt chain store: no genesis entry")?;

        // Walk back from the tip to rebuild the main-chain height index and
        // the forward links.
        let tip = self
            .index
            .by_hash(&tip_hash)
            .ok_or("corrupt chain store: tip entry missing from index")?;
        let tip_height = self.index.get(tip).height;
        let mut heights = vec![tip; tip_height.0 as usize + 1];
        let mut cursor = tip;
        loop {
            let (height, prev) = {
                let entry = self.index.get(cursor);
                (entry.height.0 as usize, entry.prev)
            };
            if height >= heights.len() {
                return Err("corrupt chain store: main chain height out of range".into());
            }
            heights[height] = cursor;
            match prev {
                Some(prev) => {
                    self.index.get_mut(prev).next = Some(cursor);
                    cursor = prev;
                }
                None => break,
            }
        }
        if cursor != genesis {
            return Err("corrupt chain store: main chain does not reach genesis".into());
        }
        self.index.set_main_chain(heights);

        info!(
            tip = %tip_hash,
            height = tip_height.0,
            entries = self.index.len(),
            "loaded chain index"
        );
        Ok(())
    }

    // --- accessors ------------------------------------------------------

    /// Returns the height and hash of the current main-chain tip.
    pub fn tip(&self) -> Option<(block::Height, block::Hash)> {
        let entry = self.index.get(self.index.tail()?);
        Some((entry.height, entry.hash))
    }

    /// The genesis entry.
    pub fn head(&self) -> Option<&Entry> {
        Some(self.index.get(self.index.head()?))
    }

    /// The tip entry.
    pub fn tail(&self) -> Option<&Entry> {
        Some(self.index.get(self.index.tail()?))
    }

    /// The number of main-chain entries (tip height plus one).
    pub fn main_chain_len(&self) -> usize {
        self.index.main_chain_len()
    }

    /// Looks up a block-index entry by hash, side chains included.
    pub fn entry(&self, hash: &block::Hash) -> Option<&Entry> {
        Some(self.index.get(self.index.by_hash(hash)?))
    }

    /// The main-chain entry at `height`.
    pub fn entry_at_height(&self, height: block::Height) -> Option<&Entry> {
        Some(self.index.get(self.index.at_height(height)?))
    }

    /// Reads a stored block back from its flat file.
    pub fn read_block(&self, entry: &Entry) -> Result<Block, BoxError> {
        if !entry.has_block() {
            return Err("entry has no stored block".into());
        }
        let bytes = self.files.read(entry.block_file, entry.block_pos as u32)?;
        use finch_chain::BitcoinDeserializeInto;
        Ok(bytes.as_slice().bitcoin_deserialize_into()?)
    }

    /// Looks up a single coin in the store, bypassing any in-memory view.
    pub fn coin(&self, outpoint: &finch_chain::transparent::OutPoint) -> Result<Option<Coin>, BoxError> {
        match self.coin.get(outpoint_key(outpoint))? {
            Some(bytes) => Ok(Some(coin_from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Iterates the persisted UTXO set in key order, as raw key and value
    /// bytes.
    pub fn coins(&self) -> impl Iterator<Item = Result<(sled::IVec, sled::IVec), sled::Error>> {
        self.coin.iter()
    }

    /// Fetches the coins spent by `tx` from the store into `view`, for
    /// input checking and script verification.
    ///
    /// Coins already staged in the view are left alone; missing coins are
    /// simply not added, and the consensus checks report them.
    pub fn spend_coins(&self, tx: &Transaction, view: &mut CoinView) -> Result<(), BoxError> {
        if tx.is_coinbase() {
            return Ok(());
        }
        for input in tx.inputs.iter() {
            if view.is_staged(&input.outpoint) {
                continue;
            }
            if let Some(bytes) = self.coin.get(outpoint_key(&input.outpoint))? {
                view.add(input.outpoint, coin_from_bytes(&bytes)?);
            }
        }
        Ok(())
    }

    // --- write operations -----------------------------------------------

    /// Connects `block` at the current tip, committing the staged `view`.
    ///
    /// The caller has already validated the block and applied each of its
    /// transactions to `view`; this method makes the result durable and
    /// advances the tip.
    pub fn commit_block(
        &mut self,
        block: Arc<Block>,
        view: &mut CoinView,
    ) -> Result<block::Hash, BoxError> {
        let hash = block.hash();
        if self.index.by_hash(&hash).is_some() {
            return Err("block is already stored; reconnect it instead".into());
        }
        let entry = self.derive_entry(&block)?;
        if let Some((_, tip_hash)) = self.tip() {
            if entry.header.previous_block_hash != tip_hash {
                return Err("block does not extend the current tip".into());
            }
        }

        self.save(entry, &block, Some(view), None)?;

        metrics::counter!("state.committed.block.count", 1);
        metrics::gauge!("state.committed.block.height", self.index.main_chain_len() as _);
        Ok(hash)
    }

    /// Stores a side-chain block's bytes and index entry without touching
    /// the UTXO set or the tip.
    pub fn store_block(&mut self, block: Arc<Block>) -> Result<block::Hash, BoxError> {
        let hash = block.hash();
        if self.index.by_hash(&hash).is_some() {
            return Err("block is already stored".into());
        }
        let entry = self.derive_entry(&block)?;
        self.save(entry, &block, None, None)?;
        Ok(hash)
    }

    /// Re-connects a block whose bytes are already on disk, after its
    /// branch has become the best chain again.
    pub fn reconnect_block(
        &mut self,
        block: Arc<Block>,
        view: &mut CoinView,
    ) -> Result<block::Hash, BoxError> {
        let hash = block.hash();
        let existing = self
            .index
            .by_hash(&hash)
            .ok_or("cannot reconnect an unknown block")?;
        let entry = self.index.get(existing).clone();
        if !entry.has_block() {
            return Err("cannot reconnect a block that was never stored".into());
        }
        if let Some((_, tip_hash)) = self.tip() {
            if entry.header.previous_block_hash != tip_hash {
                return Err("block does not extend the current tip".into());
            }
        }

        self.save(entry, &block, Some(view), Some(existing))?;
        Ok(hash)
    }

    /// Builds the index entry for a new block: height and accumulated work
    /// come from its parent.
    fn derive_entry(&self, block: &Block) -> Result<Entry, BoxError> {
        let hash = block.hash();
        let header = block.header;

        let work = header
            .difficulty_threshold
            .to_work()
            .ok_or("block header has an invalid difficulty encoding")?;

        if self.index.is_empty() {
            return Ok(Entry::new(
                hash,
                header,
                block::Height(0),
                work.as_u256(),
            ));
        }

        let prev = self
            .index
            .by_hash(&header.previous_block_hash)
            .ok_or("block's parent is not in the index")?;
        let parent = self.index.get(prev);
        let mut entry = Entry::new(
            hash,
            header,
            block::Height(parent.height.0 + 1),
            parent.chainwork + work.as_u256(),
        );
        entry.prev = Some(prev);
        Ok(entry)
    }

    /// The shared save path for connect, side-chain store, and reconnect.
    ///
    /// Appends any missing flat-file records, then commits every key-value
    /// change in one transaction, then updates the in-memory index.
    /// `existing` is the arena slot when the entry is already indexed
    /// (reconnect).
    fn save(
        &mut self,
        mut entry: Entry,
        block: &Block,
        view: Option<&mut CoinView>,
        existing: Option<EntryIndex>,
    ) -> Result<(), BoxError> {
        // A provided view means this save advances the tip; a side-chain
        // store passes no view and leaves the main chain alone.
        let advance_tip = view.is_some();

        // Step one: the raw block, if it was never written.
        if !entry.has_block() {
            self.scratch.clear();
            block.bitcoin_serialize(&mut self.scratch)?;
            let (file, pos) = self.files.append(&self.scratch)?;
            entry.block_file = file;
            entry.block_pos = pos as i32;
        }

        // Step two: apply the view and write the undo record.
        let mut coin_puts: Vec<([u8; 36], Vec<u8>)> = Vec::new();
        let mut coin_dels: Vec<[u8; 36]> = Vec::new();
        if let Some(view) = view.as_ref() {
            for (outpoint, coin) in view.iter() {
                if coin.spent {
                    coin_dels.push(outpoint_key(outpoint));
                } else {
                    coin_puts.push((outpoint_key(outpoint), coin_bytes(coin)));
                }
            }
        }
        let undo = view.map(|view| view.take_undo()).unwrap_or_default();
        if !undo.is_empty() && !entry.has_undo() {
            self.scratch.clear();
            undo_bytes(&undo, &mut self.scratch);
            let (file, pos) = self.files.append(&self.scratch)?;
            entry.undo_file = file;
            entry.undo_pos = pos as i32;
        }

        if self.should_sync(&entry) {
            self.files.sync()?;
        }

        // Steps three through seven, all or nothing.
        let file_pointer = file_pointer_bytes(self.files.active_file(), self.files.active_pos());
        let entry_value = entry_bytes(&entry);
        let prev_hash = entry.header.previous_block_hash;
        let is_genesis = entry.height == block::Height(0);
        let entry_hash = entry.hash;

        (&self.meta, &self.coin, &self.index_tree, &self.tip_tree)
            .transaction(|(meta, coin, index, tip)| {
                for (key, value) in coin_puts.iter() {
                    coin.insert(&key[..], value.as_slice())?;
                }
                for key in coin_dels.iter() {
                    coin.remove(&key[..])?;
                }
                meta.insert(FILE_POINTER_KEY, &file_pointer[..])?;
                index.insert(&entry_hash.0[..], entry_value.as_slice())?;
                if !is_genesis {
                    tip.remove(&prev_hash.0[..])?;
                }
                tip.insert(&entry_hash.0[..], &[1u8][..])?;
                if advance_tip {
                    meta.insert(TIP_KEY, &entry_hash.0[..])?;
                }
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|err| -> BoxError {
                match err {
                    TransactionError::Storage(err) => err.into(),
                    TransactionError::Abort(()) => "chain database commit aborted".into(),
                }
            })?;
        self.db.flush()?;

        // Step eight: only now is the entry allowed to become visible in
        // memory.
        let index = match existing {
            Some(index) => {
                *self.index.get_mut(index) = entry;
                index
            }
            None => self.index.insert(entry),
        };
        if advance_tip {
            self.index.push_main(index);
        }

        trace!(hash = %entry_hash, "saved block");
        Ok(())
    }

    /// Disconnects the tip block, restoring the coins it spent and deleting
    /// the coins it created.
    ///
    /// `block` must be the current tip's block, normally obtained from
    /// [`FinalizedState::read_block`]. The block's bytes and undo record
    /// stay on disk; only the UTXO set and the tip pointer move back.
    pub fn disconnect_block(&mut self, block: &Block) -> Result<block::Hash, BoxError> {
        let tip_index = self.index.tail().ok_or("no tip to disconnect")?;
        let entry = self.index.get(tip_index).clone();
        if entry.hash != block.hash() {
            return Err("block is not the current tip".into());
        }
        let prev_index = entry.prev.ok_or("cannot disconnect the genesis block")?;
        let prev_hash = entry.header.previous_block_hash;

        // Replay the undo record backwards: the last coin spent is the
        // first restored.
        let mut undo = if entry.has_undo() {
            undo_from_bytes(&self.files.read(entry.undo_file, entry.undo_pos as u32)?)?
        } else {
            Vec::new()
        };

        let mut view = CoinView::new();
        for tx in block.transactions.iter().rev() {
            if !tx.is_coinbase() {
                for input in tx.inputs.iter().rev() {
                    let coin = undo
                        .pop()
                        .ok_or("corrupt chain store: undo record too short")?;
                    view.add(input.outpoint, coin);
                }
            }
            // The block's own outputs are deleted by staging them spent.
            let hash = tx.hash();
            for (index, output) in tx.outputs.iter().enumerate() {
                let mut coin = Coin::new(tx.version, entry.height, tx.is_coinbase(), output.clone());
                coin.spent = true;
                view.add(
                    finch_chain::transparent::OutPoint {
                        hash,
                        index: index as u32,
                    },
                    coin,
                );
            }
        }
        if !undo.is_empty() {
            return Err("corrupt chain store: undo record too long".into());
        }

        let mut coin_puts: Vec<([u8; 36], Vec<u8>)> = Vec::new();
        let mut coin_dels: Vec<[u8; 36]> = Vec::new();
        for (outpoint, coin) in view.iter() {
            if coin.spent {
                coin_dels.push(outpoint_key(outpoint));
            } else {
                coin_puts.push((outpoint_key(outpoint), coin_bytes(coin)));
            }
        }

        (&self.meta, &self.coin, &self.index_tree, &self.tip_tree)
            .transaction(|(meta, coin, _index, _tip)| {
                for (key, value) in coin_puts.iter() {
                    coin.insert(&key[..], value.as_slice())?;
                }
                for key in coin_dels.iter() {
                    coin.remove(&key[..])?;
                }
                meta.insert(TIP_KEY, &prev_hash.0[..])?;
                Ok::<(), ConflictableTransactionError<()>>(())
            })
            .map_err(|err| -> BoxError {
                match err {
                    TransactionError::Storage(err) => err.into(),
                    TransactionError::Abort(()) => "chain database commit aborted".into(),
                }
            })?;
        self.db.flush()?;

        self.index.pop_main();
        debug_assert_eq!(self.index.tail(), Some(prev_index));

        debug!(hash = %entry.hash, new_tip = %prev_hash, "disconnected block");
        Ok(prev_hash)
    }

    /// Decides whether the active block file should be fsynced after a
    /// write.
    ///
    /// Near the tip (headers within a day of the wall clock, or with a
    /// future timestamp) every block is synced; during initial sync only
    /// every thousandth block is, which bounds replay after a crash while
    /// amortizing the cost.
    fn should_sync(&self, entry: &Entry) -> bool {
        let now = Utc::now();
        if now.timestamp() <= 0 {
            return true;
        }
        if entry.header.time > now {
            return true;
        }
        if now.signed_duration_since(entry.header.time) <= Duration::hours(24) {
            return true;
        }
        entry.height.0 % 1000 == 0
    }
}
