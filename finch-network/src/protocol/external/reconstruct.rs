//! Reassembling a full block from its compact form.
//!
//! The receiver allocates one slot per transaction, places the prefilled
//! transactions, fingerprints its own mempool against the remaining short
//! ids, and requests whatever is still missing with `getblocktxn`. A short
//! id collision aborts the whole attempt: the caller falls back to
//! requesting the full block.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::trace;

use finch_chain::{
    block::{self, Block, MAX_BLOCK_SIZE},
    transaction::Transaction,
};

use super::message::{BlockTxn, CompactBlock, GetBlockTxn, ShortId};

/// The most transactions a plausible compact block can fingerprint: every
/// short id stands for a transaction of at least 60 bytes in a block whose
/// 80-byte header (plus count) is already spoken for.
const MAX_SHORT_IDS: u64 = (MAX_BLOCK_SIZE - 81) / 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReconstructError {
    #[error("compact block has no transactions")]
    Empty,

    #[error("compact block transaction count is implausibly large")]
    TooManyTransactions,

    #[error("prefilled transaction index out of range")]
    BadPrefilledIndex,

    /// Two transactions fingerprinted to the same short id; the block can
    /// only be fetched in full.
    #[error("short id collision")]
    ShortIdCollision,

    #[error("block transactions response does not match the request")]
    ResponseMismatch,

    #[error("reconstruction is not complete")]
    Incomplete,
}

/// The receiver-side state of one compact block reconstruction.
///
/// Dropping the state cancels the reconstruction; it holds nothing but its
/// slot vector and the short id map.
#[derive(Debug)]
pub struct Reconstructor {
    header: block::Header,
    sipkey: (u64, u64),
    available: Vec<Option<Arc<Transaction>>>,
    id_map: HashMap<ShortId, usize>,
    count: usize,
}

impl Reconstructor {
    /// Validates a received compact block and prepares the slot table.
    ///
    /// Rejects empty and implausibly large blocks, out-of-range prefilled
    /// indexes, and duplicate short ids (a siphash collision between block
    /// transactions, which makes reconstruction impossible).
    pub fn new(compact: CompactBlock) -> Result<Reconstructor, ReconstructError> {
        let total = compact.prefilled_txns.len() + compact.short_ids.len();
        if total == 0 {
            return Err(ReconstructError::Empty);
        }
        if total as u64 > MAX_BLOCK_SIZE / 10 || total as u64 > MAX_SHORT_IDS {
            return Err(ReconstructError::TooManyTransactions);
        }

        let sipkey = compact.short_id_key();
        let mut available: Vec<Option<Arc<Transaction>>> = vec![None; total];
        let mut count = 0;

        // Prefilled positions are differential: each index is the gap since
        // the slot after the previous prefilled transaction.
        let mut last: i64 = -1;
        for (i, prefilled) in compact.prefilled_txns.into_iter().enumerate() {
            let diff = prefilled.index.value();
            if diff > 0xffff {
                return Err(ReconstructError::BadPrefilledIndex);
            }
            last += diff as i64 + 1;
            if last < 0 || last > 0xffff || last as usize > compact.short_ids.len() + i {
                return Err(ReconstructError::BadPrefilledIndex);
            }
            available[last as usize] = Some(prefilled.tx);
            count += 1;
        }

        // Map each short id to its block position, skipping slots already
        // taken by prefilled transactions.
        let mut id_map = HashMap::with_capacity(compact.short_ids.len());
        let mut offset = 0;
        for (i, short_id) in compact.short_ids.iter().enumerate() {
            while available[i + offset].is_some() {
                offset += 1;
            }
            if id_map.insert(*short_id, i + offset).is_some() {
                return Err(ReconstructError::ShortIdCollision);
            }
        }

        trace!(
            total,
            prefilled = count,
            "started compact block reconstruction"
        );
        Ok(Reconstructor {
            header: compact.header,
            sipkey,
            available,
            id_map,
            count,
        })
    }

    /// The number of transactions in the block being rebuilt.
    pub fn total(&self) -> usize {
        self.available.len()
    }

    /// Returns `true` once every slot is filled.
    pub fn is_complete(&self) -> bool {
        self.count == self.total()
    }

    /// Offers a candidate transaction, normally from the mempool.
    ///
    /// If its fingerprint matches an unfilled slot the transaction is
    /// placed there and `true` is returned. Each short id is consumed by
    /// its first match.
    pub fn add_transaction(&mut self, tx: Arc<Transaction>) -> bool {
        let short_id = ShortId::new(&tx.wtx_hash().0, self.sipkey);
        match self.id_map.remove(&short_id) {
            Some(index) => {
                debug_assert!(self.available[index].is_none());
                self.available[index] = Some(tx);
                self.count += 1;
                true
            }
            None => false,
        }
    }

    /// The request for every transaction still missing, with ascending
    /// absolute indexes.
    pub fn missing(&self) -> GetBlockTxn {
        GetBlockTxn {
            block_hash: self.header.hash(),
            indexes: self
                .available
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.is_none())
                .map(|(index, _)| index as u64)
                .collect(),
        }
    }

    /// Fills every remaining slot from a `blocktxn` response, in order.
    ///
    /// Fails unless the response matches the missing slots exactly: too few
    /// transactions leave a hole, too many mean the peer answered a
    /// different request.
    pub fn fill_missing(&mut self, response: BlockTxn) -> Result<(), ReconstructError> {
        if response.block_hash != self.header.hash() {
            return Err(ReconstructError::ResponseMismatch);
        }

        let mut txs = response.txs.into_iter();
        for slot in self.available.iter_mut() {
            if slot.is_none() {
                let tx = txs.next().ok_or(ReconstructError::ResponseMismatch)?;
                *slot = Some(tx);
                self.count += 1;
            }
        }
        if txs.next().is_some() {
            return Err(ReconstructError::ResponseMismatch);
        }
        Ok(())
    }

    /// Consumes the state and produces the reconstructed block.
    pub fn finalize(self) -> Result<Block, ReconstructError> {
        if self.count != self.available.len() {
            return Err(ReconstructError::Incomplete);
        }
        let transactions = self
            .available
            .into_iter()
            .map(|slot| slot.expect("every slot was counted as filled"))
            .collect();
        Ok(Block {
            header: self.header,
            transactions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use finch_chain::compactint::CompactInt;
    use finch_chain::{parameters::Network, LedgerState};
    use proptest::prelude::*;

    fn reconstruct_via_blocktxn(block: &Block) -> Block {
        let compact = CompactBlock::with_nonce(block, 0xfeed_beef);
        let mut state = Reconstructor::new(compact).expect("compact block is well formed");

        // Nothing in the "mempool": request everything that isn't prefilled.
        let request = state.missing();
        assert_eq!(request.indexes.len(), block.transactions.len() - 1);

        let response = BlockTxn {
            block_hash: block.hash(),
            txs: request
                .indexes
                .iter()
                .map(|index| block.transactions[*index as usize].clone())
                .collect(),
        };
        state.fill_missing(response).expect("response is exact");
        state.finalize().expect("all slots are filled")
    }

    #[test]
    fn genesis_roundtrip() {
        finch_test::init();

        let block = finch_chain::parameters::genesis_block(Network::Mainnet);
        let rebuilt = reconstruct_via_blocktxn(&block);
        assert_eq!(rebuilt, block);
    }

    #[test]
    fn mempool_path_consumes_short_ids() {
        finch_test::init();

        let block = finch_chain::parameters::genesis_block(Network::Mainnet);
        let compact = CompactBlock::with_nonce(&block, 1);
        let mut state = Reconstructor::new(compact).unwrap();

        // The only transaction is prefilled; a random candidate matches
        // nothing.
        assert!(state.is_complete());
        let other = block.transactions[0].clone();
        assert!(!state.add_transaction(other));
    }

    #[test]
    fn rejects_empty() {
        let block = finch_chain::parameters::genesis_block(Network::Mainnet);
        let mut compact = CompactBlock::with_nonce(&block, 1);
        compact.prefilled_txns.clear();
        assert_eq!(
            Reconstructor::new(compact).unwrap_err(),
            ReconstructError::Empty
        );
    }

    #[test]
    fn rejects_implausible_short_id_count() {
        let block = finch_chain::parameters::genesis_block(Network::Mainnet);
        let mut compact = CompactBlock::with_nonce(&block, 1);
        compact.short_ids = vec![ShortId(1); (super::MAX_SHORT_IDS + 1) as usize];
        assert_eq!(
            Reconstructor::new(compact).unwrap_err(),
            ReconstructError::TooManyTransactions
        );
    }

    #[test]
    fn rejects_short_id_collision() {
        let block = finch_chain::parameters::genesis_block(Network::Mainnet);
        let mut compact = CompactBlock::with_nonce(&block, 1);
        compact.short_ids = vec![ShortId(42), ShortId(42)];
        assert_eq!(
            Reconstructor::new(compact).unwrap_err(),
            ReconstructError::ShortIdCollision
        );
    }

    #[test]
    fn rejects_out_of_range_prefilled_index() {
        let block = finch_chain::parameters::genesis_block(Network::Mainnet);
        let mut compact = CompactBlock::with_nonce(&block, 1);
        compact.prefilled_txns[0].index = CompactInt::from(3);
        assert_eq!(
            Reconstructor::new(compact).unwrap_err(),
            ReconstructError::BadPrefilledIndex
        );
    }

    #[test]
    fn incomplete_finalize_fails() {
        let block = finch_chain::parameters::genesis_block(Network::Mainnet);
        let mut compact = CompactBlock::with_nonce(&block, 1);
        compact.short_ids.push(ShortId(7));
        let state = Reconstructor::new(compact).unwrap();
        assert!(!state.is_complete());
        assert_eq!(state.finalize().unwrap_err(), ReconstructError::Incomplete);
    }

    #[test]
    fn short_response_fails() {
        let block = finch_chain::parameters::genesis_block(Network::Mainnet);
        let mut compact = CompactBlock::with_nonce(&block, 1);
        compact.short_ids.push(ShortId(7));
        let hash = compact.header.hash();
        let mut state = Reconstructor::new(compact).unwrap();
        assert_eq!(
            state.fill_missing(BlockTxn {
                block_hash: hash,
                txs: Vec::new(),
            }),
            Err(ReconstructError::ResponseMismatch)
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn arbitrary_block_roundtrip(block in Block::arbitrary_with(LedgerState::default())) {
            finch_test::init();

            let rebuilt = reconstruct_via_blocktxn(&block);
            prop_assert_eq!(rebuilt, block);
        }

        #[test]
        fn mempool_fill_roundtrip(block in Block::arbitrary_with(LedgerState::default())) {
            finch_test::init();

            let compact = CompactBlock::with_nonce(&block, 0x1234_5678);
            let mut state = Reconstructor::new(compact).expect("compact block is well formed");

            // Offer every non-coinbase transaction as a mempool candidate.
            for tx in block.transactions.iter().skip(1) {
                prop_assert!(state.add_transaction(tx.clone()));
            }
            prop_assert!(state.missing().indexes.is_empty());
            let rebuilt = state.finalize().expect("mempool had everything");
            prop_assert_eq!(rebuilt, block);
        }
    }
}
