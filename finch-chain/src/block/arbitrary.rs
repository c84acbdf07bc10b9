//! Proptest strategies for generating block headers, blocks, and connected
//! chains.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use crate::parameters::{genesis_hash, Network};
use crate::transaction::Transaction;
use crate::work::difficulty::CompactDifficulty;
use crate::LedgerState;

use super::{merkle, Block, Hash, Header};

/// The Unix timestamp of the mainnet genesis block; generated headers are
/// never older than the chain itself.
const GENESIS_TIMESTAMP: i64 = 1_231_006_505;

/// Difficulty encodings whose target expands to a valid 256-bit value.
///
/// The chain database refuses headers with broken encodings (it cannot
/// account their work), so generated headers must only carry usable bits:
/// a nonzero mantissa with a clear sign bit, and an exponent small enough
/// not to overflow the target.
fn difficulty_strategy() -> BoxedStrategy<CompactDifficulty> {
    (4u32..=31, 1u32..=0x007f_ffff)
        .prop_map(|(exponent, mantissa)| CompactDifficulty(exponent << 24 | mantissa))
        .boxed()
}

impl Arbitrary for Header {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_args: ()) -> Self::Strategy {
        (
            // Version numbers miners have actually produced: the original
            // versions plus the BIP 9 version-bits range.
            prop_oneof![Just(1i32), Just(2i32), Just(4i32), 0x2000_0000i32..0x4000_0000],
            any::<Hash>(),
            any::<merkle::Root>(),
            GENESIS_TIMESTAMP..u32::MAX as i64,
            difficulty_strategy(),
            any::<u32>(),
        )
            .prop_map(|(version, prev, merkle_root, timestamp, bits, nonce)| {
                Header::new(
                    version,
                    prev,
                    merkle_root,
                    Utc.timestamp(timestamp, 0),
                    bits,
                    nonce,
                )
            })
            .boxed()
    }
}

impl Arbitrary for Block {
    type Parameters = LedgerState;
    type Strategy = BoxedStrategy<Self>;

    /// Generates a block with a leading coinbase and a header whose merkle
    /// root commits to the generated transaction list, as a real miner's
    /// would.
    fn arbitrary_with(ledger_state: Self::Parameters) -> Self::Strategy {
        (
            any::<Header>(),
            Transaction::block_list_strategy(ledger_state, 2),
        )
            .prop_map(|(mut header, transactions)| {
                header.merkle_root = transactions.iter().map(|tx| tx.hash()).collect();
                Block {
                    header,
                    transactions,
                }
            })
            .boxed()
    }
}

impl Block {
    /// Strategy for a connected chain of `count` blocks on top of the
    /// `network` genesis block.
    ///
    /// Unlike a plain `vec` of arbitrary blocks, every header here commits
    /// to its parent's actual hash, and every coinbase claims the height it
    /// sits at, so the result can be fed straight into the chain database.
    pub fn chain_strategy(network: Network, count: usize) -> BoxedStrategy<Vec<Arc<Block>>> {
        let mut blocks = Vec::with_capacity(count);
        let mut ledger_state = LedgerState {
            network,
            ..LedgerState::default()
        };
        for _ in 0..count {
            blocks.push(Block::arbitrary_with(ledger_state));
            ledger_state.tip_height.0 += 1;
        }

        blocks
            .prop_map(move |mut blocks| {
                let mut parent = genesis_hash(network);
                for block in blocks.iter_mut() {
                    block.header.previous_block_hash = parent;
                    parent = block.hash();
                }
                blocks.into_iter().map(Arc::new).collect()
            })
            .boxed()
    }
}
