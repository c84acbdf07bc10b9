//! Constants for the block subsidy schedule.

use finch_chain::{amount::COIN, block::Height};

/// The largest block subsidy, used before the first halving. 50 BTC
pub const MAX_BLOCK_SUBSIDY: u64 = (50 * COIN) as u64;

/// The number of blocks between subsidy halvings.
pub const HALVING_INTERVAL: Height = Height(210_000);
