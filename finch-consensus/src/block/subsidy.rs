//! Block subsidies and halvings.

use std::convert::TryFrom;

use finch_chain::{
    amount::{Amount, Error, NonNegative},
    block::Height,
};

use crate::parameters::subsidy::*;

/// The `BlockSubsidy(height)`.
///
/// In Bitcoin, the subsidy starts at 50 BTC and halves every 210,000 blocks.
/// After 64 halvings the shift would wrap, so the subsidy is pinned to 0.
pub fn block_subsidy(height: Height) -> Result<Amount<NonNegative>, Error> {
    let halvings = height.0 / HALVING_INTERVAL.0;
    if halvings >= 64 {
        return Amount::try_from(0);
    }
    let subsidy = MAX_BLOCK_SUBSIDY >> halvings;
    Amount::try_from(subsidy as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subsidy_schedule() {
        finch_test::init();

        // The initial block subsidy is 50 BTC
        assert_eq!(
            Amount::try_from(5_000_000_000),
            block_subsidy(Height(0))
        );
        // After the first halving, it's 25 BTC
        assert_eq!(
            Amount::try_from(2_500_000_000),
            block_subsidy(HALVING_INTERVAL)
        );
        // After the 32nd halving, the block subsidy is 1 satoshi
        assert_eq!(
            Amount::try_from(1),
            block_subsidy(Height(HALVING_INTERVAL.0 * 32))
        );
        // After the 33rd halving, there is no block subsidy
        assert_eq!(
            Amount::try_from(0),
            block_subsidy(Height(HALVING_INTERVAL.0 * 33))
        );
    }
}
