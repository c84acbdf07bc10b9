//! Proptest strategies for generating transactions.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::{collection::vec, prelude::*};

use crate::{block, transparent, LedgerState};

use super::{LockTime, Transaction};

impl Arbitrary for LockTime {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    /// Almost every real transaction is unlocked, so that case gets most of
    /// the weight; the rest split between height and timestamp locks.
    fn arbitrary_with(_args: ()) -> Self::Strategy {
        prop_oneof![
            3 => Just(LockTime::unlocked()),
            2 => any::<block::Height>().prop_map(LockTime::Height),
            1 => (LockTime::MIN_TIMESTAMP..=LockTime::MAX_TIMESTAMP)
                .prop_map(|seconds| LockTime::Time(Utc.timestamp(seconds, 0))),
        ]
        .boxed()
    }
}

impl Arbitrary for Transaction {
    type Parameters = LedgerState;
    type Strategy = BoxedStrategy<Self>;

    /// Generates a coinbase claiming the next block's reward when the
    /// ledger state asks for one, and an ordinary spending transaction
    /// otherwise.
    fn arbitrary_with(ledger_state: Self::Parameters) -> Self::Strategy {
        if ledger_state.is_coinbase {
            return Self::coinbase_strategy(ledger_state);
        }

        (
            1..=2i32,
            vec(any::<transparent::Input>(), 1..5),
            vec(any::<transparent::Output>(), 0..5),
            any::<LockTime>(),
        )
            .prop_map(|(version, inputs, outputs, locktime)| {
                Transaction::new(version, inputs, outputs, locktime)
            })
            .boxed()
    }
}

impl Transaction {
    /// Strategy for the coinbase of the block after `ledger_state`'s tip.
    ///
    /// The coinbase data leads with the next height, BIP 34 style, so
    /// coinbases generated at different heights always get distinct txids.
    /// The data stays within the consensus length bounds of `[2, 100]`.
    pub fn coinbase_strategy(ledger_state: LedgerState) -> BoxedStrategy<Self> {
        let next_height = ledger_state.tip_height.0.saturating_add(1);
        (
            vec(any::<u8>(), 0..64),
            vec(any::<transparent::Output>(), 1..3),
        )
            .prop_map(move |(extra_data, outputs)| {
                let mut data = next_height.to_le_bytes().to_vec();
                data.extend(extra_data);
                Transaction::new(
                    1,
                    vec![transparent::Input {
                        outpoint: transparent::OutPoint::null(),
                        unlock_script: transparent::Script(data),
                        sequence: transparent::SEQUENCE_FINAL,
                        witness: transparent::Witness::default(),
                    }],
                    outputs,
                    LockTime::unlocked(),
                )
            })
            .boxed()
    }

    /// Strategy for a block's transaction list: the coinbase, then up to
    /// `max_spends` ordinary transactions.
    pub fn block_list_strategy(
        ledger_state: LedgerState,
        max_spends: usize,
    ) -> BoxedStrategy<Vec<Arc<Self>>> {
        let mut spend_state = ledger_state;
        spend_state.is_coinbase = false;

        (
            Self::coinbase_strategy(ledger_state),
            vec(Transaction::arbitrary_with(spend_state), 0..=max_spends),
        )
            .prop_map(|(coinbase, spends)| {
                std::iter::once(coinbase).chain(spends).map(Arc::new).collect()
            })
            .boxed()
    }
}
