//! Context-free and contextual transaction checks.
//!
//! `sanity` validates a transaction on its own: structure, value ranges, and
//! the coinbase shape. `inputs` validates it against the coins it spends and
//! returns the fee. `sigop_cost` accounts signature operations across the
//! legacy, P2SH, and witness rules.

use std::collections::HashSet;
use std::convert::TryFrom;

use finch_chain::{
    amount::{Amount, NonNegative, MAX_MONEY},
    block::Height,
    parameters::COINBASE_MATURITY,
    transaction::{Transaction, MAX_TX_SIZE},
    transparent::{CoinView, Script, VerificationFlags, Witness},
};

use crate::error::TransactionError;

/// Checks a transaction's intrinsic consensus rules, in the order bitcoind
/// applies them.
pub fn sanity(tx: &Transaction) -> Result<(), TransactionError> {
    if tx.inputs.is_empty() {
        return Err(TransactionError::NoInputs);
    }
    if tx.outputs.is_empty() {
        return Err(TransactionError::NoOutputs);
    }
    if tx.base_size() as u64 > MAX_TX_SIZE {
        return Err(TransactionError::Oversize);
    }

    let mut total = Amount::<NonNegative>::zero();
    for output in tx.outputs.iter() {
        if output.value < 0 {
            return Err(TransactionError::OutputValueNegative);
        }
        if output.value > MAX_MONEY {
            return Err(TransactionError::OutputValueTooLarge);
        }
        let value = Amount::try_from(output.value)
            .map_err(|_| TransactionError::OutputValueTooLarge)?;
        total = total
            .checked_add(value)
            .map_err(|_| TransactionError::OutputTotalTooLarge)?;
    }

    let mut seen = HashSet::with_capacity(tx.inputs.len());
    for input in tx.inputs.iter() {
        if !seen.insert(input.outpoint) {
            return Err(TransactionError::DuplicateInputs);
        }
    }

    if tx.is_coinbase() {
        let script_len = tx.inputs[0].unlock_script.0.len();
        if !(2..=100).contains(&script_len) {
            return Err(TransactionError::CoinbaseLength);
        }
    } else {
        for input in tx.inputs.iter() {
            if input.outpoint.is_null() {
                return Err(TransactionError::PrevoutNull);
            }
        }
    }

    Ok(())
}

/// Checks a non-coinbase transaction against the coins it spends, returning
/// the fee it pays.
///
/// `spend_height` is the height of the block the transaction would be
/// connected at, used for the coinbase maturity rule.
pub fn inputs(
    tx: &Transaction,
    view: &CoinView,
    spend_height: Height,
) -> Result<Amount<NonNegative>, TransactionError> {
    if tx.is_coinbase() {
        // A coinbase spends nothing and pays no fee.
        return Ok(Amount::zero());
    }

    let mut value_in = Amount::<NonNegative>::zero();
    for input in tx.inputs.iter() {
        let coin = view
            .coin(&input.outpoint)
            .ok_or(TransactionError::MissingOrSpentInput)?;

        if coin.coinbase && spend_height.0.saturating_sub(coin.height.0) < COINBASE_MATURITY {
            return Err(TransactionError::PrematureCoinbaseSpend);
        }

        let value = Amount::try_from(coin.output.value)
            .map_err(|_| TransactionError::InputValuesOutOfRange)?;
        value_in = value_in
            .checked_add(value)
            .map_err(|_| TransactionError::InputValuesOutOfRange)?;
    }

    let mut value_out = Amount::<NonNegative>::zero();
    for output in tx.outputs.iter() {
        let value = Amount::try_from(output.value)
            .map_err(|_| TransactionError::InputValuesOutOfRange)?;
        value_out = value_out
            .checked_add(value)
            .map_err(|_| TransactionError::InputValuesOutOfRange)?;
    }

    if value_in < value_out {
        return Err(TransactionError::InputsBelowOutputs);
    }
    let fee = value_in
        .checked_sub(value_out)
        .map_err(|_| TransactionError::FeeNegative)?;
    if i64::from(fee) > MAX_MONEY {
        return Err(TransactionError::FeeOutOfRange);
    }
    Ok(fee)
}

/// The weight-scaled signature operation cost of a transaction:
/// `4 * legacy + 4 * p2sh + witness`.
///
/// Inputs whose coins are not in the view contribute only their legacy
/// count, matching bitcoind's accounting during mempool acceptance.
pub fn sigop_cost(tx: &Transaction, view: &CoinView, flags: VerificationFlags) -> u64 {
    const WITNESS_SCALE_FACTOR: u64 = 4;

    let mut cost = tx.legacy_sigop_count() * WITNESS_SCALE_FACTOR;
    if tx.is_coinbase() {
        return cost;
    }

    for input in tx.inputs.iter() {
        let coin = match view.coin(&input.outpoint) {
            Some(coin) => coin,
            None => continue,
        };
        let lock_script = &coin.output.lock_script;

        if flags.contains(VerificationFlags::P2SH) && lock_script.p2sh_hash().is_some() {
            cost += lock_script.p2sh_sigop_count(&input.unlock_script) * WITNESS_SCALE_FACTOR;
        }
        if flags.contains(VerificationFlags::WITNESS) {
            cost += witness_sigop_count(lock_script, &input.unlock_script, &input.witness, flags);
        }
    }
    cost
}

/// The number of virtual signature operations represented by a cost, rounded
/// up.
pub fn virtual_sigop_count(cost: u64) -> u64 {
    (cost + 3) / 4
}

fn witness_sigop_count(
    lock_script: &Script,
    unlock_script: &Script,
    witness: &Witness,
    flags: VerificationFlags,
) -> u64 {
    if lock_script.p2wpkh_program().is_some() {
        return 1;
    }
    if lock_script.p2wsh_program().is_some() {
        return witness_script_sigops(witness);
    }
    if flags.contains(VerificationFlags::P2SH) && lock_script.p2sh_hash().is_some() {
        if let Some(redeem) = unlock_script.last_push() {
            let redeem = Script(redeem.to_vec());
            if redeem.p2wpkh_program().is_some() {
                return 1;
            }
            if redeem.p2wsh_program().is_some() {
                return witness_script_sigops(witness);
            }
        }
    }
    0
}

/// Witness sigops of a p2wsh spend: the accurate count over the witness
/// script, which is the last witness stack item.
fn witness_script_sigops(witness: &Witness) -> u64 {
    witness
        .0
        .last()
        .map(|script| Script(script.clone()).sigop_count(true))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use finch_chain::{
        block,
        transaction::LockTime,
        transparent::{Coin, Input, OutPoint, Output, Witness},
    };

    fn outpoint(tag: u8, index: u32) -> OutPoint {
        OutPoint {
            hash: finch_chain::transaction::Hash([tag; 32]),
            index,
        }
    }

    fn input(outpoint: OutPoint) -> Input {
        Input {
            outpoint,
            unlock_script: Script::default(),
            sequence: 0xffff_fffe,
            witness: Witness::default(),
        }
    }

    fn output(value: i64) -> Output {
        Output {
            value,
            lock_script: Script::new_p2pkh(&[0x22; 20]),
        }
    }

    /// A minimal, structurally valid transaction template.
    fn template() -> Transaction {
        Transaction::new(
            1,
            vec![input(outpoint(0x01, 0))],
            vec![output(1_000)],
            LockTime::Height(block::Height(0)),
        )
    }

    #[test]
    fn template_is_sane() {
        finch_test::init();
        sanity(&template()).expect("template passes the sanity checks");
    }

    #[test]
    fn no_inputs() {
        let mut tx = template();
        tx.inputs.clear();
        assert_eq!(sanity(&tx), Err(TransactionError::NoInputs));
        assert_eq!(sanity(&tx).unwrap_err().score(), 100);
        assert_eq!(
            sanity(&tx).unwrap_err().reject_reason(),
            "bad-txns-vin-empty"
        );
    }

    #[test]
    fn no_outputs() {
        let mut tx = template();
        tx.outputs.clear();
        assert_eq!(sanity(&tx), Err(TransactionError::NoOutputs));
    }

    #[test]
    fn duplicate_inputs() {
        let mut tx = template();
        tx.inputs.push(tx.inputs[0].clone());
        assert_eq!(sanity(&tx), Err(TransactionError::DuplicateInputs));
        assert_eq!(
            sanity(&tx).unwrap_err().reject_reason(),
            "bad-txns-inputs-duplicate"
        );
    }

    #[test]
    fn negative_output() {
        let mut tx = template();
        tx.outputs[0].value = -1;
        let err = sanity(&tx).unwrap_err();
        assert_eq!(err, TransactionError::OutputValueNegative);
        assert_eq!(err.reject_reason(), "bad-txns-vout-negative");
        assert_eq!(err.score(), 100);
    }

    #[test]
    fn oversized_output() {
        let mut tx = template();
        tx.outputs[0].value = MAX_MONEY + 1;
        assert_eq!(sanity(&tx), Err(TransactionError::OutputValueTooLarge));
    }

    #[test]
    fn output_total_overflow() {
        let mut tx = template();
        tx.outputs = vec![output(MAX_MONEY), output(MAX_MONEY)];
        assert_eq!(sanity(&tx), Err(TransactionError::OutputTotalTooLarge));
    }

    #[test]
    fn null_prevout_on_non_coinbase() {
        let mut tx = template();
        tx.inputs.push(input(OutPoint::null()));
        let err = sanity(&tx).unwrap_err();
        assert_eq!(err, TransactionError::PrevoutNull);
        assert_eq!(err.reject_reason(), "bad-txns-prevout-null");
        assert_eq!(err.score(), 10);
    }

    #[test]
    fn short_coinbase_script() {
        let mut tx = template();
        tx.inputs = vec![Input {
            outpoint: OutPoint::null(),
            unlock_script: Script(vec![0x00]),
            sequence: 0xffff_ffff,
            witness: Witness::default(),
        }];
        assert!(tx.is_coinbase());
        let err = sanity(&tx).unwrap_err();
        assert_eq!(err, TransactionError::CoinbaseLength);
        assert_eq!(err.reject_reason(), "bad-cb-length");
    }

    #[test]
    fn oversize_transaction() {
        let mut tx = template();
        tx.outputs[0].lock_script = Script(vec![0x6a; MAX_TX_SIZE as usize + 1]);
        assert_eq!(sanity(&tx), Err(TransactionError::Oversize));
    }

    fn view_with(coins: Vec<(OutPoint, Coin)>) -> CoinView {
        let mut view = CoinView::new();
        for (outpoint, coin) in coins {
            view.add(outpoint, coin);
        }
        view
    }

    #[test]
    fn fee_is_in_minus_out() {
        finch_test::init();

        let tx = template();
        let coin = Coin::new(1, block::Height(10), false, output(1_500));
        let view = view_with(vec![(tx.inputs[0].outpoint, coin)]);

        let fee = inputs(&tx, &view, block::Height(200)).expect("inputs are valid");
        assert_eq!(i64::from(fee), 500);
    }

    #[test]
    fn missing_coin() {
        let tx = template();
        let view = CoinView::new();
        let err = inputs(&tx, &view, block::Height(200)).unwrap_err();
        assert_eq!(err, TransactionError::MissingOrSpentInput);
        assert_eq!(err.score(), 0);
    }

    #[test]
    fn immature_coinbase_spend() {
        let tx = template();
        let coin = Coin::new(1, block::Height(150), true, output(1_500));
        let view = view_with(vec![(tx.inputs[0].outpoint, coin)]);

        assert_eq!(
            inputs(&tx, &view, block::Height(200)),
            Err(TransactionError::PrematureCoinbaseSpend)
        );
        // At exactly 100 confirmations the spend is allowed.
        let coin = Coin::new(1, block::Height(100), true, output(1_500));
        let view = view_with(vec![(tx.inputs[0].outpoint, coin)]);
        assert!(inputs(&tx, &view, block::Height(200)).is_ok());
    }

    #[test]
    fn inputs_below_outputs() {
        let tx = template();
        let coin = Coin::new(1, block::Height(10), false, output(999));
        let view = view_with(vec![(tx.inputs[0].outpoint, coin)]);

        assert_eq!(
            inputs(&tx, &view, block::Height(200)),
            Err(TransactionError::InputsBelowOutputs)
        );
    }

    #[test]
    fn sigop_cost_counts_all_rules() {
        finch_test::init();

        let flags = VerificationFlags::P2SH | VerificationFlags::WITNESS;

        // One p2pkh output script on the tx itself: 1 legacy sigop.
        let mut tx = template();
        let view = CoinView::new();
        assert_eq!(sigop_cost(&tx, &view, flags), 4);
        assert_eq!(virtual_sigop_count(sigop_cost(&tx, &view, flags)), 1);

        // Spending a p2wpkh coin adds one witness sigop.
        let coin = Coin::new(
            1,
            block::Height(10),
            false,
            Output {
                value: 1_500,
                lock_script: Script::new_p2wpkh(&[0x44; 20]),
            },
        );
        let view = view_with(vec![(tx.inputs[0].outpoint, coin)]);
        assert_eq!(sigop_cost(&tx, &view, flags), 4 + 1);
        assert_eq!(virtual_sigop_count(sigop_cost(&tx, &view, flags)), 2);

        // Spending a p2sh-wrapped p2wpkh coin also counts one witness sigop:
        // the redeem script itself contains no checksig opcodes.
        let program = Script::new_p2wpkh(&[0x55; 20]);
        let coin = Coin::new(
            1,
            block::Height(10),
            false,
            Output {
                value: 1_500,
                lock_script: Script::new_p2sh(&finch_chain::transparent::hash160(&program.0)),
            },
        );
        tx.inputs[0].unlock_script = Script::from_data_pushes(&[&program.0]);
        let view = view_with(vec![(tx.inputs[0].outpoint, coin)]);
        assert_eq!(sigop_cost(&tx, &view, flags), 4 + 1);
    }
}
