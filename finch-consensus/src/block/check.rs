//! Consensus check functions

use finch_chain::block::Block;

use crate::error::{BlockError, TransactionError};

/// Returns `Ok(())` if there is exactly one coinbase transaction in `Block`,
/// and that coinbase transaction is the first transaction in the block.
pub fn coinbase_is_first(block: &Block) -> Result<(), BlockError> {
    let first = block
        .transactions
        .get(0)
        .ok_or(BlockError::NoTransactions)?;
    let mut rest = block.transactions.iter().skip(1);
    if !first.is_coinbase() {
        return Err(TransactionError::CoinbasePosition)?;
    }
    if rest.any(|tx| tx.contains_coinbase_input()) {
        return Err(TransactionError::CoinbaseInputFound)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use finch_chain::{
        block::Height,
        parameters::{genesis_block, Network},
        transaction::{LockTime, Transaction},
        transparent::{Input, OutPoint, Output, Script, Witness},
    };
    use std::sync::Arc;

    #[test]
    fn genesis_coinbase_is_first() {
        finch_test::init();

        let block = genesis_block(Network::Mainnet);
        coinbase_is_first(&block).expect("genesis has a leading coinbase");
    }

    #[test]
    fn missing_coinbase_is_rejected() {
        finch_test::init();

        let mut block = genesis_block(Network::Mainnet);
        let not_coinbase = Transaction::new(
            1,
            vec![Input {
                outpoint: OutPoint {
                    hash: finch_chain::transaction::Hash([9; 32]),
                    index: 0,
                },
                unlock_script: Script::default(),
                sequence: 0,
                witness: Witness::default(),
            }],
            vec![Output {
                value: 1,
                lock_script: Script::default(),
            }],
            LockTime::Height(Height(0)),
        );
        block.transactions[0] = Arc::new(not_coinbase);

        assert_eq!(
            coinbase_is_first(&block),
            Err(BlockError::Transaction(TransactionError::CoinbasePosition))
        );
    }
}
