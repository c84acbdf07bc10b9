//! Errors that can occur when checking consensus rules.
//!
//! Each variant's display string is the exact reject reason sent to peers,
//! and [`TransactionError::score`] gives the misbehavior score the peer
//! layer applies to whoever relayed the offending transaction.

use thiserror::Error;

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum TransactionError {
    #[error("bad-txns-vin-empty")]
    NoInputs,

    #[error("bad-txns-vout-empty")]
    NoOutputs,

    #[error("bad-txns-oversize")]
    Oversize,

    #[error("bad-txns-vout-negative")]
    OutputValueNegative,

    #[error("bad-txns-vout-toolarge")]
    OutputValueTooLarge,

    #[error("bad-txns-txouttotal-toolarge")]
    OutputTotalTooLarge,

    #[error("bad-txns-inputs-duplicate")]
    DuplicateInputs,

    #[error("bad-cb-length")]
    CoinbaseLength,

    #[error("bad-txns-prevout-null")]
    PrevoutNull,

    #[error("bad-txns-inputs-missingorspent")]
    MissingOrSpentInput,

    #[error("bad-txns-premature-spend-of-coinbase")]
    PrematureCoinbaseSpend,

    #[error("bad-txns-inputvalues-outofrange")]
    InputValuesOutOfRange,

    #[error("bad-txns-in-belowout")]
    InputsBelowOutputs,

    #[error("bad-txns-fee-negative")]
    FeeNegative,

    #[error("bad-txns-fee-outofrange")]
    FeeOutOfRange,

    #[error("bad-cb-missing")]
    CoinbasePosition,

    #[error("bad-cb-multiple")]
    CoinbaseInputFound,
}

impl TransactionError {
    /// The reject reason string for this error, as sent on the wire.
    pub fn reject_reason(&self) -> String {
        self.to_string()
    }

    /// The misbehavior score the peer layer should apply to the relaying
    /// peer.
    ///
    /// Zero-score errors can happen honestly, e.g. when a peer relays a
    /// transaction that raced a conflicting spend.
    pub fn score(&self) -> u32 {
        use TransactionError::*;
        match self {
            MissingOrSpentInput | PrematureCoinbaseSpend => 0,
            PrevoutNull => 10,
            _ => 100,
        }
    }
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum BlockError {
    #[error("block has no transactions")]
    NoTransactions,

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),
}
