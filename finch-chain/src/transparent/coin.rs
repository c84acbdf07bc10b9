//! Coins (unspent transaction outputs) and the in-memory view used to stage
//! UTXO changes for a block connect or disconnect.

use std::collections::HashMap;
use std::io;

use thiserror::Error;

use crate::{block, transaction::Transaction, SerializationError};

use super::{compress, OutPoint, Output};

/// An unspent transaction output, together with metadata about the
/// transaction that created it.
///
/// A `Coin` marked `spent` is a tombstone: it stays in the view so that the
/// flush can delete the corresponding database entry, but it can no longer
/// be looked up or spent again.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Coin {
    /// The version of the creating transaction.
    pub version: i32,
    /// The height of the block that created this output.
    pub height: block::Height,
    /// Whether the creating transaction was a coinbase.
    pub coinbase: bool,
    /// Whether this coin has been consumed by the view.
    pub spent: bool,
    /// The output itself.
    pub output: Output,
}

impl Coin {
    pub fn new(version: i32, height: block::Height, coinbase: bool, output: Output) -> Coin {
        Coin {
            version,
            height,
            coinbase,
            spent: false,
            output,
        }
    }

    /// Writes this coin in the compressed database encoding: compact varints
    /// for the metadata, then the compressed output.
    ///
    /// The `spent` flag is never serialized; spent coins are deleted from
    /// the store instead.
    pub fn serialize_compressed<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        compress::write_varint(&mut writer, self.version as u32 as u64)?;
        compress::write_varint(
            &mut writer,
            (self.height.0 as u64) << 1 | self.coinbase as u64,
        )?;
        compress::write_varint(&mut writer, compress::compress_amount(self.output.value as u64))?;
        compress::write_compressed_script(&mut writer, &self.output.lock_script)?;
        Ok(())
    }

    /// Reads a coin written by [`Coin::serialize_compressed`].
    pub fn deserialize_compressed<R: io::Read>(mut reader: R) -> Result<Coin, SerializationError> {
        let version = compress::read_varint(&mut reader)? as u32 as i32;
        let code = compress::read_varint(&mut reader)?;
        let height = block::Height((code >> 1) as u32);
        let coinbase = code & 1 == 1;
        let value = compress::decompress_amount(compress::read_varint(&mut reader)?) as i64;
        let lock_script = compress::read_compressed_script(&mut reader)?;
        Ok(Coin {
            version,
            height,
            coinbase,
            spent: false,
            output: Output { value, lock_script },
        })
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ViewError {
    #[error("missing or already spent coin: {0:?}")]
    MissingOrSpent(OutPoint),
}

/// An in-memory transactional overlay on the UTXO set.
///
/// A view is created per block connect or disconnect, filled with the coins
/// the block touches, and consumed by the chain database commit. Spending a
/// coin pushes its previous incarnation onto the undo stack, in the exact
/// order coins are consumed, so a block can later be disconnected.
#[derive(Debug, Default)]
pub struct CoinView {
    coins: HashMap<OutPoint, Coin>,
    undo: Vec<Coin>,
}

impl CoinView {
    pub fn new() -> CoinView {
        CoinView::default()
    }

    /// Returns the unspent coin at `outpoint`, if the view holds one.
    pub fn coin(&self, outpoint: &OutPoint) -> Option<&Coin> {
        self.coins.get(outpoint).filter(|coin| !coin.spent)
    }

    /// Returns `true` if the view holds an unspent coin at `outpoint`.
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.coin(outpoint).is_some()
    }

    /// Returns `true` if the view stages anything at `outpoint`, spent
    /// tombstones included.
    ///
    /// Backing stores use this to avoid resurrecting a coin the view has
    /// already consumed.
    pub fn is_staged(&self, outpoint: &OutPoint) -> bool {
        self.coins.contains_key(outpoint)
    }

    /// Adds a coin to the view, replacing any previous coin at `outpoint`.
    pub fn add(&mut self, outpoint: OutPoint, coin: Coin) {
        self.coins.insert(outpoint, coin);
    }

    /// Marks the coin at `outpoint` as spent, recording it on the undo
    /// stack.
    pub fn spend(&mut self, outpoint: &OutPoint) -> Result<(), ViewError> {
        match self.coins.get_mut(outpoint) {
            Some(coin) if !coin.spent => {
                let mut undone = coin.clone();
                undone.spent = false;
                self.undo.push(undone);
                coin.spent = true;
                Ok(())
            }
            _ => Err(ViewError::MissingOrSpent(*outpoint)),
        }
    }

    /// Spends all of `tx`'s inputs and adds all of its outputs as fresh
    /// coins created at `height`.
    ///
    /// The inputs must already be present in the view; the chain database
    /// fills them in from the store before connecting a block.
    pub fn apply_transaction(
        &mut self,
        tx: &Transaction,
        height: block::Height,
    ) -> Result<(), ViewError> {
        if !tx.is_coinbase() {
            for input in tx.inputs.iter() {
                self.spend(&input.outpoint)?;
            }
        }

        let hash = tx.hash();
        for (index, output) in tx.outputs.iter().enumerate() {
            self.add(
                OutPoint {
                    hash,
                    index: index as u32,
                },
                Coin::new(tx.version, height, tx.is_coinbase(), output.clone()),
            );
        }
        Ok(())
    }

    /// The coins spent so far, in consumption order.
    pub fn undo(&self) -> &[Coin] {
        &self.undo
    }

    /// Pops the most recently spent coin off the undo stack.
    pub fn pop_undo(&mut self) -> Option<Coin> {
        self.undo.pop()
    }

    /// Drains the undo stack, leaving the coin map untouched.
    pub fn take_undo(&mut self) -> Vec<Coin> {
        std::mem::take(&mut self.undo)
    }

    /// Iterates over every staged coin, spent tombstones included.
    pub fn iter(&self) -> impl Iterator<Item = (&OutPoint, &Coin)> {
        self.coins.iter()
    }

    pub fn len(&self) -> usize {
        self.coins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }
}
