//! Byte layouts for the keys and values finch-state keeps in sled.
//!
//! Coins are stored under their 36-byte outpoint in the compressed UTXO
//! encoding; index entries under their 32-byte block hash in the fixed
//! 164-byte entry layout; undo records are a counted list of compressed
//! coins.

use std::convert::TryInto;

use finch_chain::{
    compactint::CompactInt,
    serialization::{BitcoinDeserialize, BitcoinSerialize},
    transparent::{Coin, OutPoint},
};

use crate::block_index::Entry;
use crate::BoxError;

/// The 36-byte sled key for a coin: txid followed by the little-endian
/// output index.
pub(super) fn outpoint_key(outpoint: &OutPoint) -> [u8; 36] {
    let mut key = [0u8; 36];
    key[0..32].copy_from_slice(&outpoint.hash.0);
    key[32..36].copy_from_slice(&outpoint.index.to_le_bytes());
    key
}

pub(super) fn coin_bytes(coin: &Coin) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(64);
    coin.serialize_compressed(&mut bytes)
        .expect("writing to a vec never fails");
    bytes
}

pub(super) fn coin_from_bytes(bytes: &[u8]) -> Result<Coin, BoxError> {
    Ok(Coin::deserialize_compressed(bytes)?)
}

pub(super) fn entry_bytes(entry: &Entry) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(Entry::SERIALIZED_LEN);
    entry
        .bitcoin_serialize(&mut bytes)
        .expect("writing to a vec never fails");
    bytes
}

pub(super) fn entry_from_bytes(bytes: &[u8]) -> Result<Entry, BoxError> {
    Ok(Entry::bitcoin_deserialize(bytes)?)
}

/// The 8-byte value of `meta["F"]`: the active file number and write
/// position.
pub(super) fn file_pointer_bytes(file: i32, pos: u32) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes[0..4].copy_from_slice(&file.to_le_bytes());
    bytes[4..8].copy_from_slice(&pos.to_le_bytes());
    bytes
}

pub(super) fn file_pointer_from_bytes(bytes: &[u8]) -> Result<(i32, u32), BoxError> {
    if bytes.len() != 8 {
        return Err("file pointer record must be exactly 8 bytes".into());
    }
    let file = i32::from_le_bytes(bytes[0..4].try_into()?);
    let pos = u32::from_le_bytes(bytes[4..8].try_into()?);
    Ok((file, pos))
}

/// Serializes an undo record: the spent coins of one block, in consumption
/// order.
pub(super) fn undo_bytes(coins: &[Coin], out: &mut Vec<u8>) {
    CompactInt::from(coins.len())
        .bitcoin_serialize(&mut *out)
        .expect("writing to a vec never fails");
    for coin in coins {
        coin.serialize_compressed(&mut *out)
            .expect("writing to a vec never fails");
    }
}

pub(super) fn undo_from_bytes(bytes: &[u8]) -> Result<Vec<Coin>, BoxError> {
    let mut reader = bytes;
    let count = CompactInt::bitcoin_deserialize(&mut reader)?.value();
    if count > bytes.len() as u64 {
        return Err("undo record count exceeds record size".into());
    }
    let mut coins = Vec::with_capacity(count as usize);
    for _ in 0..count {
        coins.push(Coin::deserialize_compressed(&mut reader)?);
    }
    Ok(coins)
}
