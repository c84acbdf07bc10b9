//! Signature hashes: the digests a transaction input actually signs.
//!
//! Two algorithms exist. The legacy (v0) hash serializes a modified copy of
//! the whole transaction per signature. The BIP 143 (v1) hash used by segwit
//! inputs commits to the same data through three reusable sub-hashes, which
//! this module caches across signatures on the same transaction.

use std::io::Write;

use crate::compactint::CompactInt;
use crate::serialization::{sha256d, BitcoinSerialize};
use crate::transparent::Script;

use super::Transaction;

/// Sign all outputs.
pub const SIGHASH_ALL: u8 = 0x01;
/// Sign no outputs.
pub const SIGHASH_NONE: u8 = 0x02;
/// Sign only the output paired with the signed input.
pub const SIGHASH_SINGLE: u8 = 0x03;
/// Commit to this input only, letting others be added.
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;
/// Masks the base mode out of a hash type byte.
pub const SIGHASH_MASK: u8 = 0x1f;

/// A computed signature hash.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SigHash(pub [u8; 32]);

/// The BIP 143 sub-hashes, shared between signatures on the same
/// transaction.
///
/// Each sub-hash is only cacheable in the mode that commits to the whole
/// transaction; the restricted modes (`ANYONECANPAY`, `SINGLE`, `NONE`)
/// bypass the cache.
#[derive(Debug, Default)]
pub struct SigHashCache {
    hash_prevouts: Option<[u8; 32]>,
    hash_sequence: Option<[u8; 32]>,
    hash_outputs: Option<[u8; 32]>,
}

impl SigHashCache {
    pub fn new() -> SigHashCache {
        SigHashCache::default()
    }
}

impl Transaction {
    /// Computes the legacy signature hash for `index`.
    ///
    /// `prev_script` is the script of the output being spent (for P2SH, the
    /// redeem script). `index` must be a valid input index.
    ///
    /// The algorithm serializes a modified copy of the transaction: every
    /// input script is blanked except the signed one, which carries the
    /// previous script with `OP_CODESEPARATOR`s removed; the output list is
    /// truncated or dropped for `SINGLE` and `NONE`.
    pub fn sighash_v0(&self, index: usize, prev_script: &Script, hash_type: u8) -> SigHash {
        let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;
        let base_type = hash_type & SIGHASH_MASK;

        // The famous one-hash bug: SINGLE with no matching output signs the
        // constant below, and consensus preserves it forever.
        if base_type == SIGHASH_SINGLE && index >= self.outputs.len() {
            let mut digest = [0u8; 32];
            digest[0] = 0x01;
            return SigHash(digest);
        }

        let script_code = prev_script.strip_code_separators();

        let mut writer = sha256d::Writer::default();
        let write = |result: Result<(), std::io::Error>| result.expect("Sha256dWriter is infallible");

        write(self.version.bitcoin_serialize(&mut writer));

        if anyone_can_pay {
            write(CompactInt::from(1).bitcoin_serialize(&mut writer));
            let input = &self.inputs[index];
            write(input.outpoint.bitcoin_serialize(&mut writer));
            write(script_code.bitcoin_serialize(&mut writer));
            write(input.sequence.bitcoin_serialize(&mut writer));
        } else {
            write(CompactInt::from(self.inputs.len()).bitcoin_serialize(&mut writer));
            for (i, input) in self.inputs.iter().enumerate() {
                write(input.outpoint.bitcoin_serialize(&mut writer));
                if i == index {
                    write(script_code.bitcoin_serialize(&mut writer));
                } else {
                    write(CompactInt::from(0).bitcoin_serialize(&mut writer));
                }
                let sequence = if i != index
                    && (base_type == SIGHASH_NONE || base_type == SIGHASH_SINGLE)
                {
                    0
                } else {
                    input.sequence
                };
                write(sequence.bitcoin_serialize(&mut writer));
            }
        }

        match base_type {
            SIGHASH_NONE => {
                write(CompactInt::from(0).bitcoin_serialize(&mut writer));
            }
            SIGHASH_SINGLE => {
                write(CompactInt::from(index + 1).bitcoin_serialize(&mut writer));
                for _ in 0..index {
                    // A nulled output: value -1 and an empty script.
                    write((-1i64).bitcoin_serialize(&mut writer));
                    write(CompactInt::from(0).bitcoin_serialize(&mut writer));
                }
                write(self.outputs[index].bitcoin_serialize(&mut writer));
            }
            _ => {
                write(self.outputs.bitcoin_serialize(&mut writer));
            }
        }

        write(self.locktime.bitcoin_serialize(&mut writer));
        write((hash_type as u32).bitcoin_serialize(&mut writer));

        SigHash(writer.finish())
    }

    /// Computes the BIP 143 signature hash for `index`.
    ///
    /// `script_code` is the script the signature commits to (for p2wpkh, the
    /// synthesized p2pkh script) and `value` is the value of the output
    /// being spent. `index` must be a valid input index.
    pub fn sighash_v1(
        &self,
        index: usize,
        script_code: &Script,
        value: i64,
        hash_type: u8,
        cache: &mut SigHashCache,
    ) -> SigHash {
        let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;
        let base_type = hash_type & SIGHASH_MASK;

        let hash_prevouts = if anyone_can_pay {
            [0u8; 32]
        } else {
            *cache.hash_prevouts.get_or_insert_with(|| {
                let mut writer = sha256d::Writer::default();
                for input in self.inputs.iter() {
                    input
                        .outpoint
                        .bitcoin_serialize(&mut writer)
                        .expect("Sha256dWriter is infallible");
                }
                writer.finish()
            })
        };

        let hash_sequence = if anyone_can_pay
            || base_type == SIGHASH_SINGLE
            || base_type == SIGHASH_NONE
        {
            [0u8; 32]
        } else {
            *cache.hash_sequence.get_or_insert_with(|| {
                let mut writer = sha256d::Writer::default();
                for input in self.inputs.iter() {
                    input
                        .sequence
                        .bitcoin_serialize(&mut writer)
                        .expect("Sha256dWriter is infallible");
                }
                writer.finish()
            })
        };

        let hash_outputs = if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
            *cache.hash_outputs.get_or_insert_with(|| {
                let mut writer = sha256d::Writer::default();
                for output in self.outputs.iter() {
                    output
                        .bitcoin_serialize(&mut writer)
                        .expect("Sha256dWriter is infallible");
                }
                writer.finish()
            })
        } else if base_type == SIGHASH_SINGLE && index < self.outputs.len() {
            let mut writer = sha256d::Writer::default();
            self.outputs[index]
                .bitcoin_serialize(&mut writer)
                .expect("Sha256dWriter is infallible");
            writer.finish()
        } else {
            [0u8; 32]
        };

        let input = &self.inputs[index];
        let mut writer = sha256d::Writer::default();
        let write = |result: Result<(), std::io::Error>| result.expect("Sha256dWriter is infallible");

        write(self.version.bitcoin_serialize(&mut writer));
        write(writer.write_all(&hash_prevouts));
        write(writer.write_all(&hash_sequence));
        write(input.outpoint.bitcoin_serialize(&mut writer));
        write(script_code.bitcoin_serialize(&mut writer));
        write(value.bitcoin_serialize(&mut writer));
        write(input.sequence.bitcoin_serialize(&mut writer));
        write(writer.write_all(&hash_outputs));
        write(self.locktime.bitcoin_serialize(&mut writer));
        write((hash_type as u32).bitcoin_serialize(&mut writer));

        SigHash(writer.finish())
    }
}
