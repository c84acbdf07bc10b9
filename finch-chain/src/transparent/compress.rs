//! The compressed coin encoding used for the on-disk UTXO set: bitcoind's
//! compact varints, amount compression, and the six special script forms.

use std::io::{self, Read};

use crate::serialization::SerializationError;

use super::{Script, MAX_SCRIPT_SIZE};

/// The number of script encodings reserved for the special (template)
/// forms; larger values encode a raw script of `n - SPECIAL_SCRIPTS` bytes.
const SPECIAL_SCRIPTS: u64 = 6;

/// Writes `n` in the compact varint format: big-endian base-128 with the
/// high bit as a continuation flag, and each continuation byte offset by
/// one so that every integer has exactly one encoding.
pub(super) fn write_varint<W: io::Write>(mut writer: W, mut n: u64) -> Result<(), io::Error> {
    let mut tmp = [0u8; 10];
    let mut len = 0;
    loop {
        tmp[len] = (n & 0x7f) as u8 | if len > 0 { 0x80 } else { 0x00 };
        if n <= 0x7f {
            break;
        }
        n = (n >> 7) - 1;
        len += 1;
    }
    while len > 0 {
        writer.write_all(&tmp[len..len + 1])?;
        len -= 1;
    }
    writer.write_all(&tmp[0..1])
}

/// Reads a compact varint written by [`write_varint`].
pub(super) fn read_varint<R: Read>(mut reader: R) -> Result<u64, SerializationError> {
    let mut n: u64 = 0;
    loop {
        let mut byte = [0u8; 1];
        reader.read_exact(&mut byte)?;
        let byte = byte[0];
        if n > (u64::MAX >> 7) {
            return Err(SerializationError::Parse("varint overflows u64"));
        }
        n = (n << 7) | (byte & 0x7f) as u64;
        if byte & 0x80 != 0 {
            if n == u64::MAX {
                return Err(SerializationError::Parse("varint overflows u64"));
            }
            n += 1;
        } else {
            return Ok(n);
        }
    }
}

/// Compresses a satoshi amount.
///
/// Amounts are usually round numbers, so this stores the count of trailing
/// decimal zeroes and the remaining digits rather than the full integer.
pub(super) fn compress_amount(mut n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut e = 0u64;
    while n % 10 == 0 && e < 9 {
        n /= 10;
        e += 1;
    }
    if e < 9 {
        let d = n % 10;
        n /= 10;
        1 + (n * 9 + d - 1) * 10 + e
    } else {
        1 + (n - 1) * 10 + 9
    }
}

/// Inverse of [`compress_amount`].
pub(super) fn decompress_amount(x: u64) -> u64 {
    if x == 0 {
        return 0;
    }
    let x = x - 1;
    let e = x % 10;
    let x = x / 10;
    let mut n = if e < 9 {
        let d = (x % 9) + 1;
        (x / 9) * 10 + d
    } else {
        x + 1
    };
    for _ in 0..e {
        n *= 10;
    }
    n
}

/// Writes `script` in compressed form: a varint header selecting one of the
/// template forms (p2pkh, p2sh, and the three p2pk layouts) or a raw
/// length-offset encoding.
pub(super) fn write_compressed_script<W: io::Write>(
    mut writer: W,
    script: &Script,
) -> Result<(), io::Error> {
    if let Some(key_hash) = script.p2pkh_hash() {
        write_varint(&mut writer, 0x00)?;
        return writer.write_all(key_hash);
    }
    if let Some(script_hash) = script.p2sh_hash() {
        write_varint(&mut writer, 0x01)?;
        return writer.write_all(script_hash);
    }
    if let Some(key) = script.p2pk_key() {
        if key.len() == 33 {
            write_varint(&mut writer, key[0] as u64)?;
            return writer.write_all(&key[1..]);
        }
        // Uncompressed keys are stored as 32 bytes plus the parity of y,
        // but only when the point is actually on the curve, since
        // decompression must be able to reconstruct it.
        if secp256k1::PublicKey::from_slice(key).is_ok() {
            write_varint(&mut writer, 0x04 | (key[64] & 0x01) as u64)?;
            return writer.write_all(&key[1..33]);
        }
    }
    write_varint(&mut writer, script.0.len() as u64 + SPECIAL_SCRIPTS)?;
    writer.write_all(&script.0)
}

/// Reads a script written by [`write_compressed_script`].
pub(super) fn read_compressed_script<R: Read>(
    mut reader: R,
) -> Result<Script, SerializationError> {
    let header = read_varint(&mut reader)?;
    match header {
        0x00 => {
            let mut key_hash = [0u8; 20];
            reader.read_exact(&mut key_hash)?;
            Ok(Script::new_p2pkh(&key_hash))
        }
        0x01 => {
            let mut script_hash = [0u8; 20];
            reader.read_exact(&mut script_hash)?;
            Ok(Script::new_p2sh(&script_hash))
        }
        0x02 | 0x03 => {
            let mut key = [0u8; 33];
            key[0] = header as u8;
            reader.read_exact(&mut key[1..])?;
            Ok(Script::new_p2pk(&key))
        }
        0x04 | 0x05 => {
            let mut compressed = [0u8; 33];
            compressed[0] = 0x02 | (header as u8 & 0x01);
            reader.read_exact(&mut compressed[1..])?;
            let key = secp256k1::PublicKey::from_slice(&compressed)
                .map_err(|_| SerializationError::Parse("invalid public key in coin"))?;
            Ok(Script::new_p2pk(&key.serialize_uncompressed()))
        }
        n => {
            let len = n - SPECIAL_SCRIPTS;
            if len > MAX_SCRIPT_SIZE as u64 {
                return Err(SerializationError::Parse("compressed script too large"));
            }
            let mut bytes = vec![0u8; len as usize];
            reader.read_exact(&mut bytes)?;
            Ok(Script(bytes))
        }
    }
}
