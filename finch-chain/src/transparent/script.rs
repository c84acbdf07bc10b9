//! Bitcoin scripts: opaque byte programs with just enough structure exposed
//! to classify the standard output forms, count signature operations, and
//! build the scripts the signer needs.

use std::{
    fmt,
    io::{self, Read},
};

use ripemd160::{Digest as Ripemd160Digest, Ripemd160};
use sha2::{Digest, Sha256};

use crate::{
    compactint::CompactInt,
    serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError},
};

/// The consensus limit on the byte length of a script.
pub const MAX_SCRIPT_SIZE: usize = 10_000;

// The opcodes the library needs to recognize. Everything else is opaque.
const OP_PUSHDATA1: u8 = 0x4c;
const OP_PUSHDATA2: u8 = 0x4d;
const OP_PUSHDATA4: u8 = 0x4e;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;
const OP_DUP: u8 = 0x76;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_HASH160: u8 = 0xa9;
const OP_CODESEPARATOR: u8 = 0xab;
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKSIGVERIFY: u8 = 0xad;
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;

bitflags::bitflags! {
    /// Script verification flags, using bitcoind's bit positions.
    pub struct VerificationFlags: u32 {
        /// Evaluate pay-to-script-hash redeem scripts (BIP 16).
        const P2SH = 1 << 0;
        /// Enforce witness programs (BIP 141).
        const WITNESS = 1 << 11;
    }
}

/// RIPEMD160(SHA256(data)), the hash used in pay-to-pubkey-hash and
/// pay-to-script-hash outputs.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(&sha);
    let mut result = [0u8; 20];
    result.copy_from_slice(&ripemd);
    result
}

/// An encoding of a Bitcoin script.
#[derive(Clone, Default, Eq, PartialEq, Serialize, Deserialize, Hash)]
pub struct Script(pub Vec<u8>);

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("Script")
            .field(&hex::encode(&self.0))
            .finish()
    }
}

impl Script {
    pub fn serialized_size(&self) -> usize {
        CompactInt::size(self.0.len()) + self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    // --- classification -------------------------------------------------

    /// If this is a pay-to-pubkey output script, returns the raw public key.
    pub fn p2pk_key(&self) -> Option<&[u8]> {
        let s = &self.0;
        if s.len() == 35 && s[0] == 33 && s[34] == OP_CHECKSIG && (s[1] == 0x02 || s[1] == 0x03) {
            return Some(&s[1..34]);
        }
        if s.len() == 67 && s[0] == 65 && s[66] == OP_CHECKSIG && s[1] == 0x04 {
            return Some(&s[1..66]);
        }
        None
    }

    /// If this is a pay-to-pubkey-hash output script, returns the 20-byte
    /// key hash.
    pub fn p2pkh_hash(&self) -> Option<&[u8]> {
        let s = &self.0;
        if s.len() == 25
            && s[0] == OP_DUP
            && s[1] == OP_HASH160
            && s[2] == 20
            && s[23] == OP_EQUALVERIFY
            && s[24] == OP_CHECKSIG
        {
            Some(&s[3..23])
        } else {
            None
        }
    }

    /// If this is a pay-to-script-hash output script, returns the 20-byte
    /// script hash.
    pub fn p2sh_hash(&self) -> Option<&[u8]> {
        let s = &self.0;
        if s.len() == 23 && s[0] == OP_HASH160 && s[1] == 20 && s[22] == OP_EQUAL {
            Some(&s[2..22])
        } else {
            None
        }
    }

    /// If this is a version-0 pay-to-witness-pubkey-hash program, returns the
    /// 20-byte key hash.
    pub fn p2wpkh_program(&self) -> Option<&[u8]> {
        let s = &self.0;
        if s.len() == 22 && s[0] == 0x00 && s[1] == 20 {
            Some(&s[2..22])
        } else {
            None
        }
    }

    /// If this is a version-0 pay-to-witness-script-hash program, returns the
    /// 32-byte script hash.
    pub fn p2wsh_program(&self) -> Option<&[u8]> {
        let s = &self.0;
        if s.len() == 34 && s[0] == 0x00 && s[1] == 32 {
            Some(&s[2..34])
        } else {
            None
        }
    }

    // --- builders -------------------------------------------------------

    pub fn new_p2pk(key: &[u8]) -> Script {
        let mut script = Vec::with_capacity(key.len() + 2);
        push_data(&mut script, key);
        script.push(OP_CHECKSIG);
        Script(script)
    }

    pub fn new_p2pkh(key_hash: &[u8; 20]) -> Script {
        let mut script = Vec::with_capacity(25);
        script.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
        script.extend_from_slice(key_hash);
        script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Script(script)
    }

    pub fn new_p2sh(script_hash: &[u8; 20]) -> Script {
        let mut script = Vec::with_capacity(23);
        script.extend_from_slice(&[OP_HASH160, 20]);
        script.extend_from_slice(script_hash);
        script.push(OP_EQUAL);
        Script(script)
    }

    pub fn new_p2wpkh(key_hash: &[u8; 20]) -> Script {
        let mut script = Vec::with_capacity(22);
        script.extend_from_slice(&[0x00, 20]);
        script.extend_from_slice(key_hash);
        Script(script)
    }

    /// Builds a script that pushes each item in `items` and does nothing
    /// else, as used for script-sigs of the standard forms.
    pub fn from_data_pushes(items: &[&[u8]]) -> Script {
        let mut script = Vec::new();
        for item in items {
            push_data(&mut script, item);
        }
        Script(script)
    }

    // --- structure ------------------------------------------------------

    /// If this script consists only of data pushes, returns the pushed
    /// items, in order.
    pub fn parse_push_only(&self) -> Option<Vec<&[u8]>> {
        let mut items = Vec::new();
        let mut pos = 0;
        while pos < self.0.len() {
            let opcode = self.0[pos];
            pos += 1;
            let (skip, len) = push_len(opcode, &self.0[pos..])?;
            if opcode > OP_PUSHDATA4 {
                return None;
            }
            items.push(&self.0[pos + skip..pos + skip + len]);
            pos += skip + len;
        }
        Some(items)
    }

    /// Returns the last item pushed by a push-only script, e.g. the redeem
    /// script of a P2SH script-sig.
    pub fn last_push(&self) -> Option<&[u8]> {
        self.parse_push_only()?.pop()
    }

    /// Returns a copy of this script with every `OP_CODESEPARATOR` opcode
    /// removed, as required by the legacy signature hash.
    ///
    /// Separator bytes inside push data are not opcodes and are preserved.
    pub fn strip_code_separators(&self) -> Script {
        let mut out = Vec::with_capacity(self.0.len());
        let mut pos = 0;
        while pos < self.0.len() {
            let opcode = self.0[pos];
            let (skip, len) = match push_len(opcode, &self.0[pos + 1..]) {
                Some(lens) => lens,
                None => {
                    // Truncated push: keep the malformed tail verbatim.
                    out.extend_from_slice(&self.0[pos..]);
                    break;
                }
            };
            let end = pos + 1 + skip + len;
            if opcode != OP_CODESEPARATOR {
                out.extend_from_slice(&self.0[pos..end]);
            }
            pos = end;
        }
        Script(out)
    }

    // --- signature operations -------------------------------------------

    /// Counts the signature operations in this script.
    ///
    /// With `accurate` set, a CHECKMULTISIG preceded by a small-integer push
    /// counts as that many operations; otherwise it counts as the maximum of
    /// 20. Counting stops at the first malformed opcode, matching bitcoind.
    pub fn sigop_count(&self, accurate: bool) -> u64 {
        let mut count = 0u64;
        let mut last_opcode = 0xffu8;
        let mut pos = 0;
        while pos < self.0.len() {
            let opcode = self.0[pos];
            let (skip, len) = match push_len(opcode, &self.0[pos + 1..]) {
                Some(lens) => lens,
                None => break,
            };
            match opcode {
                OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
                OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                    if accurate && (OP_1..=OP_16).contains(&last_opcode) {
                        count += (last_opcode - OP_1 + 1) as u64;
                    } else {
                        count += 20;
                    }
                }
                _ => {}
            }
            last_opcode = opcode;
            pos += 1 + skip + len;
        }
        count
    }

    /// Counts the signature operations of the redeem script spent by
    /// `script_sig`, assuming `self` is a P2SH output script.
    ///
    /// Returns zero when the script-sig is not push-only, which can never
    /// spend a P2SH output.
    pub fn p2sh_sigop_count(&self, script_sig: &Script) -> u64 {
        if self.p2sh_hash().is_none() {
            return self.sigop_count(true);
        }
        match script_sig.last_push() {
            Some(redeem) => Script(redeem.to_vec()).sigop_count(true),
            None => 0,
        }
    }
}

/// Appends a minimal push of `data` to `script`.
fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0..=75 => script.push(data.len() as u8),
        76..=255 => {
            script.push(OP_PUSHDATA1);
            script.push(data.len() as u8);
        }
        _ => {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(data.len() as u16).to_le_bytes());
        }
    }
    script.extend_from_slice(data);
}

/// For `opcode` followed by `rest`, returns the number of push-header bytes
/// to skip and the length of the pushed data. Non-push opcodes return
/// `(0, 0)`; truncated pushes return `None`.
fn push_len(opcode: u8, rest: &[u8]) -> Option<(usize, usize)> {
    let (skip, len) = match opcode {
        0x01..=0x4b => (0, opcode as usize),
        OP_PUSHDATA1 => (1, *rest.first()? as usize),
        OP_PUSHDATA2 => {
            if rest.len() < 2 {
                return None;
            }
            (2, u16::from_le_bytes([rest[0], rest[1]]) as usize)
        }
        OP_PUSHDATA4 => {
            if rest.len() < 4 {
                return None;
            }
            (4, u32::from_le_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize)
        }
        _ => (0, 0),
    };
    if rest.len() < skip + len {
        return None;
    }
    Some((skip, len))
}

impl BitcoinSerialize for Script {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        CompactInt::from(self.0.len()).bitcoin_serialize(&mut writer)?;
        writer.write_all(&self.0[..])?;
        Ok(())
    }
}

impl BitcoinDeserialize for Script {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        let len = CompactInt::bitcoin_deserialize(&mut reader)?.value();
        if len > MAX_SCRIPT_SIZE as u64 {
            return Err(SerializationError::Parse("script exceeds maximum size"));
        }
        let mut bytes = Vec::with_capacity(len as usize);
        reader.take(len).read_to_end(&mut bytes)?;
        if bytes.len() as u64 != len {
            return Err(SerializationError::Parse("truncated script"));
        }
        Ok(Script(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_standard_forms() {
        finch_test::init();

        let key = [0x02u8; 33];
        let key_hash = hash160(&key);

        let p2pk = Script::new_p2pk(&key);
        assert_eq!(p2pk.p2pk_key(), Some(&key[..]));
        assert!(p2pk.p2pkh_hash().is_none());

        let p2pkh = Script::new_p2pkh(&key_hash);
        assert_eq!(p2pkh.p2pkh_hash(), Some(&key_hash[..]));

        let p2wpkh = Script::new_p2wpkh(&key_hash);
        assert_eq!(p2wpkh.p2wpkh_program(), Some(&key_hash[..]));

        let p2sh = Script::new_p2sh(&hash160(&p2wpkh.0));
        assert!(p2sh.p2sh_hash().is_some());
    }

    #[test]
    fn sigop_counting() {
        finch_test::init();

        let p2pkh = Script::new_p2pkh(&[0u8; 20]);
        assert_eq!(p2pkh.sigop_count(false), 1);

        // 2-of-3 multisig: OP_2 <k1> <k2> <k3> OP_3 OP_CHECKMULTISIG
        let mut multisig = vec![OP_1 + 1];
        for _ in 0..3 {
            push_data(&mut multisig, &[0x02; 33]);
        }
        multisig.push(OP_1 + 2);
        multisig.push(OP_CHECKMULTISIG);
        let multisig = Script(multisig);
        assert_eq!(multisig.sigop_count(false), 20);
        assert_eq!(multisig.sigop_count(true), 3);
    }

    #[test]
    fn code_separator_stripping() {
        // <0xab> pushed as data must survive; the bare opcode must not.
        let mut script = Vec::new();
        push_data(&mut script, &[OP_CODESEPARATOR]);
        script.push(OP_CODESEPARATOR);
        script.push(OP_CHECKSIG);
        let stripped = Script(script).strip_code_separators();
        assert_eq!(stripped.0, vec![0x01, OP_CODESEPARATOR, OP_CHECKSIG]);
    }

    #[test]
    fn push_only_parsing() {
        let script = Script::from_data_pushes(&[&[1, 2, 3], &[4; 100]]);
        let items = script.parse_push_only().expect("script is push-only");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], &[1, 2, 3]);
        assert_eq!(script.last_push().unwrap(), &[4; 100][..]);

        let not_pushes = Script(vec![OP_DUP]);
        assert!(not_pushes.parse_push_only().is_none());
    }
}
