//! Signing and verification of the standard output forms: p2pk, p2pkh,
//! p2wpkh, and p2sh-wrapped p2wpkh.
//!
//! This is not a general script interpreter. It mirrors the signer: each
//! form is recognized from the previous output's script, the appropriate
//! signature hash is computed, and the ECDSA signature is checked against
//! the committed public key.

use lazy_static::lazy_static;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey, Signature};
use thiserror::Error;

use crate::transparent::{hash160, CoinView, Output, Script, VerificationFlags, Witness};

use super::{SigHash, SigHashCache, Transaction};

lazy_static! {
    static ref SECP256K1: Secp256k1<secp256k1::All> = Secp256k1::new();
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignError {
    /// The previous output's script is not one of the standard forms the
    /// signer knows how to satisfy.
    #[error("unsupported previous output script")]
    UnsupportedScript,
    /// The previous output commits to a different key.
    #[error("previous output does not pay the provided key")]
    KeyMismatch,
    #[error("secp256k1 error: {0}")]
    Secp(#[from] secp256k1::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    /// Some input's previous output is not in the view.
    #[error("missing or spent coin: {0:?}")]
    MissingCoin(crate::transparent::OutPoint),
    /// The previous output's script is not one of the standard forms.
    #[error("unsupported previous output script")]
    UnsupportedScript,
    /// The script-sig or witness does not have the shape the previous
    /// output requires.
    #[error("malformed script-sig or witness")]
    MalformedInput,
    /// The committed key or script hash does not match.
    #[error("hash mismatch in script or witness program")]
    HashMismatch,
    /// The ECDSA signature is invalid.
    #[error("invalid signature")]
    InvalidSignature,
}

impl From<secp256k1::Error> for VerifyError {
    fn from(_: secp256k1::Error) -> Self {
        VerifyError::InvalidSignature
    }
}

/// Splits a `signature ‖ hash-type` push into its parts.
fn split_signature(push: &[u8]) -> Result<(Signature, u8), VerifyError> {
    let (hash_type, der) = push.split_last().ok_or(VerifyError::MalformedInput)?;
    let signature = Signature::from_der(der).map_err(|_| VerifyError::InvalidSignature)?;
    Ok((signature, *hash_type))
}

fn check_signature(sighash: &SigHash, signature: &Signature, key: &[u8]) -> Result<(), VerifyError> {
    let message = Message::from_slice(&sighash.0).expect("a sighash is exactly 32 bytes");
    let key = PublicKey::from_slice(key).map_err(|_| VerifyError::MalformedInput)?;
    SECP256K1
        .verify(&message, signature, &key)
        .map_err(|_| VerifyError::InvalidSignature)
}

impl Transaction {
    /// Signs input `index` against the previous output `prev_output`,
    /// placing the signature in the input's script-sig or witness as the
    /// output form requires.
    ///
    /// Only the standard single-key forms are supported; multisig, bare
    /// p2sh, and taproot spends are the wallet's problem, not this
    /// library's.
    pub fn sign_input(
        &mut self,
        index: usize,
        prev_output: &Output,
        hash_type: u8,
        secret: &SecretKey,
        cache: &mut SigHashCache,
    ) -> Result<(), SignError> {
        let public = PublicKey::from_secret_key(&SECP256K1, secret);
        let compressed = public.serialize();
        let uncompressed = public.serialize_uncompressed();

        let prev_script = &prev_output.lock_script;

        if let Some(key) = prev_script.p2pk_key() {
            if key != &compressed[..] && key != &uncompressed[..] {
                return Err(SignError::KeyMismatch);
            }
            let sighash = self.sighash_v0(index, prev_script, hash_type);
            let signature = self.make_signature(&sighash, secret, hash_type);
            self.inputs[index].unlock_script = Script::from_data_pushes(&[&signature]);
            return Ok(());
        }

        if let Some(key_hash) = prev_script.p2pkh_hash() {
            let key: &[u8] = if key_hash == hash160(&compressed) {
                &compressed
            } else if key_hash == hash160(&uncompressed) {
                &uncompressed
            } else {
                return Err(SignError::KeyMismatch);
            };
            let sighash = self.sighash_v0(index, prev_script, hash_type);
            let signature = self.make_signature(&sighash, secret, hash_type);
            self.inputs[index].unlock_script = Script::from_data_pushes(&[&signature, key]);
            return Ok(());
        }

        if let Some(program) = prev_script.p2wpkh_program() {
            if program != hash160(&compressed) {
                return Err(SignError::KeyMismatch);
            }
            let signature =
                self.sign_witness_v0(index, &compressed, prev_output.value, hash_type, secret, cache);
            self.inputs[index].unlock_script = Script::default();
            self.inputs[index].witness = Witness(vec![signature, compressed.to_vec()]);
            return Ok(());
        }

        if let Some(script_hash) = prev_script.p2sh_hash() {
            // The only p2sh redeem form we can satisfy is a wrapped p2wpkh
            // program for our own key.
            let program = Script::new_p2wpkh(&hash160(&compressed));
            if script_hash != hash160(&program.0) {
                return Err(SignError::UnsupportedScript);
            }
            let signature =
                self.sign_witness_v0(index, &compressed, prev_output.value, hash_type, secret, cache);
            self.inputs[index].unlock_script = Script::from_data_pushes(&[&program.0]);
            self.inputs[index].witness = Witness(vec![signature, compressed.to_vec()]);
            return Ok(());
        }

        Err(SignError::UnsupportedScript)
    }

    /// Produces the `signature ‖ hash-type` push for a BIP 143 key spend.
    fn sign_witness_v0(
        &self,
        index: usize,
        compressed_key: &[u8; 33],
        value: i64,
        hash_type: u8,
        secret: &SecretKey,
        cache: &mut SigHashCache,
    ) -> Vec<u8> {
        let script_code = Script::new_p2pkh(&hash160(compressed_key));
        let sighash = self.sighash_v1(index, &script_code, value, hash_type, cache);
        self.make_signature(&sighash, secret, hash_type)
    }

    fn make_signature(&self, sighash: &SigHash, secret: &SecretKey, hash_type: u8) -> Vec<u8> {
        let message = Message::from_slice(&sighash.0).expect("a sighash is exactly 32 bytes");
        let signature = SECP256K1.sign(&message, secret);
        let mut bytes = signature.serialize_der().to_vec();
        bytes.push(hash_type);
        bytes
    }

    /// Verifies every input of this transaction against the coins in
    /// `view`.
    ///
    /// Coinbase transactions have no previous outputs and succeed
    /// trivially.
    pub fn verify(&self, view: &CoinView, flags: VerificationFlags) -> Result<(), VerifyError> {
        if self.is_coinbase() {
            return Ok(());
        }
        let mut cache = SigHashCache::new();
        for (index, input) in self.inputs.iter().enumerate() {
            let coin = view
                .coin(&input.outpoint)
                .ok_or(VerifyError::MissingCoin(input.outpoint))?;
            self.verify_input(index, &coin.output, flags, &mut cache)?;
        }
        Ok(())
    }

    /// Verifies input `index` against the previous output `prev_output`.
    pub fn verify_input(
        &self,
        index: usize,
        prev_output: &Output,
        flags: VerificationFlags,
        cache: &mut SigHashCache,
    ) -> Result<(), VerifyError> {
        let input = &self.inputs[index];
        let prev_script = &prev_output.lock_script;

        if let Some(key) = prev_script.p2pk_key() {
            let pushes = input
                .unlock_script
                .parse_push_only()
                .ok_or(VerifyError::MalformedInput)?;
            if pushes.len() != 1 {
                return Err(VerifyError::MalformedInput);
            }
            let (signature, hash_type) = split_signature(pushes[0])?;
            let sighash = self.sighash_v0(index, prev_script, hash_type);
            return check_signature(&sighash, &signature, key);
        }

        if let Some(key_hash) = prev_script.p2pkh_hash() {
            let pushes = input
                .unlock_script
                .parse_push_only()
                .ok_or(VerifyError::MalformedInput)?;
            if pushes.len() != 2 {
                return Err(VerifyError::MalformedInput);
            }
            let key = pushes[1];
            if key_hash != hash160(key) {
                return Err(VerifyError::HashMismatch);
            }
            let (signature, hash_type) = split_signature(pushes[0])?;
            let sighash = self.sighash_v0(index, prev_script, hash_type);
            return check_signature(&sighash, &signature, key);
        }

        if let Some(program) = prev_script.p2wpkh_program() {
            if !flags.contains(VerificationFlags::WITNESS) {
                // Pre-segwit rules: a witness program is a trivially true
                // script.
                return Ok(());
            }
            if !input.unlock_script.is_empty() {
                return Err(VerifyError::MalformedInput);
            }
            return self.verify_witness_v0(index, program, prev_output.value, &input.witness, cache);
        }

        if let Some(script_hash) = prev_script.p2sh_hash() {
            let pushes = input
                .unlock_script
                .parse_push_only()
                .ok_or(VerifyError::MalformedInput)?;
            let redeem = *pushes.last().ok_or(VerifyError::MalformedInput)?;
            if script_hash != hash160(redeem) {
                return Err(VerifyError::HashMismatch);
            }
            if !flags.contains(VerificationFlags::P2SH) {
                // Pre-BIP16 rules only check the hash.
                return Ok(());
            }
            let redeem = Script(redeem.to_vec());
            if let Some(program) = redeem.p2wpkh_program() {
                if !flags.contains(VerificationFlags::WITNESS) {
                    return Ok(());
                }
                if pushes.len() != 1 {
                    return Err(VerifyError::MalformedInput);
                }
                return self.verify_witness_v0(
                    index,
                    program,
                    prev_output.value,
                    &input.witness,
                    cache,
                );
            }
            return Err(VerifyError::UnsupportedScript);
        }

        Err(VerifyError::UnsupportedScript)
    }

    /// Verifies a p2wpkh witness: `(signature ‖ hash-type, pubkey)`.
    fn verify_witness_v0(
        &self,
        index: usize,
        program: &[u8],
        value: i64,
        witness: &Witness,
        cache: &mut SigHashCache,
    ) -> Result<(), VerifyError> {
        if witness.0.len() != 2 {
            return Err(VerifyError::MalformedInput);
        }
        let key = &witness.0[1];
        if program != hash160(key) {
            return Err(VerifyError::HashMismatch);
        }
        let (signature, hash_type) = split_signature(&witness.0[0])?;
        let script_code = {
            let mut key_hash = [0u8; 20];
            key_hash.copy_from_slice(program);
            Script::new_p2pkh(&key_hash)
        };
        let sighash = self.sighash_v1(index, &script_code, value, hash_type, cache);
        check_signature(&sighash, &signature, key)
    }
}
