//! Sign-then-verify round trips for every standard output form.

use secp256k1::{PublicKey, Secp256k1, SecretKey};

use crate::block::Height;
use crate::transaction::{
    LockTime, SigHashCache, SignError, Transaction, VerifyError, SIGHASH_ALL,
};
use crate::transparent::{
    hash160, Input, OutPoint, Output, Script, VerificationFlags, Witness,
};

fn test_key() -> (SecretKey, [u8; 33], [u8; 65]) {
    let secret = SecretKey::from_slice(&[0x42; 32]).expect("constant key is valid");
    let public = PublicKey::from_secret_key(&Secp256k1::new(), &secret);
    (secret, public.serialize(), public.serialize_uncompressed())
}

/// A transaction spending one output of the given script to a throwaway
/// p2pkh output.
fn spending_tx() -> Transaction {
    Transaction::new(
        2,
        vec![Input {
            outpoint: OutPoint {
                hash: crate::transaction::Hash([0xab; 32]),
                index: 1,
            },
            unlock_script: Script::default(),
            sequence: 0xffff_fffe,
            witness: Witness::default(),
        }],
        vec![Output {
            value: 40_000,
            lock_script: Script::new_p2pkh(&[0x99; 20]),
        }],
        LockTime::Height(Height(0)),
    )
}

fn roundtrip(lock_script: Script) {
    let (secret, _, _) = test_key();
    let prev_output = Output {
        value: 50_000,
        lock_script,
    };

    let mut tx = spending_tx();
    let mut cache = SigHashCache::new();
    tx.sign_input(0, &prev_output, SIGHASH_ALL, &secret, &mut cache)
        .expect("signing a standard form succeeds");

    let mut cache = SigHashCache::new();
    let flags = VerificationFlags::P2SH | VerificationFlags::WITNESS;
    tx.verify_input(0, &prev_output, flags, &mut cache)
        .expect("fresh signature verifies");
}

#[test]
fn p2pk_compressed_roundtrip() {
    finch_test::init();
    let (_, compressed, _) = test_key();
    roundtrip(Script::new_p2pk(&compressed));
}

#[test]
fn p2pk_uncompressed_roundtrip() {
    finch_test::init();
    let (_, _, uncompressed) = test_key();
    roundtrip(Script::new_p2pk(&uncompressed));
}

#[test]
fn p2pkh_roundtrip() {
    finch_test::init();
    let (_, compressed, _) = test_key();
    roundtrip(Script::new_p2pkh(&hash160(&compressed)));
}

#[test]
fn p2wpkh_roundtrip() {
    finch_test::init();
    let (_, compressed, _) = test_key();
    roundtrip(Script::new_p2wpkh(&hash160(&compressed)));
}

#[test]
fn p2sh_p2wpkh_roundtrip() {
    finch_test::init();
    let (_, compressed, _) = test_key();
    let program = Script::new_p2wpkh(&hash160(&compressed));
    roundtrip(Script::new_p2sh(&hash160(&program.0)));
}

#[test]
fn wrong_key_is_rejected() {
    finch_test::init();

    let (secret, compressed, _) = test_key();
    let other_hash = [0x31; 20];
    let prev_output = Output {
        value: 50_000,
        lock_script: Script::new_p2pkh(&other_hash),
    };
    assert_ne!(hash160(&compressed), other_hash);

    let mut tx = spending_tx();
    let mut cache = SigHashCache::new();
    assert_eq!(
        tx.sign_input(0, &prev_output, SIGHASH_ALL, &secret, &mut cache),
        Err(SignError::KeyMismatch)
    );
}

#[test]
fn tampered_output_fails_verification() {
    finch_test::init();

    let (secret, compressed, _) = test_key();
    let prev_output = Output {
        value: 50_000,
        lock_script: Script::new_p2pkh(&hash160(&compressed)),
    };

    let mut tx = spending_tx();
    let mut cache = SigHashCache::new();
    tx.sign_input(0, &prev_output, SIGHASH_ALL, &secret, &mut cache)
        .unwrap();

    // Redirecting the payment invalidates the ALL signature.
    tx.outputs[0].value = 39_999;

    let mut cache = SigHashCache::new();
    let flags = VerificationFlags::P2SH | VerificationFlags::WITNESS;
    assert_eq!(
        tx.verify_input(0, &prev_output, flags, &mut cache),
        Err(VerifyError::InvalidSignature)
    );
}

#[test]
fn nonstandard_script_is_unsupported() {
    finch_test::init();

    let (secret, _, _) = test_key();
    let prev_output = Output {
        value: 50_000,
        // OP_TRUE
        lock_script: Script(vec![0x51]),
    };

    let mut tx = spending_tx();
    let mut cache = SigHashCache::new();
    assert_eq!(
        tx.sign_input(0, &prev_output, SIGHASH_ALL, &secret, &mut cache),
        Err(SignError::UnsupportedScript)
    );
}
