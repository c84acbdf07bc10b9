//! Property tests for block hashing, the block wire format, and the
//! generated-chain invariants the state tests rely on.

use std::sync::Arc;

use proptest::{prelude::*, test_runner::Config};

use crate::parameters::{genesis_block, genesis_hash, Network};
use crate::serialization::{BitcoinDeserializeInto, BitcoinSerialize, SerializationError};
use crate::transaction::{LockTime, Transaction};
use crate::transparent::{Input, OutPoint, Output, Script, Witness};
use crate::LedgerState;

use super::super::*;

proptest! {
    #[test]
    fn hash_display_parse_roundtrip(hash in any::<Hash>()) {
        finch_test::init();

        // Hashes display byte-reversed; parsing must reverse them back.
        let parsed: Hash = hash.to_string().parse()?;
        prop_assert_eq!(hash, parsed);

        // The wire encoding is the internal byte order, unreversed.
        let bytes = hash.bitcoin_serialize_to_vec()?;
        prop_assert_eq!(&bytes[..], &hash.0[..]);
    }
}

proptest! {
    #![proptest_config(Config::with_cases(512))]

    #[test]
    fn header_occupies_exactly_80_bytes(header in any::<Header>()) {
        finch_test::init();

        let bytes = header.bitcoin_serialize_to_vec();
        prop_assert_eq!(bytes.len(), Header::len());

        let decoded: Header = bytes.as_slice().bitcoin_deserialize_into()?;
        prop_assert_eq!(header, decoded);
        // The decoder caches the hash; it must agree with a fresh
        // computation over the original header.
        prop_assert_eq!(decoded.hash(), Hash::from(&header));
    }

    #[test]
    fn generated_headers_carry_accountable_work(header in any::<Header>()) {
        finch_test::init();

        // The chain database rejects headers whose difficulty encoding
        // cannot be expanded, so the generator must never produce one.
        prop_assert!(header.difficulty_threshold.to_work().is_some());
    }
}

proptest! {
    #![proptest_config(Config::with_cases(16))]

    #[test]
    fn block_roundtrip_and_structure(block in Block::arbitrary_with(LedgerState::default())) {
        finch_test::init();

        let bytes = block.bitcoin_serialize_to_vec()?;
        prop_assert_eq!(bytes.len(), block.len());
        let decoded: Block = bytes.as_slice().bitcoin_deserialize_into()?;
        prop_assert_eq!(&block, &decoded);

        // The block hash commits to the header alone; the transaction list
        // is bound only indirectly, through the merkle root.
        let mut emptied = decoded;
        emptied.transactions = Vec::new();
        prop_assert_eq!(emptied.hash(), block.hash());

        // Exactly one coinbase, in the first position.
        prop_assert!(block.transactions[0].is_coinbase());
        let rest_have_no_coinbase = !block.transactions[1..]
            .iter()
            .any(|tx| tx.contains_coinbase_input());
        prop_assert!(rest_have_no_coinbase);

        // The generated header commits to the generated transactions.
        let root: merkle::Root = block.transactions.iter().map(|tx| tx.hash()).collect();
        prop_assert_eq!(block.header.merkle_root, root);
    }

    #[test]
    fn chain_strategy_links_every_block(chain in Block::chain_strategy(Network::Mainnet, 3)) {
        finch_test::init();

        let mut parent = genesis_hash(Network::Mainnet);
        for block in chain.iter() {
            prop_assert_eq!(block.header.previous_block_hash, parent);
            parent = block.hash();
        }
    }
}

#[test]
fn oversized_block_is_rejected() {
    finch_test::init();

    // 430 outputs with scripts at the 10,000-byte script cap push the
    // serialization past MAX_BLOCK_BYTES, so the size-capped reader must
    // run dry while decoding.
    let stuffing = Transaction::new(
        1,
        vec![Input {
            outpoint: OutPoint::null(),
            unlock_script: Script(vec![0x51, 0x51]),
            sequence: 0,
            witness: Witness::default(),
        }],
        vec![
            Output {
                value: 0,
                lock_script: Script(vec![0x6a; 10_000]),
            };
            430
        ],
        LockTime::unlocked(),
    );
    let block = Block {
        header: genesis_block(Network::Mainnet).header,
        transactions: vec![Arc::new(stuffing)],
    };
    assert!(block.len() as u64 > MAX_BLOCK_BYTES);

    let bytes = block.bitcoin_serialize_to_vec().unwrap();
    let err = bytes
        .as_slice()
        .bitcoin_deserialize_into::<Block>()
        .expect_err("blocks larger than the maximum size should fail");
    assert!(matches!(err, SerializationError::Io(_)));
}
