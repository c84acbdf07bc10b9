//! End-to-end tests for the chain database: bootstrap, commit, reopen,
//! disconnect/reconnect, crash handling, and block file rotation.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use tempdir::TempDir;

use finch_chain::{
    amount::COIN,
    block::{self, merkle, Block, Header, Height},
    parameters::{genesis_hash, Network},
    transaction::{LockTime, Transaction},
    transparent::{CoinView, Input, OutPoint, Output, Script, Witness},
    work::difficulty::CompactDifficulty,
};
use finch_state::{Config, FinalizedState};

fn test_config(dir: &TempDir, block_file_size: u32) -> Config {
    Config {
        cache_dir: dir.path().to_path_buf(),
        network: Network::Mainnet,
        block_file_size,
    }
}

fn coinbase(height: u32, value: i64) -> Arc<Transaction> {
    Arc::new(Transaction::new(
        1,
        vec![Input {
            outpoint: OutPoint::null(),
            unlock_script: Script(vec![0x51, height as u8]),
            sequence: 0xffff_ffff,
            witness: Witness::default(),
        }],
        vec![Output {
            value,
            lock_script: Script::new_p2pkh(&[height as u8; 20]),
        }],
        LockTime::unlocked(),
    ))
}

fn make_block(parent: block::Hash, height: u32, transactions: Vec<Arc<Transaction>>) -> Arc<Block> {
    let merkle_root: merkle::Root = transactions.iter().map(|tx| tx.hash()).collect();
    let header = Header::new(
        1,
        parent,
        merkle_root,
        Utc.timestamp(1_231_006_505 + height as i64 * 600, 0),
        CompactDifficulty(0x1d00ffff),
        height,
    );
    Arc::new(Block {
        header,
        transactions,
    })
}

/// Builds a view with every block transaction applied, pulling spent coins
/// out of the state first.
fn staged_view(state: &FinalizedState, block: &Block, height: Height) -> CoinView {
    let mut view = CoinView::new();
    for tx in block.transactions.iter() {
        state.spend_coins(tx, &mut view).expect("coin reads succeed");
        view.apply_transaction(tx, height)
            .expect("all spent coins are present");
    }
    view
}

fn utxo_snapshot(state: &FinalizedState) -> Vec<(Vec<u8>, Vec<u8>)> {
    state
        .coins()
        .map(|item| {
            let (key, value) = item.expect("coin iteration succeeds");
            (key.to_vec(), value.to_vec())
        })
        .collect()
}

#[test]
fn fresh_open_bootstraps_genesis() {
    finch_test::init();

    let dir = TempDir::new("finch-state-test").unwrap();
    let state = FinalizedState::new(&test_config(&dir, 1 << 20)).unwrap();

    let (height, hash) = state.tip().expect("a fresh store has a tip");
    assert_eq!(height, Height(0));
    assert_eq!(hash, genesis_hash(Network::Mainnet));
    assert_eq!(state.main_chain_len(), 1);
    assert_eq!(state.head().unwrap().hash, state.tail().unwrap().hash);

    // The genesis block's bytes are on disk and readable.
    let genesis_entry = state.tail().unwrap().clone();
    assert!(genesis_entry.has_block());
    let read_back = state.read_block(&genesis_entry).unwrap();
    assert_eq!(read_back.hash(), hash);
}

#[test]
fn commit_block_and_reopen() {
    finch_test::init();

    let dir = TempDir::new("finch-state-test").unwrap();
    let config = test_config(&dir, 1 << 20);

    let block_1;
    {
        let mut state = FinalizedState::new(&config).unwrap();
        let (_, genesis) = state.tip().unwrap();
        block_1 = make_block(genesis, 1, vec![coinbase(1, 50 * COIN)]);

        let mut view = staged_view(&state, &block_1, Height(1));
        let committed = state.commit_block(block_1.clone(), &mut view).unwrap();
        assert_eq!(committed, block_1.hash());
        assert_eq!(state.tip().unwrap(), (Height(1), block_1.hash()));
    }

    // Reopening recovers the tip, the index entry, and the block bytes.
    let state = FinalizedState::new(&config).unwrap();
    assert_eq!(state.tip().unwrap(), (Height(1), block_1.hash()));
    assert_eq!(state.main_chain_len(), 2);

    let entry = state.entry(&block_1.hash()).expect("entry was persisted").clone();
    assert!(entry.has_block());
    assert_eq!(state.read_block(&entry).unwrap(), *block_1);

    // The coinbase coin is in the UTXO set.
    let coinbase_outpoint = OutPoint {
        hash: block_1.transactions[0].hash(),
        index: 0,
    };
    let coin = state.coin(&coinbase_outpoint).unwrap().expect("coin exists");
    assert!(coin.coinbase);
    assert_eq!(coin.height, Height(1));
    assert_eq!(coin.output.value, 50 * COIN);
}

#[test]
fn disconnect_then_reconnect_restores_utxo_set() {
    finch_test::init();

    let dir = TempDir::new("finch-state-test").unwrap();
    let config = test_config(&dir, 1 << 20);
    let mut state = FinalizedState::new(&config).unwrap();

    // Block 1 creates a coin; block 2 spends it.
    let (_, genesis) = state.tip().unwrap();
    let block_1 = make_block(genesis, 1, vec![coinbase(1, 50 * COIN)]);
    let mut view = staged_view(&state, &block_1, Height(1));
    state.commit_block(block_1.clone(), &mut view).unwrap();

    let spend = Arc::new(Transaction::new(
        1,
        vec![Input {
            outpoint: OutPoint {
                hash: block_1.transactions[0].hash(),
                index: 0,
            },
            unlock_script: Script(vec![0x00]),
            sequence: 0xffff_fffe,
            witness: Witness::default(),
        }],
        vec![Output {
            value: 49 * COIN,
            lock_script: Script::new_p2pkh(&[0x77; 20]),
        }],
        LockTime::unlocked(),
    ));
    let block_2 = make_block(
        block_1.hash(),
        2,
        vec![coinbase(2, 50 * COIN), spend.clone()],
    );
    let mut view = staged_view(&state, &block_2, Height(2));
    assert_eq!(view.undo().len(), 1);
    state.commit_block(block_2.clone(), &mut view).unwrap();

    let after_connect = utxo_snapshot(&state);
    let tip_entry = state.tail().unwrap().clone();
    assert!(tip_entry.has_undo());

    // Disconnect: the spent coin comes back, block 2's coins vanish.
    let new_tip = state.disconnect_block(&block_2).unwrap();
    assert_eq!(new_tip, block_1.hash());
    assert_eq!(state.tip().unwrap(), (Height(1), block_1.hash()));
    assert!(state
        .coin(&spend.inputs[0].outpoint)
        .unwrap()
        .is_some());
    assert!(state
        .coin(&OutPoint {
            hash: spend.hash(),
            index: 0,
        })
        .unwrap()
        .is_none());

    // Reconnect: the UTXO set must be byte-identical to the first connect.
    let mut view = staged_view(&state, &block_2, Height(2));
    state.reconnect_block(block_2.clone(), &mut view).unwrap();
    assert_eq!(state.tip().unwrap(), (Height(2), block_2.hash()));
    assert_eq!(utxo_snapshot(&state), after_connect);
}

#[test]
fn truncated_block_file_is_detected_on_reopen() {
    finch_test::init();

    let dir = TempDir::new("finch-state-test").unwrap();
    let config = test_config(&dir, 1 << 20);

    {
        let mut state = FinalizedState::new(&config).unwrap();
        let (_, genesis) = state.tip().unwrap();
        let block_1 = make_block(genesis, 1, vec![coinbase(1, 50 * COIN)]);
        let mut view = staged_view(&state, &block_1, Height(1));
        state.commit_block(block_1, &mut view).unwrap();
    }

    // Simulate a lost flat file: the store's recorded position no longer
    // matches, which must surface as corruption instead of silent reuse.
    let block_file = config.prefix().join("blocks").join("0.dat");
    std::fs::File::create(&block_file).unwrap().set_len(0).unwrap();

    assert!(FinalizedState::new(&config).is_err());
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(4))]

    /// Committing a generated connected chain and reopening the database
    /// recovers the same tip, entries, and block bytes.
    #[test]
    fn arbitrary_chain_commits_and_reloads(
        blocks in Block::chain_strategy(Network::Mainnet, 3),
    ) {
        finch_test::init();

        let dir = TempDir::new("finch-state-test").unwrap();
        let config = test_config(&dir, 1 << 20);
        {
            let mut state = FinalizedState::new(&config).unwrap();
            for (offset, block) in blocks.iter().enumerate() {
                let height = Height(offset as u32 + 1);
                // Generated spend transactions reference coins that do not
                // exist in the store; the database persists whatever the
                // view stages, so stage only the transactions whose inputs
                // are actually available (always at least the coinbase).
                let mut view = CoinView::new();
                for tx in block.transactions.iter() {
                    state.spend_coins(tx, &mut view).unwrap();
                    let spendable = tx.is_coinbase()
                        || tx.inputs.iter().all(|input| view.contains(&input.outpoint));
                    if spendable {
                        view.apply_transaction(tx, height).unwrap();
                    }
                }
                state.commit_block(block.clone(), &mut view).unwrap();
            }
            prop_assert_eq!(state.tip().unwrap(), (Height(3), blocks[2].hash()));
        }

        let state = FinalizedState::new(&config).unwrap();
        prop_assert_eq!(state.tip().unwrap(), (Height(3), blocks[2].hash()));
        for block in blocks.iter() {
            let entry = state.entry(&block.hash()).expect("entry was persisted").clone();
            prop_assert_eq!(state.read_block(&entry).unwrap(), (**block).clone());
        }
    }
}

#[test]
fn block_files_rotate_at_size_limit() {
    finch_test::init();

    let dir = TempDir::new("finch-state-test").unwrap();
    // The genesis block record (289 bytes) fits; the next block does not.
    let config = test_config(&dir, 400);
    let mut state = FinalizedState::new(&config).unwrap();

    let genesis_entry = state.head().unwrap().clone();
    assert_eq!(genesis_entry.block_file, 0);
    assert_eq!(genesis_entry.block_pos, 0);

    let (_, genesis) = state.tip().unwrap();
    let block_1 = make_block(genesis, 1, vec![coinbase(1, 50 * COIN)]);
    let mut view = staged_view(&state, &block_1, Height(1));
    state.commit_block(block_1.clone(), &mut view).unwrap();

    let entry = state.entry(&block_1.hash()).unwrap().clone();
    assert_eq!(entry.block_file, 1);
    assert_eq!(entry.block_pos, 0);

    // Both files stay readable after rotation.
    assert_eq!(state.read_block(&genesis_entry).unwrap().hash(), genesis);
    assert_eq!(state.read_block(&entry).unwrap(), *block_1);

    // Reopening picks up the rotated file pointer.
    drop(state);
    let state = FinalizedState::new(&config).unwrap();
    assert_eq!(state.tip().unwrap(), (Height(1), block_1.hash()));
}
