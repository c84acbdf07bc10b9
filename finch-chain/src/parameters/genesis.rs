//! Genesis consensus parameters for each Bitcoin network.

use crate::{block, parameters::Network, serialization::BitcoinDeserializeInto};

/// The previous block hash for the genesis block.
///
/// All known networks use the Bitcoin `null` value for the parent of the
/// genesis block, `[0; 32]`.
pub const GENESIS_PREVIOUS_BLOCK_HASH: block::Hash = block::Hash([0; 32]);

/// Returns the hash for the genesis block in `network`.
pub fn genesis_hash(network: Network) -> block::Hash {
    match network {
        // bitcoin-cli getblockhash 0
        Network::Mainnet => "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f",
        // bitcoin-cli -testnet getblockhash 0
        Network::Testnet => "000000000933ea01ad0ee984209779baaec3ced90fa3f408719526f8d77f4943",
    }
    .parse()
    .expect("hard-coded hash parses")
}

/// The complete mainnet genesis block: the 80-byte header followed by the
/// single coinbase transaction carrying the Times headline.
const MAINNET_GENESIS_BLOCK: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c0101000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";

/// The testnet genesis block differs from mainnet only in the header's time
/// and nonce fields.
const TESTNET_GENESIS_BLOCK: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4adae5494dffff001d1aa4ae180101000000010000000000000000000000000000000000000000000000000000000000000000ffffffff4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000";

/// Returns the genesis block for `network`.
///
/// The chain database uses this to bootstrap a fresh store.
pub fn genesis_block(network: Network) -> block::Block {
    let hex = match network {
        Network::Mainnet => MAINNET_GENESIS_BLOCK,
        Network::Testnet => TESTNET_GENESIS_BLOCK,
    };
    let bytes = hex::decode(hex).expect("hard-coded genesis block is valid hex");
    bytes
        .as_slice()
        .bitcoin_deserialize_into()
        .expect("hard-coded genesis block parses")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn genesis_block_hash_matches() {
        finch_test::init();

        for network in &[Network::Mainnet, Network::Testnet] {
            let block = genesis_block(*network);
            assert_eq!(block.hash(), genesis_hash(*network));
            assert_eq!(
                block.header.previous_block_hash,
                GENESIS_PREVIOUS_BLOCK_HASH
            );
            assert_eq!(block.transactions.len(), 1);
            assert!(block.transactions[0].is_coinbase());
        }
    }
}
