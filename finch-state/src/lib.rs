//! The Finch chain database: the durable home of the block index, the UTXO
//! set, and the raw block files.
//!
//! The database is single-writer. Connecting, reconnecting, or
//! disconnecting a block stages every key-value change and applies it in
//! one atomic sled transaction; the flat-file appends for block and undo
//! data strictly precede that commit, so a crash can only ever leave
//! unreferenced trailing bytes in a block file.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use finch_chain::parameters::Network;

pub mod block_files;
pub mod block_index;
mod sled_state;

pub use block_index::{BlockIndex, Entry, EntryIndex};
pub use sled_state::FinalizedState;

/// A boxed [`std::error::Error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The default rotation threshold for block files, 512 MiB.
pub const DEFAULT_BLOCK_FILE_SIZE: u32 = 512 * 1024 * 1024;

/// Configuration for the state service.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// The root directory for storing cached data.
    pub cache_dir: PathBuf,

    /// The network the state belongs to; each network gets its own
    /// subdirectory of `cache_dir`.
    pub network: Network,

    /// The size at which the active block file is rotated.
    ///
    /// Production deployments should leave this alone; tests lower it to
    /// exercise rotation without writing half a gigabyte.
    pub block_file_size: u32,
}

impl Config {
    /// The directory this configuration's chain data lives in.
    pub fn prefix(&self) -> PathBuf {
        let net_dir = match self.network {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        };
        self.cache_dir.join(net_dir)
    }
}

impl Default for Config {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_default().join("cache"))
            .join("finch");

        Self {
            cache_dir,
            network: Network::Mainnet,
            block_file_size: DEFAULT_BLOCK_FILE_SIZE,
        }
    }
}
