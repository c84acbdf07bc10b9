use chrono::{DateTime, TimeZone, Utc};

use crate::{block, BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A transaction's locktime: the earliest block height or Unix time at which
/// the transaction may be included in a block.
///
/// The wire format is a single u32; values below 500,000,000 are heights,
/// larger values are timestamps.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LockTime {
    /// Unlocked at the given block height.
    Height(block::Height),
    /// Unlocked at the given time.
    Time(DateTime<Utc>),
}

impl LockTime {
    /// The smallest locktime value interpreted as a timestamp rather than a
    /// height.
    pub const MIN_TIMESTAMP: i64 = 500_000_000;

    /// The largest locktime representable on the wire.
    pub const MAX_TIMESTAMP: i64 = u32::MAX as i64;

    /// A locktime that never restricts inclusion.
    pub fn unlocked() -> LockTime {
        LockTime::Height(block::Height(0))
    }
}

impl BitcoinSerialize for LockTime {
    fn bitcoin_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        match self {
            LockTime::Height(height) => height.0.bitcoin_serialize(writer),
            LockTime::Time(time) => (time.timestamp() as u32).bitcoin_serialize(writer),
        }
    }
}

impl BitcoinDeserialize for LockTime {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        let raw = u32::bitcoin_deserialize(reader)?;
        if (raw as i64) < LockTime::MIN_TIMESTAMP {
            Ok(LockTime::Height(block::Height(raw)))
        } else {
            Ok(LockTime::Time(Utc.timestamp(raw as i64, 0)))
        }
    }
}
