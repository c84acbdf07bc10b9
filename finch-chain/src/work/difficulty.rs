//! Block difficulty data structures and calculations.
//!
//! The block difficulty "target threshold" is stored in the block header as a
//! 32-bit `CompactDifficulty` (the `nBits` field). The `ExpandedDifficulty`
//! is the full 256-bit target, and `Work` is the expected number of hash
//! operations a miner performed to find a header below that target.

use std::{fmt, ops::Add};

use primitive_types::U256;

use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// A 32-bit "compact bits" value, as used in the `bits` field of the block
/// header.
///
/// The format is a base-256 floating point number: one exponent byte, a sign
/// bit (invalid in headers), and a 23-bit mantissa.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    any(test, feature = "proptest-impl"),
    derive(proptest_derive::Arbitrary)
)]
pub struct CompactDifficulty(pub u32);

impl fmt::Debug for CompactDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("CompactDifficulty")
            .field(&format_args!("{:#010x}", self.0))
            .finish()
    }
}

/// A 256-bit target threshold.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct ExpandedDifficulty(U256);

/// The expected number of hash operations needed to find a block at a given
/// difficulty, used to pick the best chain.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Ord, PartialOrd)]
pub struct Work(U256);

impl CompactDifficulty {
    const SIGN_BIT: u32 = 0x0080_0000;
    const MANTISSA_MASK: u32 = 0x007f_ffff;

    /// Expand the compact encoding into the full 256-bit target.
    ///
    /// Returns `None` for encodings that are invalid in a block header: a
    /// zero mantissa, a set sign bit, or a target that overflows 256 bits.
    pub fn to_expanded(self) -> Option<ExpandedDifficulty> {
        let exponent = self.0 >> 24;
        let mantissa = self.0 & Self::MANTISSA_MASK;

        if mantissa == 0 || self.0 & Self::SIGN_BIT != 0 {
            return None;
        }

        let target = if exponent <= 3 {
            U256::from(mantissa >> (8 * (3 - exponent)))
        } else {
            let shift = (8 * (exponent - 3)) as usize;
            if shift > 255 {
                return None;
            }
            let target = U256::from(mantissa) << shift;
            // Round-trip the shift to detect bits pushed off the top.
            if target >> shift != U256::from(mantissa) {
                return None;
            }
            target
        };

        if target.is_zero() {
            None
        } else {
            Some(ExpandedDifficulty(target))
        }
    }

    /// The work represented by one header at this difficulty, or `None` if
    /// the encoding is invalid.
    pub fn to_work(self) -> Option<Work> {
        self.to_expanded().map(Work::from)
    }
}

impl From<ExpandedDifficulty> for Work {
    fn from(target: ExpandedDifficulty) -> Self {
        // work = floor(2^256 / (target + 1)), computed without overflowing
        // 256 bits as (!target / (target + 1)) + 1.
        let target = target.0;
        let one = U256::one();
        Work((!target / (target + one)) + one)
    }
}

impl Work {
    pub fn as_u256(self) -> U256 {
        self.0
    }

    pub fn from_u256(value: U256) -> Work {
        Work(value)
    }
}

impl Add for Work {
    type Output = Work;

    fn add(self, rhs: Work) -> Work {
        Work(self.0 + rhs.0)
    }
}

impl BitcoinSerialize for CompactDifficulty {
    fn bitcoin_serialize<W: std::io::Write>(&self, writer: W) -> Result<(), std::io::Error> {
        self.0.bitcoin_serialize(writer)
    }
}

impl BitcoinDeserialize for CompactDifficulty {
    fn bitcoin_deserialize<R: std::io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(CompactDifficulty(u32::bitcoin_deserialize(reader)?))
    }
}
