//! Bitcoin's CompactSize variable-length integer encoding.

use crate::{BitcoinDeserialize, BitcoinSerialize, SerializationError};
use byteorder::{LittleEndian, WriteBytesExt};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactInt(u64);

impl CompactInt {
    pub fn new() -> CompactInt {
        CompactInt(0)
    }

    pub fn from(value: usize) -> CompactInt {
        CompactInt(value as u64)
    }

    pub fn from_u64(value: u64) -> CompactInt {
        CompactInt(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the number of bytes `value` occupies on the wire, including
    /// the tag byte.
    pub fn size(value: usize) -> usize {
        if value < 253 {
            1
        } else if value <= u16::MAX as usize {
            3
        } else if value <= u32::MAX as usize {
            5
        } else {
            9
        }
    }

    /// Finishes deserializing a CompactInt whose first byte has already been
    /// consumed from `reader`.
    ///
    /// The transaction decoder needs this: it must read one byte to decide
    /// whether it is looking at a segwit marker or at the start of the input
    /// count, and `io::Read` has no way to put that byte back.
    pub(crate) fn bitcoin_deserialize_tail<R: std::io::Read>(
        first: u8,
        mut reader: R,
    ) -> Result<CompactInt, SerializationError> {
        if first < 253 {
            Ok(CompactInt(first as u64))
        } else if first == 253 {
            Ok(CompactInt(u16::bitcoin_deserialize(&mut reader)? as u64))
        } else if first == 254 {
            Ok(CompactInt(u32::bitcoin_deserialize(&mut reader)? as u64))
        } else {
            Ok(CompactInt(u64::bitcoin_deserialize(&mut reader)?))
        }
    }
}

impl Default for CompactInt {
    fn default() -> Self {
        CompactInt::new()
    }
}

impl BitcoinSerialize for CompactInt {
    fn bitcoin_serialize<W>(&self, mut target: W) -> Result<(), std::io::Error>
    where
        W: std::io::Write,
    {
        if self.value() < 253 {
            target.write_all(&[self.value() as u8])
        } else if self.value() <= u16::MAX as u64 {
            target.write_all(&[253])?;
            target.write_u16::<LittleEndian>(self.value() as u16)
        } else if self.value() <= u32::MAX as u64 {
            target.write_all(&[254])?;
            target.write_u32::<LittleEndian>(self.value() as u32)
        } else {
            target.write_all(&[255])?;
            target.write_u64::<LittleEndian>(self.value())
        }
    }
}

impl BitcoinDeserialize for CompactInt {
    fn bitcoin_deserialize<R: std::io::Read>(
        mut target: R,
    ) -> Result<CompactInt, SerializationError> {
        let first = u8::bitcoin_deserialize(&mut target)?;
        CompactInt::bitcoin_deserialize_tail(first, &mut target)
    }
}
