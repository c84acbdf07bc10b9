//! Consensus serialization for inputs, outputs, and witnesses.
//!
//! An input's witness is *not* written here: witness stacks live in a
//! separate section of the transaction encoding, so the transaction
//! serializer handles them itself.

use std::io;

use crate::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

use super::{Input, OutPoint, Output, Script, Witness};

impl BitcoinSerialize for OutPoint {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_all(&self.hash.0)?;
        self.index.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for OutPoint {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(OutPoint {
            hash: crate::transaction::Hash(<[u8; 32]>::bitcoin_deserialize(&mut reader)?),
            index: u32::bitcoin_deserialize(&mut reader)?,
        })
    }
}

impl BitcoinSerialize for Input {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.outpoint.bitcoin_serialize(&mut writer)?;
        self.unlock_script.bitcoin_serialize(&mut writer)?;
        self.sequence.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for Input {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Input {
            outpoint: OutPoint::bitcoin_deserialize(&mut reader)?,
            unlock_script: Script::bitcoin_deserialize(&mut reader)?,
            sequence: u32::bitcoin_deserialize(&mut reader)?,
            witness: Witness::default(),
        })
    }
}

impl BitcoinSerialize for Output {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.value.bitcoin_serialize(&mut writer)?;
        self.lock_script.bitcoin_serialize(&mut writer)?;
        Ok(())
    }
}

impl BitcoinDeserialize for Output {
    fn bitcoin_deserialize<R: io::Read>(mut reader: R) -> Result<Self, SerializationError> {
        Ok(Output {
            value: i64::bitcoin_deserialize(&mut reader)?,
            lock_script: Script::bitcoin_deserialize(&mut reader)?,
        })
    }
}

impl BitcoinSerialize for Witness {
    fn bitcoin_serialize<W: io::Write>(&self, mut writer: W) -> Result<(), io::Error> {
        self.0.bitcoin_serialize(&mut writer)
    }
}

impl BitcoinDeserialize for Witness {
    fn bitcoin_deserialize<R: io::Read>(reader: R) -> Result<Self, SerializationError> {
        Ok(Witness(<Vec<Vec<u8>>>::bitcoin_deserialize(reader)?))
    }
}
