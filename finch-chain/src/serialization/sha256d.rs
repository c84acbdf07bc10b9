//! The double-SHA-256 hash used in Bitcoin, with an `io::Write` adapter so
//! that serialization can stream directly into the hasher.

use std::io;

use sha2::{Digest, Sha256};

/// A type that lets you write out SHA256d (double-SHA256, i.e. SHA256 of
/// SHA256) digests without intermediate buffers.
#[derive(Default)]
pub struct Writer {
    hash: Sha256,
}

impl Writer {
    /// Consume the Writer and produce the hash result.
    pub fn finish(self) -> [u8; 32] {
        let inner = self.hash.finalize();
        let outer = Sha256::digest(&inner);
        let mut result = [0u8; 32];
        result.copy_from_slice(&outer);
        result
    }
}

impl io::Write for Writer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.hash.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Convenience function for hashing a byte slice in one call.
pub fn digest(data: &[u8]) -> [u8; 32] {
    let inner = Sha256::digest(data);
    let outer = Sha256::digest(&inner);
    let mut result = [0u8; 32];
    result.copy_from_slice(&outer);
    result
}
