//! The append-only flat files holding raw blocks and undo records.
//!
//! Records are `le32(length) ‖ payload`, appended to `<dir>/<n>.dat`. When a
//! record would push the active file past the rotation threshold, the file
//! is fsynced, closed, and `<n+1>.dat` starts at position zero. Record
//! positions refer to the offset of the length prefix.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::BoxError;

#[derive(Error, Debug)]
pub enum BlockFileError {
    /// The active file's size disagrees with the recovered write position,
    /// which means the store and the flat files are from different runs.
    #[error(
        "block file {file} is {actual} bytes but the store recorded position {expected}"
    )]
    SizeMismatch {
        file: i32,
        actual: u64,
        expected: u64,
    },

    /// A record reference points outside any file.
    #[error("unreadable block record at file {file} position {pos}")]
    BadRecord { file: i32, pos: u32 },
}

pub struct BlockFiles {
    dir: PathBuf,
    rotate_at: u32,
    active_file: i32,
    active_pos: u32,
    active: File,
}

impl BlockFiles {
    /// Opens the active block file, verifying that its size matches the
    /// write position recovered from the store.
    ///
    /// This is the sole consistency check between the key-value store and
    /// the flat files: positions beyond `pos` were never committed and are
    /// unreachable, so trailing garbage is impossible to observe.
    pub fn open(dir: &Path, file: i32, pos: u32, rotate_at: u32) -> Result<BlockFiles, BoxError> {
        std::fs::create_dir_all(dir)?;
        let active = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(Self::path(dir, file))?;

        let actual = active.metadata()?.len();
        if actual != pos as u64 {
            return Err(BlockFileError::SizeMismatch {
                file,
                actual,
                expected: pos as u64,
            }
            .into());
        }

        debug!(file, pos, "opened active block file");
        Ok(BlockFiles {
            dir: dir.to_path_buf(),
            rotate_at,
            active_file: file,
            active_pos: pos,
            active,
        })
    }

    fn path(dir: &Path, file: i32) -> PathBuf {
        dir.join(format!("{}.dat", file))
    }

    pub fn active_file(&self) -> i32 {
        self.active_file
    }

    pub fn active_pos(&self) -> u32 {
        self.active_pos
    }

    /// Appends a length-prefixed record, rotating the active file first if
    /// the record would push it past the threshold.
    ///
    /// Returns the `(file, position)` of the record's length prefix. The
    /// bytes are not durable until [`BlockFiles::sync`] or a rotation.
    pub fn append(&mut self, payload: &[u8]) -> Result<(i32, u32), BoxError> {
        let record_len = 4 + payload.len() as u64;
        if self.active_pos as u64 + record_len > self.rotate_at as u64 && self.active_pos > 0 {
            self.rotate()?;
        }

        let location = (self.active_file, self.active_pos);
        self.active
            .write_all(&(payload.len() as u32).to_le_bytes())?;
        self.active.write_all(payload)?;
        self.active_pos += record_len as u32;
        Ok(location)
    }

    /// Closes out the active file and starts the next one at position zero.
    fn rotate(&mut self) -> Result<(), BoxError> {
        self.active.sync_data()?;
        let next = self.active_file + 1;
        self.active = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(Self::path(&self.dir, next))?;
        info!(
            closed = self.active_file,
            opened = next,
            "rotated block file"
        );
        self.active_file = next;
        self.active_pos = 0;
        Ok(())
    }

    /// Fsyncs the active file.
    pub fn sync(&mut self) -> Result<(), BoxError> {
        self.active.sync_data()?;
        Ok(())
    }

    /// Reads the record at `(file, pos)`, which may be in a rotated-out
    /// file.
    pub fn read(&self, file: i32, pos: u32) -> Result<Vec<u8>, BoxError> {
        let bad_record = || BlockFileError::BadRecord { file, pos };

        let mut handle = if file == self.active_file {
            self.active.try_clone()?
        } else {
            File::open(Self::path(&self.dir, file)).map_err(|_| bad_record())?
        };
        handle.seek(SeekFrom::Start(pos as u64))?;

        let mut len_bytes = [0u8; 4];
        handle.read_exact(&mut len_bytes).map_err(|_| bad_record())?;
        let len = u32::from_le_bytes(len_bytes);
        if len > self.rotate_at {
            return Err(bad_record().into());
        }

        let mut payload = vec![0u8; len as usize];
        handle.read_exact(&mut payload).map_err(|_| bad_record())?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    #[test]
    fn append_and_read_back() {
        finch_test::init();

        let dir = TempDir::new("finch-block-files").unwrap();
        let mut files = BlockFiles::open(dir.path(), 0, 0, 1024).unwrap();

        let (file, pos) = files.append(b"first record").unwrap();
        assert_eq!((file, pos), (0, 0));
        let (file, pos) = files.append(b"second").unwrap();
        assert_eq!((file, pos), (0, 16));

        assert_eq!(files.read(0, 0).unwrap(), b"first record");
        assert_eq!(files.read(0, 16).unwrap(), b"second");
    }

    #[test]
    fn rotation_resets_position() {
        finch_test::init();

        let dir = TempDir::new("finch-block-files").unwrap();
        let mut files = BlockFiles::open(dir.path(), 0, 0, 64).unwrap();

        let payload = [0xaa_u8; 40];
        let (file, _) = files.append(&payload).unwrap();
        assert_eq!(file, 0);

        // 44 + 44 > 64: the second record lands in 1.dat at position 0.
        let (file, pos) = files.append(&payload).unwrap();
        assert_eq!((file, pos), (1, 0));
        assert_eq!(files.active_file(), 1);
        assert_eq!(files.active_pos(), 44);

        // Records in the rotated-out file stay readable.
        assert_eq!(files.read(0, 0).unwrap(), &payload[..]);
        assert_eq!(files.read(1, 0).unwrap(), &payload[..]);
    }

    #[test]
    fn reopen_checks_size() {
        finch_test::init();

        let dir = TempDir::new("finch-block-files").unwrap();
        let mut files = BlockFiles::open(dir.path(), 0, 0, 1024).unwrap();
        files.append(b"some bytes").unwrap();
        drop(files);

        // Position 14 matches; anything else must fail.
        BlockFiles::open(dir.path(), 0, 14, 1024).expect("matching size opens");
        assert!(BlockFiles::open(dir.path(), 0, 3, 1024).is_err());
    }
}
