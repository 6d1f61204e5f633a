//! # BlockFile - Offset-Addressed File Primitive
//!
//! The lowest layer of the disk multimap. A [`BlockFile`] wraps a single file
//! and exposes exactly what the record store needs from it:
//!
//! - create a fresh (truncated) file, or open an existing one
//! - read / write a fixed-size byte buffer at an arbitrary byte offset
//! - report the current file length and whether a file is open
//!
//! Higher layers never hold a file handle directly; every on-disk relationship
//! is a byte offset resolved through [`BlockFile::read_at`] and
//! [`BlockFile::write_at`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use blockfile::BlockFile;
//!
//! let mut bf = BlockFile::new();
//! bf.create("store.dmm").unwrap();
//! bf.write_at(0, b"hello").unwrap();
//!
//! let mut buf = [0u8; 5];
//! bf.read_at(0, &mut buf).unwrap();
//! assert_eq!(&buf, b"hello");
//! bf.close();
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors raised by [`BlockFile`] operations.
#[derive(Debug, Error)]
pub enum BlockError {
    /// An underlying I/O error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The operation needs an open file but none is open.
    #[error("block file is not open")]
    NotOpen,

    /// A read would extend past the end of the file.
    #[error("read of {len} bytes at offset {offset} exceeds file length {file_len}")]
    OutOfBounds {
        /// Requested start offset.
        offset: u64,
        /// Requested byte count.
        len: u64,
        /// File length at the time of the request.
        file_len: u64,
    },
}

/// A random-access file addressed by byte offset.
///
/// The file length is cached after create/open and kept current on every
/// write, so [`len`](BlockFile::len) never touches the file system.
///
/// Reads take `&self` (through `&File`, which implements `Read + Seek`) so
/// that borrowing readers such as result iterators can coexist with other
/// shared borrows. Writes take `&mut self`.
#[derive(Debug, Default)]
pub struct BlockFile {
    file: Option<File>,
    path: Option<PathBuf>,
    len: u64,
}

impl BlockFile {
    /// Returns a closed block file.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or truncates) the file at `path` and opens it read/write.
    ///
    /// Any file that is already open is closed first.
    pub fn create<P: AsRef<Path>>(&mut self, path: P) -> Result<(), BlockError> {
        self.close();
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(path)?;
        debug!(path = %path.display(), "created block file");
        self.file = Some(file);
        self.path = Some(path.to_path_buf());
        self.len = 0;
        Ok(())
    }

    /// Opens an existing file at `path` read/write.
    ///
    /// Fails with [`BlockError::Io`] if the file does not exist. Any file that
    /// is already open is closed first.
    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<(), BlockError> {
        self.close();
        let path = path.as_ref();
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        debug!(path = %path.display(), len, "opened block file");
        self.file = Some(file);
        self.path = Some(path.to_path_buf());
        self.len = len;
        Ok(())
    }

    /// Releases the file handle. Safe to call repeatedly or on a block file
    /// that was never opened.
    pub fn close(&mut self) {
        if let Some(file) = self.file.take() {
            // Best effort: the handle is released regardless.
            let _ = file.sync_data();
            debug!(path = ?self.path, "closed block file");
        }
        self.path = None;
        self.len = 0;
    }

    /// Returns `true` while a file is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Current length of the open file in bytes (0 when closed).
    #[must_use]
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if the open file has no bytes (or nothing is open).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Path of the open file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Fills `buf` with the bytes stored at `offset`.
    ///
    /// The whole range must lie inside the file; a short file is reported as
    /// [`BlockError::OutOfBounds`] rather than a partial read.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), BlockError> {
        let file = self.file.as_ref().ok_or(BlockError::NotOpen)?;
        let len = buf.len() as u64;
        if offset.checked_add(len).map_or(true, |end| end > self.len) {
            return Err(BlockError::OutOfBounds {
                offset,
                len,
                file_len: self.len,
            });
        }
        let mut f: &File = file;
        f.seek(SeekFrom::Start(offset))?;
        f.read_exact(buf)?;
        Ok(())
    }

    /// Writes `buf` at `offset`, extending the file if the write ends past
    /// the current length.
    pub fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), BlockError> {
        let file = self.file.as_mut().ok_or(BlockError::NotOpen)?;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        let end = offset + buf.len() as u64;
        if end > self.len {
            self.len = end;
        }
        Ok(())
    }

    /// Appends `buf` at end-of-file and returns the offset it was written at.
    pub fn append(&mut self, buf: &[u8]) -> Result<u64, BlockError> {
        let offset = self.len;
        self.write_at(offset, buf)?;
        Ok(offset)
    }

    /// Forces written data to disk via `sync_data()`.
    pub fn sync(&mut self) -> Result<(), BlockError> {
        let file = self.file.as_mut().ok_or(BlockError::NotOpen)?;
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }
}

impl Drop for BlockFile {
    fn drop(&mut self) {
        self.close();
    }
}
