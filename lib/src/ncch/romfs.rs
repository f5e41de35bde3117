use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use snafu::{Backtrace, Snafu};

use crate::io::{read_exact_at, FileError};

/// A lazily read byte range holding a RomFS. The file stays open as long as any clone of the range, or the container it
/// came from, is alive.
#[derive(Clone, Debug)]
pub struct RomFsRange {
    file: Arc<File>,
    path: PathBuf,
    offset: u64,
    size: u64,
}

/// Errors related to reading from a [`RomFsRange`].
#[derive(Debug, Snafu)]
pub enum RomFsReadError {
    /// Occurs when a read extends past the end of the range.
    #[snafu(display("cannot read {length:#x} bytes at {position:#x} from a RomFS of {size:#x} bytes:\n{backtrace}"))]
    OutOfRange {
        /// Position relative to the start of the range.
        position: u64,
        /// Number of bytes requested.
        length: usize,
        /// Size of the range.
        size: u64,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// See [`FileError`].
    #[snafu(transparent)]
    File {
        /// Source error.
        source: FileError,
    },
    /// See [`io::Error`].
    #[snafu(transparent)]
    Io {
        /// Source error.
        source: io::Error,
    },
}

impl RomFsRange {
    /// Creates a range of `size` bytes starting at `offset` in `file`.
    pub fn new(file: Arc<File>, path: PathBuf, offset: u64, size: u64) -> Self {
        Self { file, path, offset, size }
    }

    /// Absolute offset of the RomFS in its file.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Size of the RomFS in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The shared backing file.
    pub fn file(&self) -> &Arc<File> {
        &self.file
    }

    /// Reads `buf.len()` bytes starting `position` bytes into the RomFS.
    ///
    /// # Errors
    ///
    /// This function will return an error if the read goes past the end of the range or an I/O operation fails.
    pub fn read_at(&self, position: u64, buf: &mut [u8]) -> Result<(), RomFsReadError> {
        let end = position.checked_add(buf.len() as u64);
        if end.map_or(true, |end| end > self.size) {
            return OutOfRangeSnafu { position, length: buf.len(), size: self.size }.fail();
        }
        read_exact_at(&self.file, self.offset + position, buf)?;
        Ok(())
    }

    /// Copies the whole RomFS to `writer` in chunks, returning the number of bytes written.
    ///
    /// # Errors
    ///
    /// This function will return an error if an I/O operation fails.
    pub fn copy_to<W: Write>(&self, writer: &mut W) -> Result<u64, RomFsReadError> {
        const CHUNK_SIZE: u64 = 0x10_0000;
        let mut buf = vec![0u8; CHUNK_SIZE.min(self.size) as usize];
        let mut position = 0;
        while position < self.size {
            let length = (self.size - position).min(CHUNK_SIZE) as usize;
            self.read_at(position, &mut buf[..length])?;
            writer.write_all(&buf[..length])?;
            position += length as u64;
        }
        Ok(position)
    }
}
