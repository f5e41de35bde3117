use std::{
    fs::{self, File},
    io::{self, Read},
    path::{Path, PathBuf},
};

use snafu::{Backtrace, ResultExt, Snafu};

/// Errors related to opening, reading and writing files.
#[derive(Debug, Snafu)]
pub enum FileError {
    /// Occurs when a file could not be opened or created.
    #[snafu(display("failed to open '{}': {source}:\n{backtrace}", path.display()))]
    Open {
        /// Path to the file.
        path: PathBuf,
        /// Source error.
        source: io::Error,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when fewer bytes than requested could be read.
    #[snafu(display("expected {expected:#x} bytes at offset {offset:#x} but read failed: {source}:\n{backtrace}"))]
    ShortRead {
        /// Absolute offset of the read.
        offset: u64,
        /// Number of bytes requested.
        expected: usize,
        /// Source error.
        source: io::Error,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// See [`io::Error`].
    #[snafu(transparent)]
    Io {
        /// Source error.
        source: io::Error,
    },
}

/// Opens a file for reading.
///
/// # Errors
///
/// This function will return an error if the file does not exist or cannot be opened.
pub fn open_file<P: AsRef<Path>>(path: P) -> Result<File, FileError> {
    let path = path.as_ref();
    File::open(path).context(OpenSnafu { path })
}

/// Writes `data` to a new file, replacing any existing one.
///
/// # Errors
///
/// This function will return an error if the file cannot be created or written to.
pub fn write_file<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<(), FileError> {
    let path = path.as_ref();
    fs::write(path, data).context(OpenSnafu { path })
}

/// Reads exactly `buf.len()` bytes at `offset` without moving the file cursor, so a shared handle can be read from
/// several threads at once.
pub(crate) fn read_exact_at(file: &File, offset: u64, buf: &mut [u8]) -> Result<(), FileError> {
    let expected = buf.len();
    positional_read_exact(file, offset, buf).context(ShortReadSnafu { offset, expected })
}

#[cfg(unix)]
fn positional_read_exact(file: &File, offset: u64, buf: &mut [u8]) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(windows)]
fn positional_read_exact(file: &File, offset: u64, mut buf: &mut [u8]) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    let mut offset = offset;
    while !buf.is_empty() {
        match file.seek_read(buf, offset) {
            Ok(0) => return Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(read) => {
                buf = &mut std::mem::take(&mut buf)[read..];
                offset += read as u64;
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(error) => return Err(error),
        }
    }
    Ok(())
}

/// Reads a whole file into memory, or `None` if it cannot be opened or read.
pub(crate) fn read_whole_file(path: &Path) -> Option<Vec<u8>> {
    let mut file = open_file(path).ok()?;
    let mut buf = vec![];
    file.read_to_end(&mut buf).ok()?;
    Some(buf)
}
