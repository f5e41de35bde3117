use std::fmt::Display;

use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use snafu::{Backtrace, Snafu};

/// A fixed-size, null-padded ASCII string.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct AsciiArray<const N: usize>(pub [u8; N]);

unsafe impl<const N: usize> Zeroable for AsciiArray<N> {}
unsafe impl<const N: usize> Pod for AsciiArray<N> {}

/// Errors related to [`AsciiArray`].
#[derive(Debug, Snafu)]
pub enum AsciiArrayError {
    /// Occurs when an input character is not in ASCII.
    #[snafu(display("the provided string '{string}' contains one or more non-ASCII characters:\n{backtrace}"))]
    NotAscii {
        /// The invalid string.
        string: String,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when the string does not fit in the array.
    #[snafu(display("the provided string '{string}' is longer than {max} characters:\n{backtrace}"))]
    TooLong {
        /// The invalid string.
        string: String,
        /// Max string length.
        max: usize,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
}

impl<const N: usize> AsciiArray<N> {
    /// Loads from a `&str`, padding the rest of the array with zeros.
    ///
    /// # Errors
    ///
    /// This function will return an error if the string contains a non-ASCII character or is longer than `N`.
    pub fn from_str(string: &str) -> Result<Self, AsciiArrayError> {
        if string.len() > N {
            return TooLongSnafu { string: string.to_string(), max: N }.fail();
        }
        let mut chars = [0u8; N];
        for (i, ch) in string.chars().enumerate() {
            if !ch.is_ascii() {
                return NotAsciiSnafu { string: string.to_string() }.fail();
            }
            chars[i] = ch as u8;
        }
        Ok(Self(chars))
    }

    /// Returns `true` if the array holds exactly `name`, null-padded. Nothing after the first null byte may differ.
    pub fn matches(&self, name: &str) -> bool {
        let name = name.as_bytes();
        name.len() <= N && self.0[..name.len()] == *name && self.0[name.len()..].iter().all(|&b| b == 0)
    }

    /// Returns `true` if every byte is zero.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl AsciiArray<4> {
    /// Converts a four-character ASCII string to a `u32`.
    pub fn to_le_u32(&self) -> u32 {
        u32::from_le_bytes(self.0)
    }
}

impl<const N: usize> Display for AsciiArray<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for ch in self.0 {
            if ch == 0 {
                break;
            }
            write!(f, "{}", ch as char)?;
        }
        Ok(())
    }
}

impl<const N: usize> std::fmt::Debug for AsciiArray<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{self}\"")
    }
}

impl<const N: usize> Serialize for AsciiArray<N> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub(crate) struct BlobSize(pub u64);

impl Display for BlobSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let size = self.0;
        match size {
            0..=0x3ff => write!(f, "{}B", size),
            0x400..=0xfffff => write!(f, "{:.1}kB", size as f32 / 0x400 as f32),
            0x100000.. => write!(f, "{:.1}MB", size as f32 / 0x100000 as f32),
        }
    }
}

pub(crate) fn write_hash(f: &mut std::fmt::Formatter<'_>, hash: &[u8]) -> std::fmt::Result {
    for byte in hash {
        write!(f, "{byte:02x}")?;
    }
    Ok(())
}
