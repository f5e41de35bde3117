use std::{backtrace::Backtrace, fmt::Display};

use snafu::Snafu;

/// Decompresses data using a backwards [LZ77](https://en.wikipedia.org/wiki/LZ77_and_LZ78#LZ77) algorithm. "Backwards"
/// refers to starting the decompression from the end of the file and moving towards the beginning. This is the format of
/// compressed `.code` sections.
///
/// The last 8 bytes of a compressed stream are a footer:
/// - bytes 0..3: length of the compressed region, counted from the end of the stream and including the footer
/// - byte 3: length of the footer plus padding, i.e. where decoding starts, counted from the end of the stream
/// - bytes 4..8: number of bytes the decompressed data is larger than the compressed stream
///
/// Everything before the compressed region is stored verbatim.
pub struct Lz77 {}

const LENGTH_BITS: usize = 4;
const DISTANCE_BITS: usize = 12;
const MIN_SUBSEQUENCE: usize = 3;

const LENGTH_MASK: usize = (1 << LENGTH_BITS) - 1;
const DISTANCE_MASK: usize = (1 << DISTANCE_BITS) - 1;

const FOOTER_SIZE: usize = 8;

/// Upper bound on the decompressed size, so a corrupt footer cannot request an absurd allocation.
pub const MAX_DECOMPRESSED_SIZE: usize = 0x1000_0000;

/// Length-distance pair
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Pair {
    length: usize,
    distance: usize,
}

impl Pair {
    /// Decodes two little-endian bytes into a length-distance pair.
    pub fn from_le_bytes(bytes: [u8; 2]) -> Self {
        let value = u16::from_le_bytes(bytes) as usize;
        let distance = (value & DISTANCE_MASK) + MIN_SUBSEQUENCE;
        let length = ((value >> DISTANCE_BITS) & LENGTH_MASK) + MIN_SUBSEQUENCE;
        Self { length, distance }
    }

    /// Number of bytes to copy.
    pub fn length(&self) -> usize {
        self.length
    }

    /// How far ahead of the write cursor the copied bytes are.
    pub fn distance(&self) -> usize {
        self.distance
    }
}

impl Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}+{:#x}", self.distance, self.length)
    }
}

/// Errors related to [`Lz77::decompress`].
#[derive(Debug, Snafu)]
pub enum Lz77DecompressError {
    /// Occurs when the input is too small to contain a footer.
    #[snafu(display("expected at least {FOOTER_SIZE:#x} bytes for the footer but had only {actual:#x}:\n{backtrace}"))]
    NoFooter {
        /// Input length.
        actual: usize,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when the footer describes regions that do not fit in the input.
    #[snafu(display(
        "footer has compressed length {total_size:#x} and footer length {read_offset:#x}, which do not fit in {length:#x} bytes:\n{backtrace}"
    ))]
    InvalidFooter {
        /// Length of the compressed region.
        total_size: usize,
        /// Length of the footer plus padding.
        read_offset: usize,
        /// Input length.
        length: usize,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when the decompressed size exceeds [`MAX_DECOMPRESSED_SIZE`].
    #[snafu(display("decompressed size {size:#x} exceeds the maximum of {MAX_DECOMPRESSED_SIZE:#x}:\n{backtrace}"))]
    TooLarge {
        /// Requested size.
        size: usize,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when the first byte of a length-distance pair was read, but there is no second byte.
    #[snafu(display("expected second byte of length-distance pair at offset {offset:#x}:\n{backtrace}"))]
    IncompletePair {
        /// Offset of first byte.
        offset: usize,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when a length-distance pair would point to data that is not within the decompressed stream.
    #[snafu(display(
        "length-distance pair {pair} at offset {offset:#x} points outside of decompressed stream:\n{backtrace}"
    ))]
    OutOfBounds {
        /// The erroneous length-distance pair.
        pair: Pair,
        /// Offset of length-distance pair.
        offset: usize,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when a token would be written before the start of the decompressed stream.
    #[snafu(display("token at offset {offset:#x} writes past the start of the decompressed stream:\n{backtrace}"))]
    OutputOverflow {
        /// Offset of the token.
        offset: usize,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
}

struct Footer {
    total_size: usize,
    read_offset: usize,
    write_offset: usize,
}

impl Lz77 {
    fn read_footer(&self, bytes: &[u8]) -> Result<Footer, Lz77DecompressError> {
        let length = bytes.len();
        if length < FOOTER_SIZE {
            return NoFooterSnafu { actual: length }.fail();
        }
        let total_size = {
            let mut buf = [0u8; 3];
            buf.copy_from_slice(&bytes[length - 8..length - 5]);
            u32::from_le_bytes([buf[0], buf[1], buf[2], 0]) as usize
        };
        let read_offset = bytes[length - 5] as usize;
        let write_offset = {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(&bytes[length - 4..length]);
            u32::from_le_bytes(buf) as usize
        };

        if read_offset < FOOTER_SIZE || read_offset > total_size || total_size > length {
            return InvalidFooterSnafu { total_size, read_offset, length }.fail();
        }
        Ok(Footer { total_size, read_offset, write_offset })
    }

    /// Returns the size `bytes` will have once decompressed, as declared by its footer.
    ///
    /// # Errors
    ///
    /// This function will return an error if the footer is missing or inconsistent.
    pub fn decompressed_size(&self, bytes: &[u8]) -> Result<usize, Lz77DecompressError> {
        let footer = self.read_footer(bytes)?;
        let size = bytes.len() + footer.write_offset;
        if size > MAX_DECOMPRESSED_SIZE {
            return TooLargeSnafu { size }.fail();
        }
        Ok(size)
    }

    /// Decompresses `bytes` and returns the result, which is exactly [`Self::decompressed_size`] bytes long.
    ///
    /// # Errors
    ///
    /// This function will return an error if the footer is inconsistent, or if any token would read or write outside of
    /// the buffers. No partial output is returned.
    pub fn decompress(&self, bytes: &[u8]) -> Result<Box<[u8]>, Lz77DecompressError> {
        let footer = self.read_footer(bytes)?;
        let size = self.decompressed_size(bytes)?;

        let mut decompressed = vec![0u8; size];
        decompressed[..bytes.len()].copy_from_slice(bytes);

        let stop = bytes.len() - footer.total_size;
        let mut read = bytes.len() - footer.read_offset;
        let mut write = size;

        while read > stop {
            read -= 1;
            let mut flags = bytes[read];
            for _ in 0..8 {
                if read <= stop {
                    break;
                }
                if (flags & 0x80) == 0 {
                    if write == 0 {
                        return OutputOverflowSnafu { offset: read - 1 }.fail();
                    }
                    read -= 1;
                    write -= 1;
                    decompressed[write] = bytes[read];
                } else {
                    if read - stop < 2 {
                        return IncompletePairSnafu { offset: read - 1 }.fail();
                    }
                    read -= 2;
                    let pair = Pair::from_le_bytes([bytes[read], bytes[read + 1]]);
                    if write < pair.length {
                        return OutputOverflowSnafu { offset: read }.fail();
                    }
                    for _ in 0..pair.length {
                        write -= 1;
                        let source = write + pair.distance;
                        if source >= size {
                            return OutOfBoundsSnafu { pair, offset: read }.fail();
                        }
                        decompressed[write] = decompressed[source];
                    }
                }
                flags <<= 1;
            }
        }

        Ok(decompressed.into_boxed_slice())
    }
}
