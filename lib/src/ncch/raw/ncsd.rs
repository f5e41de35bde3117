use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use snafu::{Backtrace, Snafu};

use super::{Region, MEDIA_UNIT_SIZE};
use crate::str::AsciiArray;

/// Magic number of an NCSD header.
pub const NCSD_MAGIC: [u8; 4] = *b"NCSD";

/// Number of partitions in an NCSD image.
pub const NCSD_PARTITION_COUNT: usize = 8;

/// Header of an NCSD image, which packs up to eight NCCH containers. Only the partition table is decoded.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NcsdHeader {
    /// RSA-2048 signature.
    pub signature: [u8; 0x100],
    /// Always `NCSD`.
    pub magic: AsciiArray<4>,
    /// Image size in media units.
    pub image_size: u32,
    /// Media id.
    pub media_id: u64,
    /// File system type per partition.
    pub partition_fs_types: [u8; NCSD_PARTITION_COUNT],
    /// Crypt type per partition.
    pub partition_crypt_types: [u8; NCSD_PARTITION_COUNT],
    /// Partition table.
    pub partitions: [Region; NCSD_PARTITION_COUNT],
    /// Reserved.
    pub reserved: [u8; 0xa0],
}

unsafe impl Zeroable for NcsdHeader {}
unsafe impl Pod for NcsdHeader {}

/// Errors related to [`NcsdHeader`].
#[derive(Debug, Snafu)]
pub enum RawNcsdError {
    /// Occurs when the input is too small to contain the header.
    #[snafu(display("expected {expected:#x} bytes for NCSD header but had only {actual:#x}:\n{backtrace}"))]
    DataTooSmall {
        /// Expected size.
        expected: usize,
        /// Actual input size.
        actual: usize,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when the magic number is not "NCSD".
    #[snafu(display("expected magic \"NCSD\" but got {magic:?}:\n{backtrace}"))]
    InvalidMagic {
        /// The magic number that was found.
        magic: AsciiArray<4>,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when the image has no partition at the requested index.
    #[snafu(display("NCSD image has no partition {index}:\n{backtrace}"))]
    NoPartition {
        /// Partition index.
        index: usize,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
}

impl NcsdHeader {
    /// Copies an NCSD header out of `data` and checks its magic number.
    ///
    /// # Errors
    ///
    /// This function will return an error if the input is too small or the magic number is wrong.
    pub fn read_from_slice(data: &[u8]) -> Result<Self, RawNcsdError> {
        let size = size_of::<Self>();
        if data.len() < size {
            return DataTooSmallSnafu { expected: size, actual: data.len() }.fail();
        }
        let header: Self = bytemuck::pod_read_unaligned(&data[..size]);
        if header.magic.0 != NCSD_MAGIC {
            return InvalidMagicSnafu { magic: header.magic }.fail();
        }
        Ok(header)
    }

    /// Byte offset of the NCCH container in partition `index`.
    ///
    /// # Errors
    ///
    /// This function will return an error if the partition is empty or out of range.
    pub fn partition_offset(&self, index: usize) -> Result<u64, RawNcsdError> {
        match self.partitions.get(index) {
            Some(partition) if partition.size != 0 => Ok(partition.offset as u64 * MEDIA_UNIT_SIZE),
            _ => NoPartitionSnafu { index }.fail(),
        }
    }
}
