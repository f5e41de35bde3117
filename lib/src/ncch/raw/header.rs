use std::{
    fmt::Display,
    mem::size_of,
};

use bitfield_struct::bitfield;
use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use snafu::{Backtrace, Snafu};

use crate::str::{write_hash, AsciiArray, BlobSize};

/// Size of a media unit. All region offsets and sizes in the header count media units.
pub const MEDIA_UNIT_SIZE: u64 = 0x200;

/// Magic number of an NCCH header.
pub const NCCH_MAGIC: [u8; 4] = *b"NCCH";

/// NCCH container header, found at the start of every container.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Header {
    /// RSA-2048 signature over the rest of the header.
    pub signature: [u8; 0x100],
    /// Always `NCCH`.
    pub magic: AsciiArray<4>,
    /// Content size in media units.
    pub content_size: u32,
    /// Partition id.
    pub partition_id: [u8; 8],
    /// Maker code.
    pub maker_code: AsciiArray<2>,
    /// Format version.
    pub version: u16,
    /// Reserved.
    pub reserved0: [u8; 4],
    /// Program id.
    pub program_id: u64,
    /// Reserved.
    pub reserved1: [u8; 0x10],
    /// SHA-256 of the logo region.
    pub logo_region_hash: [u8; 0x20],
    /// Product code, such as `CTR-P-ABCD`.
    pub product_code: AsciiArray<0x10>,
    /// SHA-256 of the first 0x400 bytes of the extended header.
    pub extended_header_hash: [u8; 0x20],
    /// Extended header size in bytes. Zero if there is no extended header.
    pub extended_header_size: u32,
    /// Reserved.
    pub reserved2: [u8; 4],
    /// Flags.
    pub flags: NcchFlags,
    /// Plain region.
    pub plain_region: Region,
    /// Logo region.
    pub logo_region: Region,
    /// ExeFS region.
    pub exefs: HashedRegion,
    /// RomFS region.
    pub romfs: HashedRegion,
    /// SHA-256 of the ExeFS hashed region.
    pub exefs_super_block_hash: [u8; 0x20],
    /// SHA-256 of the RomFS hashed region.
    pub romfs_super_block_hash: [u8; 0x20],
}

unsafe impl Zeroable for Header {}
unsafe impl Pod for Header {}

/// Errors related to [`Header`].
#[derive(Debug, Snafu)]
pub enum RawHeaderError {
    /// Occurs when the input is too small to contain the header.
    #[snafu(display("expected {expected:#x} bytes for header but had only {actual:#x}:\n{backtrace}"))]
    DataTooSmall {
        /// Expected size.
        expected: usize,
        /// Actual input size.
        actual: usize,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when the magic number is not "NCCH".
    #[snafu(display("expected magic \"NCCH\" but got {magic:?}:\n{backtrace}"))]
    InvalidMagic {
        /// The magic number that was found.
        magic: AsciiArray<4>,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
}

impl Header {
    /// Copies a header out of `data`, which may be unaligned.
    ///
    /// # Errors
    ///
    /// This function will return an error if the input is too small.
    pub fn read_from_slice(data: &[u8]) -> Result<Self, RawHeaderError> {
        let size = size_of::<Self>();
        if data.len() < size {
            return DataTooSmallSnafu { expected: size, actual: data.len() }.fail();
        }
        Ok(bytemuck::pod_read_unaligned(&data[..size]))
    }

    /// Checks the magic number.
    ///
    /// # Errors
    ///
    /// This function will return an error if the magic number is not "NCCH".
    pub fn validate(&self) -> Result<(), RawHeaderError> {
        if self.magic.0 != NCCH_MAGIC {
            return InvalidMagicSnafu { magic: self.magic }.fail();
        }
        Ok(())
    }

    /// Returns `true` if an extended header is declared.
    pub fn has_exheader(&self) -> bool {
        self.extended_header_size != 0
    }

    /// Returns `true` if an ExeFS is declared.
    pub fn has_exefs(&self) -> bool {
        self.exefs.size != 0
    }

    /// Returns `true` if a RomFS is declared.
    pub fn has_romfs(&self) -> bool {
        self.romfs.size != 0
    }

    /// Returns a [`DisplayHeader`] which implements [`Display`].
    pub fn display(&self, indent: usize) -> DisplayHeader {
        DisplayHeader { header: self, indent }
    }
}

/// Can be used to display values in [`Header`].
pub struct DisplayHeader<'a> {
    header: &'a Header,
    indent: usize,
}

impl Display for DisplayHeader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let i = " ".repeat(self.indent);
        let header = &self.header;
        writeln!(f, "{i}Magic ................... : {}", header.magic)?;
        writeln!(f, "{i}Content size ............ : {}", BlobSize(header.content_size as u64 * MEDIA_UNIT_SIZE))?;
        writeln!(f, "{i}Program ID .............. : {:016x}", header.program_id)?;
        writeln!(f, "{i}Partition ID ............ : {:016x}", u64::from_le_bytes(header.partition_id))?;
        writeln!(f, "{i}Maker code .............. : {}", header.maker_code)?;
        writeln!(f, "{i}Version ................. : {}", header.version)?;
        writeln!(f, "{i}Product code ............ : {}", header.product_code)?;
        writeln!(f, "{i}ExHeader size ........... : {:#x}", header.extended_header_size)?;
        write!(f, "{i}ExHeader hash ........... : ")?;
        write_hash(f, &header.extended_header_hash)?;
        writeln!(f)?;
        write!(f, "{i}Flags\n{}", header.flags.display(self.indent + 2))?;
        write!(f, "{i}Plain region\n{}", header.plain_region.display(self.indent + 2))?;
        write!(f, "{i}Logo region\n{}", header.logo_region.display(self.indent + 2))?;
        write!(f, "{i}ExeFS\n{}", header.exefs.display(self.indent + 2))?;
        write!(f, "{i}RomFS\n{}", header.romfs.display(self.indent + 2))?;
        Ok(())
    }
}

/// Offset and size of a region, in media units relative to the container start.
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod, Serialize, Debug, PartialEq, Eq)]
pub struct Region {
    /// Offset in media units.
    pub offset: u32,
    /// Size in media units.
    pub size: u32,
}

impl Region {
    /// Offset in bytes relative to the container start.
    pub fn byte_offset(&self) -> u64 {
        self.offset as u64 * MEDIA_UNIT_SIZE
    }

    /// Size in bytes.
    pub fn byte_size(&self) -> u64 {
        self.size as u64 * MEDIA_UNIT_SIZE
    }

    /// Returns `true` if both the offset and the size are nonzero.
    pub fn is_present(&self) -> bool {
        self.offset != 0 && self.size != 0
    }

    /// Returns a [`DisplayRegion`] which implements [`Display`].
    pub fn display(&self, indent: usize) -> DisplayRegion {
        DisplayRegion { offset: self.byte_offset(), size: self.byte_size(), hash_region_size: None, indent }
    }
}

/// A region which also has a hashed prefix, such as the ExeFS and RomFS.
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod, Serialize, Debug, PartialEq, Eq)]
pub struct HashedRegion {
    /// Offset in media units.
    pub offset: u32,
    /// Size in media units.
    pub size: u32,
    /// Size of the hashed prefix in media units.
    pub hash_region_size: u32,
    /// Reserved.
    pub reserved: u32,
}

impl HashedRegion {
    /// Offset in bytes relative to the container start.
    pub fn byte_offset(&self) -> u64 {
        self.offset as u64 * MEDIA_UNIT_SIZE
    }

    /// Size in bytes.
    pub fn byte_size(&self) -> u64 {
        self.size as u64 * MEDIA_UNIT_SIZE
    }

    /// Returns a [`DisplayRegion`] which implements [`Display`].
    pub fn display(&self, indent: usize) -> DisplayRegion {
        DisplayRegion {
            offset: self.byte_offset(),
            size: self.byte_size(),
            hash_region_size: Some(self.hash_region_size as u64 * MEDIA_UNIT_SIZE),
            indent,
        }
    }
}

/// Can be used to display values in [`Region`] and [`HashedRegion`].
pub struct DisplayRegion {
    offset: u64,
    size: u64,
    hash_region_size: Option<u64>,
    indent: usize,
}

impl Display for DisplayRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let i = " ".repeat(self.indent);
        writeln!(f, "{i}Offset ........ : {:#x}", self.offset)?;
        writeln!(f, "{i}Size .......... : {:#x} ({})", self.size, BlobSize(self.size))?;
        if let Some(hash_region_size) = self.hash_region_size {
            writeln!(f, "{i}Hashed size ... : {:#x}", hash_region_size)?;
        }
        Ok(())
    }
}

/// The 8-byte flags vector of the header, read as one little-endian word.
#[bitfield(u64)]
#[derive(Serialize, PartialEq, Eq)]
pub struct NcchFlags {
    /// Reserved.
    #[bits(24)]
    pub reserved0: u32,
    /// Byte 3: key slot used when the content was encrypted.
    pub crypto_method: u8,
    /// Byte 4: 1 for the original platform, 2 for the newer model.
    pub content_platform: u8,
    /// Byte 5: content type bitmask.
    #[bits(8)]
    pub content_type: ContentType,
    /// Byte 6: content unit size is `0x200 << content_unit_size`.
    pub content_unit_size: u8,
    /// Use the fixed key instead of the key derived from the signature.
    pub fixed_crypto_key: bool,
    /// The RomFS must not be mounted.
    pub no_mount_romfs: bool,
    /// The content is not encrypted.
    pub no_crypto: bool,
    /// Reserved.
    #[bits(2)]
    pub reserved1: u8,
    /// Use seed-derived keys.
    pub seed_crypto: bool,
    /// Reserved.
    #[bits(2)]
    pub reserved2: u8,
}

unsafe impl Zeroable for NcchFlags {}
unsafe impl Pod for NcchFlags {}

impl NcchFlags {
    /// Returns a [`DisplayNcchFlags`] which implements [`Display`].
    pub fn display(&self, indent: usize) -> DisplayNcchFlags {
        DisplayNcchFlags { flags: *self, indent }
    }
}

/// Can be used to display values in [`NcchFlags`].
pub struct DisplayNcchFlags {
    flags: NcchFlags,
    indent: usize,
}

impl Display for DisplayNcchFlags {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let i = " ".repeat(self.indent);
        let flags = self.flags;
        writeln!(f, "{i}Crypto method ...... : {:#x}", flags.crypto_method())?;
        writeln!(f, "{i}Content platform ... : {}", flags.content_platform())?;
        writeln!(f, "{i}Content type ....... : {}", flags.content_type())?;
        writeln!(f, "{i}Content unit size .. : {:#x}", MEDIA_UNIT_SIZE << flags.content_unit_size().min(16))?;
        writeln!(f, "{i}Fixed crypto key ... : {}", flags.fixed_crypto_key())?;
        writeln!(f, "{i}No RomFS mount ..... : {}", flags.no_mount_romfs())?;
        writeln!(f, "{i}No crypto .......... : {}", flags.no_crypto())?;
        writeln!(f, "{i}Seed crypto ........ : {}", flags.seed_crypto())?;
        Ok(())
    }
}

/// Content type bitmask, byte 5 of [`NcchFlags`].
#[bitfield(u8)]
#[derive(Serialize, PartialEq, Eq)]
pub struct ContentType {
    /// Data content.
    pub data: bool,
    /// Executable content.
    pub executable: bool,
    /// System update.
    pub system_update: bool,
    /// Electronic manual.
    pub manual: bool,
    /// Download play child.
    pub child: bool,
    /// Trial.
    pub trial: bool,
    /// Reserved.
    #[bits(2)]
    pub reserved: u8,
}

impl Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = [
            (self.data(), "data"),
            (self.executable(), "executable"),
            (self.system_update(), "system update"),
            (self.manual(), "manual"),
            (self.child(), "child"),
            (self.trial(), "trial"),
        ];
        let mut first = true;
        for (_, name) in names.iter().filter(|(set, _)| *set) {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name}")?;
            first = false;
        }
        if first {
            write!(f, "none")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::mem::offset_of;

    use super::*;

    #[test]
    fn layout_matches_format() {
        assert_eq!(size_of::<Header>(), 0x200);
        assert_eq!(offset_of!(Header, magic), 0x100);
        assert_eq!(offset_of!(Header, content_size), 0x104);
        assert_eq!(offset_of!(Header, partition_id), 0x108);
        assert_eq!(offset_of!(Header, program_id), 0x118);
        assert_eq!(offset_of!(Header, product_code), 0x150);
        assert_eq!(offset_of!(Header, extended_header_size), 0x180);
        assert_eq!(offset_of!(Header, flags), 0x188);
        assert_eq!(offset_of!(Header, logo_region), 0x198);
        assert_eq!(offset_of!(Header, exefs), 0x1a0);
        assert_eq!(offset_of!(Header, romfs), 0x1b0);
    }

    #[test]
    fn flags_bits() {
        let mut bytes = [0u8; 8];
        bytes[5] = 0x03;
        bytes[7] = 0x04;
        let flags = NcchFlags::from_bits(u64::from_le_bytes(bytes));
        assert!(flags.no_crypto());
        assert!(!flags.fixed_crypto_key());
        assert!(flags.content_type().data());
        assert!(flags.content_type().executable());
        assert_eq!(flags.content_type().to_string(), "data, executable");
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut data = vec![0u8; 0x200];
        data[0x100..0x104].copy_from_slice(b"NCSD");
        let header = Header::read_from_slice(&data).unwrap();
        assert!(matches!(header.validate(), Err(RawHeaderError::InvalidMagic { .. })));

        data[0x100..0x104].copy_from_slice(b"NCCH");
        let header = Header::read_from_slice(&data).unwrap();
        assert!(header.validate().is_ok());
    }

    #[test]
    fn short_input_is_rejected() {
        assert!(matches!(Header::read_from_slice(&[0u8; 0x1ff]), Err(RawHeaderError::DataTooSmall { .. })));
    }
}
