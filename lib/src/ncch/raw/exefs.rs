use std::{fmt::Display, mem::size_of};

use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use snafu::{Backtrace, Snafu};

use crate::str::{write_hash, AsciiArray};

/// Number of section slots in an ExeFS header.
pub const EXEFS_SECTION_COUNT: usize = 8;

/// Size of the ExeFS header block. Section offsets are relative to the end of this block.
pub const EXEFS_HEADER_SIZE: u64 = 0x200;

/// Header of an ExeFS, listing up to eight named sections.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ExeFsHeader {
    /// Section slots.
    pub sections: [ExeFsSection; EXEFS_SECTION_COUNT],
    /// Reserved.
    pub reserved: [u8; 0x80],
    /// SHA-256 hashes in reverse order: the last hash belongs to the first section.
    pub hashes: [[u8; 0x20]; EXEFS_SECTION_COUNT],
}

unsafe impl Zeroable for ExeFsHeader {}
unsafe impl Pod for ExeFsHeader {}

/// A slot in the ExeFS header. Slots with size zero are unused.
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod, Serialize, Debug, PartialEq, Eq)]
pub struct ExeFsSection {
    /// Section name, NUL-padded.
    pub name: AsciiArray<8>,
    /// Offset in bytes, relative to the end of the ExeFS header.
    pub offset: u32,
    /// Size in bytes.
    pub size: u32,
}

/// Errors related to [`ExeFsHeader`].
#[derive(Debug, Snafu)]
pub enum RawExeFsError {
    /// Occurs when the input is too small to contain the header.
    #[snafu(display("expected {expected:#x} bytes for ExeFS header but had only {actual:#x}:\n{backtrace}"))]
    DataTooSmall {
        /// Expected size.
        expected: usize,
        /// Actual input size.
        actual: usize,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when a section ends past the end of the ExeFS.
    #[snafu(display("section '{name}' at {offset:#x}+{size:#x} exceeds the ExeFS size {exefs_size:#x}:\n{backtrace}"))]
    SectionOutOfBounds {
        /// Section name.
        name: String,
        /// Section offset relative to the end of the header.
        offset: u32,
        /// Section size.
        size: u32,
        /// Size of the ExeFS, including the header.
        exefs_size: u64,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
}

impl ExeFsHeader {
    /// Copies an ExeFS header out of `data`, which may be unaligned.
    ///
    /// # Errors
    ///
    /// This function will return an error if the input is too small.
    pub fn read_from_slice(data: &[u8]) -> Result<Self, RawExeFsError> {
        let size = size_of::<Self>();
        if data.len() < size {
            return DataTooSmallSnafu { expected: size, actual: data.len() }.fail();
        }
        Ok(bytemuck::pod_read_unaligned(&data[..size]))
    }

    /// Finds the slot index of a used section with exactly this name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|section| section.size != 0 && section.name.matches(name))
    }

    /// Finds a used section with exactly this name.
    pub fn section(&self, name: &str) -> Option<&ExeFsSection> {
        self.position(name).map(|index| &self.sections[index])
    }

    /// Returns the stored SHA-256 hash of the section in slot `index`. Hashes are not verified.
    pub fn hash(&self, index: usize) -> Option<&[u8; 0x20]> {
        (index < EXEFS_SECTION_COUNT).then(|| &self.hashes[EXEFS_SECTION_COUNT - 1 - index])
    }

    /// Iterates over the used sections.
    pub fn used_sections(&self) -> impl Iterator<Item = &ExeFsSection> {
        self.sections.iter().filter(|section| section.size != 0)
    }

    /// Checks that every used section lies within an ExeFS of `exefs_size` bytes.
    ///
    /// # Errors
    ///
    /// This function will return an error for the first section that does not fit.
    pub fn check_bounds(&self, exefs_size: u64) -> Result<(), RawExeFsError> {
        for section in self.used_sections() {
            let end = EXEFS_HEADER_SIZE + section.offset as u64 + section.size as u64;
            if end > exefs_size {
                return SectionOutOfBoundsSnafu {
                    name: section.name.to_string(),
                    offset: section.offset,
                    size: section.size,
                    exefs_size,
                }
                .fail();
            }
        }
        Ok(())
    }

    /// Returns a [`DisplayExeFsHeader`] which implements [`Display`].
    pub fn display(&self, indent: usize) -> DisplayExeFsHeader {
        DisplayExeFsHeader { header: self, indent }
    }
}

/// Can be used to display values in [`ExeFsHeader`].
pub struct DisplayExeFsHeader<'a> {
    header: &'a ExeFsHeader,
    indent: usize,
}

impl Display for DisplayExeFsHeader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let i = " ".repeat(self.indent);
        for (index, section) in self.header.sections.iter().enumerate() {
            if section.size == 0 {
                continue;
            }
            write!(f, "{i}{index}: {:<8} offset {:#08x} size {:#08x} sha256 ", section.name.to_string(), section.offset, section.size)?;
            if let Some(hash) = self.header.hash(index) {
                write_hash(f, hash)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
