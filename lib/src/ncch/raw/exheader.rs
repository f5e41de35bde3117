use std::{fmt::Display, mem::size_of};

use bitfield_struct::bitfield;
use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use snafu::{Backtrace, Snafu};

use crate::str::AsciiArray;

/// Extended header, describing the code layout and capabilities of the program.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct ExHeader {
    /// Code layout.
    pub codeset_info: CodeSetInfo,
    /// Program ids of required modules. Zero entries are unused.
    pub dependency_list: [u64; 0x30],
    /// Save data and jump id.
    pub system_info: SystemInfo,
    /// ARM11 system-local capabilities.
    pub arm11_system_local_caps: Arm11SystemLocalCaps,
    /// ARM11 kernel capabilities.
    pub arm11_kernel_caps: Arm11KernelCaps,
    /// ARM9 access control.
    pub arm9_access_control: Arm9AccessControl,
    /// Signed copy of the capabilities.
    pub access_desc: AccessDescriptor,
}

unsafe impl Zeroable for ExHeader {}
unsafe impl Pod for ExHeader {}

/// Errors related to [`ExHeader`].
#[derive(Debug, Snafu)]
pub enum RawExHeaderError {
    /// Occurs when the input is too small to contain the extended header.
    #[snafu(display("expected {expected:#x} bytes for extended header but had only {actual:#x}:\n{backtrace}"))]
    DataTooSmall {
        /// Expected size.
        expected: usize,
        /// Actual input size.
        actual: usize,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
}

impl ExHeader {
    /// Copies an extended header out of `data`, which may be unaligned. The contents are not validated.
    ///
    /// # Errors
    ///
    /// This function will return an error if the input is too small.
    pub fn read_from_slice(data: &[u8]) -> Result<Self, RawExHeaderError> {
        let size = size_of::<Self>();
        if data.len() < size {
            return DataTooSmallSnafu { expected: size, actual: data.len() }.fail();
        }
        Ok(bytemuck::pod_read_unaligned(&data[..size]))
    }

    /// Returns `true` if the `.code` section is compressed.
    pub fn is_code_compressed(&self) -> bool {
        self.codeset_info.flags.is_code_compressed()
    }

    /// Iterates over the program IDs this program depends on.
    pub fn dependencies(&self) -> impl Iterator<Item = u64> + '_ {
        self.dependency_list.iter().copied().filter(|&id| id != 0)
    }

    /// Returns a [`DisplayExHeader`] which implements [`Display`].
    pub fn display(&self, indent: usize) -> DisplayExHeader {
        DisplayExHeader { exheader: self, indent }
    }
}

/// Can be used to display values in [`ExHeader`].
pub struct DisplayExHeader<'a> {
    exheader: &'a ExHeader,
    indent: usize,
}

impl Display for DisplayExHeader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let i = " ".repeat(self.indent);
        let codeset = &self.exheader.codeset_info;
        let caps = &self.exheader.arm11_system_local_caps;
        writeln!(f, "{i}Name .................... : {}", codeset.name)?;
        writeln!(f, "{i}Code compressed ......... : {}", codeset.flags.is_code_compressed())?;
        writeln!(f, "{i}SD application .......... : {}", codeset.flags.is_sd_application())?;
        writeln!(f, "{i}Remaster version ........ : {}", codeset.flags.remaster_version)?;
        write!(f, "{i}Text\n{}", codeset.text.display(self.indent + 2))?;
        write!(f, "{i}Read-only data\n{}", codeset.ro.display(self.indent + 2))?;
        write!(f, "{i}Data\n{}", codeset.data.display(self.indent + 2))?;
        writeln!(f, "{i}Stack size .............. : {:#x}", codeset.stack_size)?;
        writeln!(f, "{i}BSS size ................ : {:#x}", codeset.bss_size)?;
        writeln!(f, "{i}Save data size .......... : {:#x}", self.exheader.system_info.save_data_size)?;
        writeln!(f, "{i}Jump ID ................. : {:016x}", self.exheader.system_info.jump_id)?;
        writeln!(f, "{i}Program ID .............. : {:016x}", caps.program_id)?;
        writeln!(f, "{i}Core version ............ : {:#x}", caps.core_version)?;
        writeln!(f, "{i}Priority ................ : {}", caps.priority)?;
        writeln!(f, "{i}Ideal processor ......... : {}", caps.flags0.ideal_processor())?;
        writeln!(f, "{i}Affinity mask ........... : {:#x}", caps.flags0.affinity_mask())?;
        writeln!(f, "{i}System mode ............. : {}", caps.flags0.system_mode())?;
        writeln!(f, "{i}Resource limit category . : {}", caps.resource_limit_category)?;
        writeln!(f, "{i}Services")?;
        for service in caps.services() {
            writeln!(f, "{i}  {service}")?;
        }
        writeln!(f, "{i}Dependencies")?;
        for dependency in self.exheader.dependencies() {
            writeln!(f, "{i}  {dependency:016x}")?;
        }
        Ok(())
    }
}

/// Code layout of the program.
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
pub struct CodeSetInfo {
    /// Process name.
    pub name: AsciiArray<8>,
    /// Compression and SD flags.
    pub flags: SystemInfoFlags,
    /// Text segment.
    pub text: CodeSegmentInfo,
    /// Stack size in bytes.
    pub stack_size: u32,
    /// Read-only data segment.
    pub ro: CodeSegmentInfo,
    /// Reserved.
    pub reserved: [u8; 4],
    /// Data segment.
    pub data: CodeSegmentInfo,
    /// BSS size in bytes.
    pub bss_size: u32,
}

/// Flags of [`CodeSetInfo`].
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
pub struct SystemInfoFlags {
    /// Reserved.
    pub reserved: [u8; 5],
    /// Bit 0: `.code` is compressed. Bit 1: SD application.
    pub flag: u8,
    /// Remaster version.
    pub remaster_version: u16,
}

impl SystemInfoFlags {
    /// Returns `true` if the `.code` section is LZ77 compressed.
    pub fn is_code_compressed(&self) -> bool {
        (self.flag & 0x1) != 0
    }

    /// Returns `true` if the program runs from the SD card.
    pub fn is_sd_application(&self) -> bool {
        (self.flag & 0x2) != 0
    }
}

/// Placement of one code segment.
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod, Serialize, Debug, PartialEq, Eq)]
pub struct CodeSegmentInfo {
    /// Load address.
    pub address: u32,
    /// Size in pages, rounded up.
    pub num_max_pages: u32,
    /// Size in bytes.
    pub code_size: u32,
}

impl CodeSegmentInfo {
    /// Returns a [`DisplayCodeSegmentInfo`] which implements [`Display`].
    pub fn display(&self, indent: usize) -> DisplayCodeSegmentInfo {
        DisplayCodeSegmentInfo { segment: self, indent }
    }
}

/// Can be used to display values in [`CodeSegmentInfo`].
pub struct DisplayCodeSegmentInfo<'a> {
    segment: &'a CodeSegmentInfo,
    indent: usize,
}

impl Display for DisplayCodeSegmentInfo<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let i = " ".repeat(self.indent);
        let segment = &self.segment;
        writeln!(f, "{i}Address ....... : {:#x}", segment.address)?;
        writeln!(f, "{i}Max pages ..... : {:#x}", segment.num_max_pages)?;
        writeln!(f, "{i}Size .......... : {:#x}", segment.code_size)?;
        Ok(())
    }
}

/// Save data size and jump id.
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
pub struct SystemInfo {
    /// Save data size in bytes.
    pub save_data_size: u64,
    /// Program id to jump to.
    pub jump_id: u64,
    /// Reserved.
    pub reserved: [u8; 0x30],
}

/// Save data and file system access of the program.
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
pub struct StorageInfo {
    /// Extdata id.
    pub ext_save_data_id: [u8; 8],
    /// System save data ids.
    pub system_save_data_id: [u8; 8],
    /// Reserved.
    pub reserved: [u8; 8],
    /// File system access flags.
    pub access_info: [u8; 7],
    /// Other attributes.
    pub other_attributes: u8,
}

/// ARM11 system-local capabilities.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct Arm11SystemLocalCaps {
    /// Program id. Must equal the header's program id.
    pub program_id: u64,
    /// Core version.
    pub core_version: u32,
    /// Reserved flags.
    pub reserved_flags: [u8; 2],
    /// Processor and mode flags.
    pub flags0: LocalCapsFlags,
    /// Main thread priority.
    pub priority: u8,
    /// Resource limit descriptors.
    pub resource_limit_descriptors: [u16; 0x10],
    /// Storage access.
    pub storage_info: StorageInfo,
    /// Service names.
    pub service_access_control: [AsciiArray<8>; 0x20],
    /// Extended service names.
    pub ex_service_access_control: [AsciiArray<8>; 0x2],
    /// Reserved.
    pub reserved: [u8; 0xf],
    /// Resource limit category.
    pub resource_limit_category: u8,
}

unsafe impl Zeroable for Arm11SystemLocalCaps {}
unsafe impl Pod for Arm11SystemLocalCaps {}

impl Arm11SystemLocalCaps {
    /// Iterates over the names of services the program may access.
    pub fn services(&self) -> impl Iterator<Item = &AsciiArray<8>> {
        self.service_access_control
            .iter()
            .chain(self.ex_service_access_control.iter())
            .filter(|service| !service.is_empty())
    }
}

/// The packed `flags0` byte of [`Arm11SystemLocalCaps`].
#[bitfield(u8)]
pub struct LocalCapsFlags {
    /// Ideal processor.
    #[bits(2)]
    pub ideal_processor: u8,
    /// Affinity mask.
    #[bits(2)]
    pub affinity_mask: u8,
    /// System mode.
    #[bits(4)]
    pub system_mode: u8,
}

unsafe impl Zeroable for LocalCapsFlags {}
unsafe impl Pod for LocalCapsFlags {}

/// ARM11 kernel capability descriptors. Interpreting them is left to the kernel.
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
pub struct Arm11KernelCaps {
    /// Kernel capability descriptors.
    pub descriptors: [u32; 28],
    /// Reserved.
    pub reserved: [u8; 0x10],
}

/// ARM9 access control descriptors.
#[repr(C)]
#[derive(Clone, Copy, Zeroable, Pod)]
pub struct Arm9AccessControl {
    /// Descriptor bytes.
    pub descriptors: [u8; 15],
    /// Descriptor version.
    pub desc_version: u8,
}

/// Signed copy of the capabilities, used for signature verification which is not performed here.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct AccessDescriptor {
    /// RSA-2048 signature.
    pub signature: [u8; 0x100],
    /// Public key used for the header signature.
    pub ncch_public_key_modulus: [u8; 0x100],
    /// ARM11 system-local capabilities.
    pub arm11_system_local_caps: Arm11SystemLocalCaps,
    /// ARM11 kernel capabilities.
    pub arm11_kernel_caps: Arm11KernelCaps,
    /// ARM9 access control.
    pub arm9_access_control: Arm9AccessControl,
}

unsafe impl Zeroable for AccessDescriptor {}
unsafe impl Pod for AccessDescriptor {}
