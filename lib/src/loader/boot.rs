use std::{collections::BTreeMap, fmt::Display, mem::size_of, path::Path};

use super::{resolve_file_type, FileType};
use crate::{
    config::LoaderConfig,
    error::{LoadError, NotImplementedSnafu, ResultStatus, UnknownFileTypeSnafu},
    io::{open_file, read_exact_at},
    ncch::{raw::NcsdHeader, NcchContainer, RomFsRange},
};

/// Archives a booted program can mount.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArchiveIdCode {
    /// The application's RomFS.
    RomFs,
}

impl Display for ArchiveIdCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RomFs => write!(f, "RomFS"),
        }
    }
}

/// State produced by booting a file with [`load_file`].
#[derive(Default, Debug)]
pub struct BootContext {
    /// Program ID of the booted container.
    pub program_id: Option<u64>,
    /// Archives registered by the booted container.
    pub archives: BTreeMap<ArchiveIdCode, RomFsRange>,
}

impl BootContext {
    /// Creates an empty context with no program id and no archives.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an archive, replacing any previous one with the same ID.
    pub fn register_archive(&mut self, id: ArchiveIdCode, range: RomFsRange) {
        log::debug!("Registered {id} archive at {:#x}, size {:#x}", range.offset(), range.size());
        self.archives.insert(id, range);
    }

    /// Returns the archive registered under `id`, if any.
    pub fn archive(&self, id: ArchiveIdCode) -> Option<&RomFsRange> {
        self.archives.get(&id)
    }
}

/// Finds the NCCH container to boot from an NCSD image, which is the one in the first partition.
fn ncsd_boot_offset(path: &Path) -> Result<u64, LoadError> {
    let file = open_file(path)?;
    let mut buf = [0u8; size_of::<NcsdHeader>()];
    read_exact_at(&file, 0, &mut buf)?;
    let ncsd = NcsdHeader::read_from_slice(&buf)?;
    Ok(ncsd.partition_offset(0)?)
}

/// Identifies the file at `path` and boots it into `context`, returning the file type it was loaded as.
///
/// # Errors
///
/// This function will return an error if the file cannot be opened, the file type is unknown, the container fails to load, or the file type
/// is not handled by this crate.
pub fn load_file<P: AsRef<Path>>(
    path: P,
    context: &mut BootContext,
    config: &LoaderConfig,
) -> Result<FileType, LoadError> {
    let path = path.as_ref();
    open_file(path).inspect_err(|_| log::error!("Failed to open {}", path.display()))?;
    let file_type = resolve_file_type(path);
    log::info!("Loading file {} as {file_type}...", path.display());

    let ncch_offset = match file_type {
        FileType::Cxi => 0,
        FileType::Cci => ncsd_boot_offset(path)?,
        FileType::Elf | FileType::ThreeDsx | FileType::Bin => {
            return NotImplementedSnafu { file_type: file_type.as_str() }.fail();
        }
        FileType::Error | FileType::Unknown => {
            log::error!("File {} is of unknown type.", path.display());
            return UnknownFileTypeSnafu { path }.fail();
        }
    };

    let mut container = NcchContainer::new(path, ncch_offset).with_config(config.clone());
    container.load()?;
    context.program_id = Some(container.read_program_id()?);

    match container.read_romfs() {
        Ok(range) => context.register_archive(ArchiveIdCode::RomFs, range),
        Err(error) if error.status() == ResultStatus::ErrorNotUsed => {
            log::info!("{} has no RomFS to register", path.display());
        }
        Err(error) => return Err(error),
    }
    Ok(file_type)
}
