use std::{fmt::Display, io::Read, path::Path};

use serde::Serialize;

use crate::{
    io::open_file,
    ncch::raw::{NCCH_MAGIC, NCSD_MAGIC},
};

/// Kind of an executable file, as identified by [`identify_file`] or [`guess_from_extension`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum FileType {
    /// The file could not be read.
    Error,
    /// No known magic number.
    Unknown,
    /// An ELF executable.
    Elf,
    /// A homebrew 3DSX executable.
    ThreeDsx,
    /// A single NCCH container.
    Cxi,
    /// An NCSD image holding NCCH containers in its partitions.
    Cci,
    /// A raw binary, identified by extension only.
    Bin,
}

impl FileType {
    /// Name of the file type for display.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cci => "NCSD",
            Self::Cxi => "NCCH",
            Self::ThreeDsx => "3DSX",
            Self::Elf => "ELF",
            Self::Bin => "raw",
            Self::Error | Self::Unknown => "unknown",
        }
    }
}

impl Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const PROBE_SIZE: usize = 0x104;

/// Identifies a file by its magic numbers. Returns [`FileType::Error`] if the file cannot be opened.
pub fn identify_file<P: AsRef<Path>>(path: P) -> FileType {
    let Ok(mut file) = open_file(path) else {
        return FileType::Error;
    };
    let mut probe = Vec::with_capacity(PROBE_SIZE);
    if file.by_ref().take(PROBE_SIZE as u64).read_to_end(&mut probe).is_err() {
        return FileType::Error;
    }
    identify_bytes(&probe)
}

/// Identifies file contents by their magic numbers.
pub fn identify_bytes(data: &[u8]) -> FileType {
    if data.starts_with(b"3DSX") {
        FileType::ThreeDsx
    } else if data.starts_with(b"\x7fELF") {
        FileType::Elf
    } else if data.get(0x100..0x104) == Some(&NCCH_MAGIC[..]) {
        FileType::Cxi
    } else if data.get(0x100..0x104) == Some(&NCSD_MAGIC[..]) {
        FileType::Cci
    } else {
        FileType::Unknown
    }
}

/// Guesses the file type from the extension, ignoring case.
pub fn guess_from_extension<P: AsRef<Path>>(path: P) -> FileType {
    let Some(extension) = path.as_ref().extension().and_then(|ext| ext.to_str()) else {
        return FileType::Unknown;
    };
    match extension.to_ascii_lowercase().as_str() {
        "elf" | "axf" => FileType::Elf,
        "cxi" => FileType::Cxi,
        "cci" | "3ds" => FileType::Cci,
        "bin" => FileType::Bin,
        "3dsx" => FileType::ThreeDsx,
        _ => FileType::Unknown,
    }
}

/// Combines [`identify_file`] and [`guess_from_extension`]. The contents win, unless they are not recognized.
pub fn resolve_file_type<P: AsRef<Path>>(path: P) -> FileType {
    let path = path.as_ref();
    let identified = identify_file(path);
    let guessed = guess_from_extension(path);

    if identified != guessed {
        log::warn!(
            "File {} has a different type than its extension suggests ({identified:?} vs {guessed:?})",
            path.display()
        );
        if identified == FileType::Unknown {
            return guessed;
        }
    }
    identified
}
