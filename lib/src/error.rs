use std::{fmt::Display, path::PathBuf};

use serde::Serialize;
use snafu::{Backtrace, Snafu};

use crate::{
    compress::lz77::Lz77DecompressError,
    io::FileError,
    ncch::raw::{RawExHeaderError, RawExeFsError, RawHeaderError, RawNcsdError},
};

/// Coarse outcome of a loader operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ResultStatus {
    /// The operation succeeded.
    Success,
    /// I/O failure, such as a missing file or a short read.
    Error,
    /// Bad magic number or inconsistent sizes.
    ErrorInvalidFormat,
    /// The content is still encrypted.
    ErrorEncrypted,
    /// An optional section or region is absent.
    ErrorNotUsed,
    /// A named lookup had no match.
    ErrorNotFound,
    /// The file type is recognized but loading it is handled elsewhere.
    ErrorNotImplemented,
}

impl Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::ErrorInvalidFormat => "invalid format",
            Self::ErrorEncrypted => "encrypted",
            Self::ErrorNotUsed => "not used",
            Self::ErrorNotFound => "not found",
            Self::ErrorNotImplemented => "not implemented",
        };
        write!(f, "{name}")
    }
}

/// Errors related to loading containers and reading their sections.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum LoadError {
    /// See [`FileError`].
    #[snafu(transparent)]
    File {
        /// Source error.
        source: FileError,
    },
    /// See [`RawHeaderError`].
    #[snafu(transparent)]
    RawHeader {
        /// Source error.
        source: RawHeaderError,
    },
    /// See [`RawExHeaderError`].
    #[snafu(transparent)]
    RawExHeader {
        /// Source error.
        source: RawExHeaderError,
    },
    /// See [`RawExeFsError`].
    #[snafu(transparent)]
    RawExeFs {
        /// Source error.
        source: RawExeFsError,
    },
    /// See [`RawNcsdError`].
    #[snafu(transparent)]
    RawNcsd {
        /// Source error.
        source: RawNcsdError,
    },
    /// See [`Lz77DecompressError`].
    #[snafu(transparent)]
    Decompress {
        /// Source error.
        source: Lz77DecompressError,
    },
    /// Occurs when a region declared by a header extends past the end of its file.
    #[snafu(display(
        "{what} at {offset:#x} with size {size:#x} extends past the end of the file ({file_size:#x} bytes):\n{backtrace}"
    ))]
    RegionOutOfBounds {
        /// Name of the region.
        what: String,
        /// Absolute offset of the region.
        offset: u64,
        /// Declared size of the region.
        size: u64,
        /// Actual size of the file.
        file_size: u64,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when the extended header does not agree with the header, which means it is still encrypted.
    #[snafu(display(
        "extended header program ID {exheader_program_id:016x} does not match {program_id:016x}, the container is probably encrypted:\n{backtrace}"
    ))]
    Encrypted {
        /// Program ID from the header.
        program_id: u64,
        /// Program ID from the extended header.
        exheader_program_id: u64,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when an optional section or region is requested but absent.
    #[snafu(display("the container has no {what}:\n{backtrace}"))]
    NotUsed {
        /// What was requested.
        what: String,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when a section name has no known override file.
    #[snafu(display("no override file is known for section '{name}':\n{backtrace}"))]
    NotFound {
        /// The section name.
        name: String,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when a file is of a type whose loader lives outside this crate.
    #[snafu(display("loading {file_type} files is not implemented:\n{backtrace}"))]
    NotImplemented {
        /// Name of the file type.
        file_type: String,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when neither the contents nor the extension of a file identify its type.
    #[snafu(display("'{}' is of unknown type:\n{backtrace}", path.display()))]
    UnknownFileType {
        /// Path to the file.
        path: PathBuf,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
    /// Occurs when a container whose load already failed is used again.
    #[snafu(display("the container previously failed to load ({status}):\n{backtrace}"))]
    PreviouslyFailed {
        /// Status of the original failure.
        status: ResultStatus,
        /// Backtrace to the source of the error.
        backtrace: Backtrace,
    },
}

impl LoadError {
    /// Maps this error to its [`ResultStatus`].
    pub fn status(&self) -> ResultStatus {
        match self {
            Self::File { .. } => ResultStatus::Error,
            Self::RawHeader { source: RawHeaderError::DataTooSmall { .. } }
            | Self::RawExHeader { source: RawExHeaderError::DataTooSmall { .. } }
            | Self::RawExeFs { source: RawExeFsError::DataTooSmall { .. } }
            | Self::RawNcsd { source: RawNcsdError::DataTooSmall { .. } } => ResultStatus::Error,
            Self::RawHeader { .. }
            | Self::RawExeFs { .. }
            | Self::RawNcsd { .. }
            | Self::Decompress { .. }
            | Self::RegionOutOfBounds { .. }
            | Self::UnknownFileType { .. } => ResultStatus::ErrorInvalidFormat,
            Self::Encrypted { .. } => ResultStatus::ErrorEncrypted,
            Self::NotUsed { .. } => ResultStatus::ErrorNotUsed,
            Self::NotFound { .. } => ResultStatus::ErrorNotFound,
            Self::NotImplemented { .. } => ResultStatus::ErrorNotImplemented,
            Self::PreviouslyFailed { status, .. } => *status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        let error = NotUsedSnafu { what: "RomFS" }.build();
        assert_eq!(error.status(), ResultStatus::ErrorNotUsed);
        assert_eq!(error.to_string().lines().next(), Some("the container has no RomFS:"));

        let error = PreviouslyFailedSnafu { status: ResultStatus::ErrorEncrypted }.build();
        assert_eq!(error.status(), ResultStatus::ErrorEncrypted);

        let error: LoadError = crate::compress::lz77::Lz77 {}.decompress(&[0u8; 4]).unwrap_err().into();
        assert_eq!(error.status(), ResultStatus::ErrorInvalidFormat);
    }
}
