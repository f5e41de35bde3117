//! Loads NCCH containers: headers, ExeFS sections, override files and RomFS ranges.

#![warn(missing_docs)]

/// Compression algorithms.
pub mod compress;
/// Override file naming conventions.
pub mod config;
/// Loader errors and status codes.
pub mod error;
/// File utilities.
pub mod io;
/// File type detection and booting.
pub mod loader;
/// NCCH containers.
pub mod ncch;
/// String utilities.
pub mod str;
