#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use log::LevelFilter;

pub const UNIT: usize = 0x200;
pub const PROGRAM_ID: u64 = 0x0004_0000_0012_3400;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).filter_level(LevelFilter::Debug).try_init();
}

/// Creates an empty scratch directory under the system temp directory.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ncch-test-{name}-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

pub fn put_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn pad_to_unit(data: &mut Vec<u8>) {
    let padded = data.len().div_ceil(UNIT) * UNIT;
    data.resize(padded, 0);
}

/// A header with only the magic number set.
pub fn bare_header() -> Vec<u8> {
    let mut header = vec![0u8; UNIT];
    header[0x100..0x104].copy_from_slice(b"NCCH");
    header
}

/// Sets the RomFS region of a header, in media units.
pub fn set_romfs_region(header: &mut [u8], offset: u32, size: u32) {
    put_u32(header, 0x1b0, offset);
    put_u32(header, 0x1b4, size);
}

/// Builds synthetic NCCH containers.
pub struct NcchBuilder {
    pub program_id: u64,
    pub exheader_program_id: Option<u64>,
    pub exheader: bool,
    pub compressed: bool,
    pub sections: Vec<(&'static str, Vec<u8>)>,
    pub logo_region: Option<Vec<u8>>,
    pub romfs: Option<Vec<u8>>,
}

impl Default for NcchBuilder {
    fn default() -> Self {
        Self {
            program_id: PROGRAM_ID,
            exheader_program_id: None,
            exheader: true,
            compressed: false,
            sections: vec![],
            logo_region: None,
            romfs: None,
        }
    }
}

impl NcchBuilder {
    pub fn section(mut self, name: &'static str, data: &[u8]) -> Self {
        self.sections.push((name, data.to_vec()));
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let mut data = bare_header();
        data[0x118..0x120].copy_from_slice(&self.program_id.to_le_bytes());
        data[0x150..0x15a].copy_from_slice(b"CTR-P-TEST");
        // no_crypto
        data[0x18f] = 0x04;

        if self.exheader {
            put_u32(&mut data, 0x180, 0x400);
            let mut exheader = vec![0u8; 0x800];
            exheader[..4].copy_from_slice(b"test");
            if self.compressed {
                exheader[0xd] = 0x01;
            }
            let program_id = self.exheader_program_id.unwrap_or(self.program_id);
            exheader[0x200..0x208].copy_from_slice(&program_id.to_le_bytes());
            data.extend(exheader);
        }

        if let Some(logo) = &self.logo_region {
            let offset = data.len() / UNIT;
            data.extend_from_slice(logo);
            pad_to_unit(&mut data);
            put_u32(&mut data, 0x198, offset as u32);
            let units = data.len() / UNIT;
            put_u32(&mut data, 0x19c, (units - offset) as u32);
        }

        if !self.sections.is_empty() {
            let sections: Vec<(&str, &[u8])> = self.sections.iter().map(|(name, data)| (*name, data.as_slice())).collect();
            let exefs = exefs_image(&sections);
            let units = data.len() / UNIT;
            put_u32(&mut data, 0x1a0, units as u32);
            put_u32(&mut data, 0x1a4, (exefs.len() / UNIT) as u32);
            put_u32(&mut data, 0x1a8, 1);
            data.extend(exefs);
        }

        if let Some(romfs) = &self.romfs {
            let offset = data.len() / UNIT;
            data.extend_from_slice(romfs);
            pad_to_unit(&mut data);
            let units = data.len() / UNIT;
            set_romfs_region(&mut data, offset as u32, (units - offset) as u32);
        }

        let units = data.len() / UNIT;
        put_u32(&mut data, 0x104, units as u32);
        data
    }

    /// Builds the container and writes it to `path`.
    pub fn write(&self, path: &Path) -> PathBuf {
        fs::write(path, self.build()).unwrap();
        path.to_path_buf()
    }
}

/// An ExeFS image holding only the given sections, as used by full ExeFS overrides.
pub fn exefs_image(sections: &[(&str, &[u8])]) -> Vec<u8> {
    let mut exefs = vec![0u8; UNIT];
    for (slot, (name, contents)) in sections.iter().enumerate() {
        let offset = exefs.len() - UNIT;
        let entry = slot * 0x10;
        exefs[entry..entry + name.len()].copy_from_slice(name.as_bytes());
        put_u32(&mut exefs, entry + 8, offset as u32);
        put_u32(&mut exefs, entry + 12, contents.len() as u32);
        exefs.extend_from_slice(contents);
        pad_to_unit(&mut exefs);
    }
    exefs
}

/// Compressed `.code` that decompresses to "HEAD" followed by "xyz" seven times.
pub fn compressed_code() -> (Vec<u8>, Vec<u8>) {
    let mut compressed = b"HEAD".to_vec();
    compressed.extend_from_slice(&[0x00, 0xf0, b'x', b'y', b'z', 0x10]);
    compressed.extend_from_slice(&[14, 0, 0, 8, 7, 0, 0, 0]);

    let mut expected = b"HEAD".to_vec();
    for _ in 0..7 {
        expected.extend_from_slice(b"xyz");
    }
    (compressed, expected)
}
