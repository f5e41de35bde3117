mod common;

use std::fs;

use anyhow::Result;
use common::*;
use ncch::{
    config::LoaderConfig,
    error::{LoadError, ResultStatus},
    loader::{load_file, ArchiveIdCode, BootContext, FileType},
};

#[test]
fn boots_cxi_and_registers_romfs() -> Result<()> {
    init_logger();
    let dir = scratch_dir("boot-cxi");
    let builder = NcchBuilder { romfs: Some(b"IVFC".to_vec()), ..Default::default() }.section(".code", b"code");
    let path = builder.write(&dir.join("game.cxi"));

    let mut context = BootContext::new();
    let file_type = load_file(&path, &mut context, &LoaderConfig::default())?;
    assert_eq!(file_type, FileType::Cxi);
    assert_eq!(context.program_id, Some(PROGRAM_ID));
    let romfs = context.archive(ArchiveIdCode::RomFs).unwrap();
    assert_eq!(romfs.size(), UNIT as u64);

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn boots_first_ncsd_partition() -> Result<()> {
    init_logger();
    let dir = scratch_dir("boot-cci");
    let container = NcchBuilder { romfs: Some(b"IVFC".to_vec()), ..Default::default() }.section(".code", b"code").build();

    let mut data = vec![0u8; 0x4000];
    data[0x100..0x104].copy_from_slice(b"NCSD");
    data[0x120..0x124].copy_from_slice(&0x20u32.to_le_bytes());
    data[0x124..0x128].copy_from_slice(&((container.len() / UNIT) as u32).to_le_bytes());
    let romfs_offset = (data.len() + container.len() - UNIT) as u64;
    data.extend(container);
    let path = dir.join("game.3ds");
    fs::write(&path, data)?;

    let mut context = BootContext::new();
    assert_eq!(load_file(&path, &mut context, &LoaderConfig::default())?, FileType::Cci);
    assert_eq!(context.program_id, Some(PROGRAM_ID));
    assert_eq!(context.archive(ArchiveIdCode::RomFs).unwrap().offset(), romfs_offset);

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn boots_without_romfs() -> Result<()> {
    init_logger();
    let dir = scratch_dir("boot-no-romfs");
    // Contents win over the misleading extension
    let path = NcchBuilder::default().section(".code", b"code").write(&dir.join("game.3dsx"));

    let mut context = BootContext::new();
    assert_eq!(load_file(&path, &mut context, &LoaderConfig::default())?, FileType::Cxi);
    assert!(context.archives.is_empty());

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn rejects_unknown_and_foreign_files() -> Result<()> {
    init_logger();
    let dir = scratch_dir("boot-other");

    let unknown = dir.join("notes.txt");
    fs::write(&unknown, b"hello")?;
    let error = load_file(&unknown, &mut BootContext::new(), &LoaderConfig::default()).unwrap_err();
    assert!(matches!(error, LoadError::UnknownFileType { .. }));
    assert_eq!(error.status(), ResultStatus::ErrorInvalidFormat);

    let elf = dir.join("program.elf");
    fs::write(&elf, b"\x7fELF\x01\x01\x01")?;
    let error = load_file(&elf, &mut BootContext::new(), &LoaderConfig::default()).unwrap_err();
    assert_eq!(error.status(), ResultStatus::ErrorNotImplemented);

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn missing_file_is_io_error() -> Result<()> {
    init_logger();
    let dir = scratch_dir("boot-missing");

    let mut context = BootContext::new();
    let error = load_file(dir.join("missing.cxi"), &mut context, &LoaderConfig::default()).unwrap_err();
    assert!(matches!(error, LoadError::File { .. }));
    assert_eq!(error.status(), ResultStatus::Error);
    assert!(context.program_id.is_none());

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn failed_load_leaves_context_empty() -> Result<()> {
    init_logger();
    let dir = scratch_dir("boot-encrypted");
    let builder = NcchBuilder { exheader_program_id: Some(1), romfs: Some(b"IVFC".to_vec()), ..Default::default() };
    let path = builder.write(&dir.join("game.cxi"));

    let mut context = BootContext::new();
    let error = load_file(&path, &mut context, &LoaderConfig::default()).unwrap_err();
    assert_eq!(error.status(), ResultStatus::ErrorEncrypted);
    assert!(context.program_id.is_none());
    assert!(context.archives.is_empty());

    fs::remove_dir_all(dir)?;
    Ok(())
}
