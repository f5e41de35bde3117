mod common;

use std::fs;

use anyhow::Result;
use common::*;
use ncch::{
    config::LoaderConfig,
    error::ResultStatus,
    ncch::{NcchContainer, SectionSource},
};

fn embedded_game(dir: &std::path::Path) -> std::path::PathBuf {
    let (compressed, _) = compressed_code();
    let builder = NcchBuilder { compressed: true, romfs: Some(b"IVFC embedded".to_vec()), ..Default::default() }
        .section(".code", &compressed)
        .section("icon", b"embedded icon")
        .section("banner", b"embedded banner");
    builder.write(&dir.join("game.cxi"))
}

#[test]
fn section_file_overrides_one_section() -> Result<()> {
    init_logger();
    let dir = scratch_dir("override-section");
    let path = embedded_game(&dir);
    fs::create_dir_all(dir.join("game.cxi.exefsdir"))?;
    fs::write(dir.join("game.cxi.exefsdir/icon.icn"), b"modded icon")?;
    fs::write(dir.join("game.cxi.exefsdir/code.bin"), b"plain modded code")?;

    let mut container = NcchContainer::new(&path, 0);
    container.load()?;
    assert!(container.is_tainted());
    assert_eq!(container.load_section_exefs("icon")?, b"modded icon");
    assert_eq!(container.load_override_exefs_section("icon")?, b"modded icon");
    assert_eq!(container.load_section_exefs("banner")?, b"embedded banner");
    assert_eq!(container.load_override_exefs_section("banner").unwrap_err().status(), ResultStatus::ErrorNotUsed);

    // Override code is used verbatim even though the embedded code is compressed
    assert_eq!(container.load_section_exefs(".code")?, b"plain modded code");

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn exefs_image_replaces_embedded_exefs() -> Result<()> {
    init_logger();
    let dir = scratch_dir("override-exefs");
    let path = embedded_game(&dir);
    fs::write(dir.join("game.cxi.exefs"), exefs_image(&[("icon", &b"image icon"[..]), ("logo", &b"image logo"[..])]))?;

    let mut container = NcchContainer::new(&path, 0);
    container.load()?;
    assert!(container.is_tainted());
    assert!(container.has_exefs());
    assert_eq!(container.exefs_offset(), 0);
    assert!(container.overrides().exefs.is_overridden());

    assert_eq!(container.load_section_exefs("icon")?, b"image icon");
    assert_eq!(container.load_section_exefs("logo")?, b"image logo");
    assert_eq!(container.load_section_exefs("banner").unwrap_err().status(), ResultStatus::ErrorNotUsed);

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn section_file_wins_over_exefs_image() -> Result<()> {
    init_logger();
    let dir = scratch_dir("override-precedence");
    let path = embedded_game(&dir);
    fs::write(dir.join("game.cxi.exefs"), exefs_image(&[("icon", &b"image icon"[..])]))?;
    fs::create_dir_all(dir.join("game.cxi.exefsdir"))?;
    fs::write(dir.join("game.cxi.exefsdir/icon.icn"), b"file icon")?;

    let mut container = NcchContainer::new(&path, 0);
    assert_eq!(container.load_section_exefs("icon")?, b"file icon");

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn unreadable_exefs_image_is_ignored() -> Result<()> {
    init_logger();
    let dir = scratch_dir("override-bad-exefs");
    let path = embedded_game(&dir);
    fs::write(dir.join("game.cxi.exefs"), b"too short")?;

    let mut container = NcchContainer::new(&path, 0);
    container.load()?;
    assert_eq!(container.overrides().exefs, SectionSource::Embedded);
    assert!(!container.is_tainted());
    assert_eq!(container.load_section_exefs("icon")?, b"embedded icon");

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn romfs_file_overrides_embedded_romfs() -> Result<()> {
    init_logger();
    let dir = scratch_dir("override-romfs");
    let path = embedded_game(&dir);
    let override_path = dir.join("game.cxi.romfs");
    fs::write(&override_path, b"IVFC override")?;

    let mut container = NcchContainer::new(&path, 0);
    let romfs = container.read_romfs()?;
    assert!(container.is_tainted());
    assert_eq!(romfs.path(), override_path.as_path());
    assert_eq!(romfs.offset(), 0);
    assert_eq!(romfs.size(), 13);

    let mut copy = vec![];
    romfs.copy_to(&mut copy)?;
    assert_eq!(copy, b"IVFC override");

    fs::remove_dir_all(dir)?;
    Ok(())
}

#[test]
fn custom_naming_conventions() -> Result<()> {
    init_logger();
    let dir = scratch_dir("override-config");
    let path = embedded_game(&dir);
    let config = LoaderConfig::from_yaml(
        "exefs_dir_suffix: .mods\nromfs_suffix: .assets\nsections:\n  - section: icon\n    file_name: icon.bin\n",
    )?;
    fs::create_dir_all(dir.join("game.cxi.mods"))?;
    fs::write(dir.join("game.cxi.mods/icon.bin"), b"configured icon")?;
    fs::write(dir.join("game.cxi.assets"), b"assets")?;
    // Default names are no longer recognized
    fs::write(dir.join("game.cxi.romfs"), b"ignored")?;

    let mut container = NcchContainer::new(&path, 0).with_config(config);
    assert_eq!(container.load_section_exefs("icon")?, b"configured icon");
    assert_eq!(container.read_romfs()?.size(), 6);
    assert_eq!(container.load_override_exefs_section("banner").unwrap_err().status(), ResultStatus::ErrorNotFound);

    fs::remove_dir_all(dir)?;
    Ok(())
}
