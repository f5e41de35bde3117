use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use crate::config::LoaderConfig;

/// Where a section or region is read from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SectionSource {
    /// Read from the container itself.
    Embedded,
    /// Read from a file next to the container.
    Overridden(PathBuf),
}

impl SectionSource {
    /// Returns `true` if the data comes from an override file.
    pub fn is_overridden(&self) -> bool {
        matches!(self, Self::Overridden(_))
    }

    /// Override file path, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Embedded => None,
            Self::Overridden(path) => Some(path),
        }
    }
}

/// Override files found next to a container. Resolved once per load, files appearing or disappearing afterwards are not
/// noticed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Overrides {
    /// A full ExeFS image replacing the embedded ExeFS.
    pub exefs: SectionSource,
    /// A full RomFS image replacing the embedded RomFS.
    pub romfs: SectionSource,
    sections: Vec<(String, PathBuf)>,
}

impl Default for Overrides {
    fn default() -> Self {
        Self { exefs: SectionSource::Embedded, romfs: SectionSource::Embedded, sections: vec![] }
    }
}

pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    name.into()
}

impl Overrides {
    /// Probes the file system for override files of the container at `path`.
    pub fn resolve(path: &Path, config: &LoaderConfig) -> Self {
        let exefs_path = with_suffix(path, &config.exefs_suffix);
        let exefs = if exefs_path.is_file() { SectionSource::Overridden(exefs_path) } else { SectionSource::Embedded };

        let romfs_path = with_suffix(path, &config.romfs_suffix);
        let romfs = if romfs_path.is_file() { SectionSource::Overridden(romfs_path) } else { SectionSource::Embedded };

        let dir = with_suffix(path, &config.exefs_dir_suffix);
        let sections = if dir.is_dir() {
            config
                .sections
                .iter()
                .map(|entry| (entry.section.clone(), dir.join(&entry.file_name)))
                .filter(|(_, path)| path.is_file())
                .collect()
        } else {
            vec![]
        };

        let overrides = Self { exefs, romfs, sections };
        for (section, path) in &overrides.sections {
            log::debug!("Section '{section}' will be read from {}", path.display());
        }
        overrides
    }

    /// Where the section `name` is read from, ignoring a full ExeFS override.
    pub fn section(&self, name: &str) -> SectionSource {
        self.sections
            .iter()
            .find(|(section, _)| section == name)
            .map_or(SectionSource::Embedded, |(_, path)| SectionSource::Overridden(path.clone()))
    }

    /// Forgets the full ExeFS override, used when it turns out to be unreadable.
    pub(crate) fn drop_exefs(&mut self) {
        self.exefs = SectionSource::Embedded;
    }

    /// Returns `true` if any part of the container is overridden.
    pub fn is_tainted(&self) -> bool {
        self.exefs.is_overridden() || self.romfs.is_overridden() || !self.sections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ncch-overrides-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn nothing_found_is_untainted() {
        let dir = scratch_dir("none");
        let overrides = Overrides::resolve(&dir.join("game.cxi"), &LoaderConfig::default());
        assert!(!overrides.is_tainted());
        assert_eq!(overrides.section(".code"), SectionSource::Embedded);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn finds_section_and_romfs_files() {
        let dir = scratch_dir("some");
        let path = dir.join("game.cxi");
        fs::create_dir_all(dir.join("game.cxi.exefsdir")).unwrap();
        fs::write(dir.join("game.cxi.exefsdir/icon.icn"), b"icon").unwrap();
        fs::write(dir.join("game.cxi.romfs"), b"romfs").unwrap();

        let overrides = Overrides::resolve(&path, &LoaderConfig::default());
        assert!(overrides.is_tainted());
        assert_eq!(overrides.section("icon"), SectionSource::Overridden(dir.join("game.cxi.exefsdir/icon.icn")));
        assert_eq!(overrides.section("banner"), SectionSource::Embedded);
        assert_eq!(overrides.romfs.path(), Some(dir.join("game.cxi.romfs").as_path()));
        assert_eq!(overrides.exefs, SectionSource::Embedded);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn suffix_is_appended_to_full_name() {
        assert_eq!(with_suffix(Path::new("/a/game.cxi"), ".romfs"), PathBuf::from("/a/game.cxi.romfs"));
    }
}
