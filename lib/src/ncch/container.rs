use std::{
    fs::File,
    mem::size_of,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::Serialize;

use super::{
    overrides::{Overrides, SectionSource},
    raw::{CodeSegmentInfo, ExHeader, ExeFsHeader, ExeFsSection, Header, EXEFS_HEADER_SIZE},
    RomFsRange,
};
use crate::{
    compress::lz77::Lz77,
    config::LoaderConfig,
    error::{
        EncryptedSnafu, LoadError, NotFoundSnafu, NotUsedSnafu, PreviouslyFailedSnafu, RegionOutOfBoundsSnafu,
        ResultStatus,
    },
    io::{open_file, read_exact_at, read_whole_file, FileError},
};

/// Name of the ExeFS section holding the program code.
pub const CODE_SECTION: &str = ".code";
/// Name of the ExeFS section holding the boot logo.
pub const LOGO_SECTION: &str = "logo";

/// Progress of [`NcchContainer::load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadState {
    /// The file has not been opened yet.
    Unopened,
    /// The file is open but the header has not been validated.
    Opened,
    /// The header is valid. RomFS and program id reads are available.
    HeaderValidated,
    /// All headers are loaded.
    Loaded,
    /// Loading failed with the given status. Later loads return it without touching the file.
    Failed(ResultStatus),
}

/// An NCCH container on disk. Headers are read once by [`Self::load`] and cached, sections and the RomFS are read on
/// request.
pub struct NcchContainer {
    path: PathBuf,
    ncch_offset: u64,
    config: LoaderConfig,
    state: LoadState,

    file: Option<Arc<File>>,
    /// File holding the ExeFS and the absolute offset of the ExeFS header in it.
    exefs_file: Option<(Arc<File>, u64)>,
    overrides: Overrides,

    header: Header,
    exheader: ExHeader,
    exefs_header: ExeFsHeader,

    has_header: bool,
    has_exheader: bool,
    has_exefs: bool,
    has_romfs: bool,
    is_compressed: bool,

    /// Offset of the ExeFS relative to the container start, zero when the ExeFS is overridden.
    exefs_offset: u64,
}

impl NcchContainer {
    /// Creates a container for the file at `path`, whose header is `ncch_offset` bytes into the file. Nothing is read
    /// until [`Self::open_file`] or [`Self::load`] is called.
    pub fn new<P: AsRef<Path>>(path: P, ncch_offset: u64) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            ncch_offset,
            config: LoaderConfig::default(),
            state: LoadState::Unopened,
            file: None,
            exefs_file: None,
            overrides: Overrides::default(),
            header: bytemuck::Zeroable::zeroed(),
            exheader: bytemuck::Zeroable::zeroed(),
            exefs_header: bytemuck::Zeroable::zeroed(),
            has_header: false,
            has_exheader: false,
            has_exefs: false,
            has_romfs: false,
            is_compressed: false,
            exefs_offset: 0,
        }
    }

    /// Replaces the override naming conventions. Only affects loads that have not happened yet.
    pub fn with_config(mut self, config: LoaderConfig) -> Self {
        self.config = config;
        self
    }

    /// Opens the container file, if not already open.
    ///
    /// # Errors
    ///
    /// This function will return an error if the file cannot be opened.
    pub fn open_file(&mut self) -> Result<(), LoadError> {
        self.file().map(|_| ())
    }

    fn file(&mut self) -> Result<Arc<File>, LoadError> {
        if let Some(file) = &self.file {
            return Ok(file.clone());
        }
        let file = open_file(&self.path).inspect_err(|_| log::warn!("Failed to open {}", self.path.display()))?;
        log::debug!("Opened {}", self.path.display());
        let file = Arc::new(file);
        self.file = Some(file.clone());
        self.state = LoadState::Opened;
        Ok(file)
    }

    /// Reads and caches the headers and resolves overrides. Calling this again after it has succeeded does nothing, and
    /// after it has failed returns the same status without touching the file.
    ///
    /// # Errors
    ///
    /// This function will return an error if the header is invalid, the extended header is encrypted, or an I/O
    /// operation fails. A missing extended header, ExeFS or RomFS is not an error.
    pub fn load(&mut self) -> Result<(), LoadError> {
        match self.state {
            LoadState::Loaded => return Ok(()),
            LoadState::Failed(status) => return PreviouslyFailedSnafu { status }.fail(),
            _ => {}
        }
        match self.load_uncached() {
            Ok(()) => {
                self.state = LoadState::Loaded;
                Ok(())
            }
            Err(error) => {
                self.state = LoadState::Failed(error.status());
                Err(error)
            }
        }
    }

    fn load_uncached(&mut self) -> Result<(), LoadError> {
        let file = self.file()?;
        self.load_header(&file)?;
        self.state = LoadState::HeaderValidated;

        self.load_overrides();

        if self.has_exheader {
            self.load_exheader(&file)?;
        }
        self.load_exefs(&file)?;
        Ok(())
    }

    fn load_header(&mut self, file: &File) -> Result<(), LoadError> {
        let mut buf = [0u8; size_of::<Header>()];
        read_exact_at(file, self.ncch_offset, &mut buf)?;
        let header = Header::read_from_slice(&buf)?;
        header.validate()?;

        self.header = header;
        self.has_header = true;
        self.has_exheader = header.has_exheader();
        self.has_exefs = header.has_exefs();
        self.has_romfs = header.has_romfs();
        log::debug!("Program ID:                  {:016x}", header.program_id);
        log::debug!("Product code:                {}", header.product_code);
        Ok(())
    }

    /// Probes for override files next to the container and marks it as tainted if any are found. Runs as part of
    /// [`Self::load`]; calling it again re-probes the file system.
    pub fn load_overrides(&mut self) {
        self.overrides = Overrides::resolve(&self.path, &self.config);
        if self.overrides.is_tainted() {
            log::warn!("Loaded NCCH {} is tainted, application behavior may not be as expected!", self.path.display());
        } else {
            log::debug!("Loaded NCCH {} is not tainted", self.path.display());
        }
    }

    fn load_exheader(&mut self, file: &File) -> Result<(), LoadError> {
        let mut buf = vec![0u8; size_of::<ExHeader>()];
        read_exact_at(file, self.ncch_offset + size_of::<Header>() as u64, &mut buf)?;
        let exheader = ExHeader::read_from_slice(&buf)?;

        let codeset = &exheader.codeset_info;
        let caps = &exheader.arm11_system_local_caps;
        self.is_compressed = exheader.is_code_compressed();
        log::debug!("Name:                        {}", codeset.name);
        log::debug!("Code compressed:             {}", if self.is_compressed { "yes" } else { "no" });
        log::debug!("Entry point:                 {:#010x}", codeset.text.address);
        log::debug!("Code size:                   {:#010x}", codeset.text.code_size);
        log::debug!("Stack size:                  {:#010x}", codeset.stack_size);
        log::debug!("Bss size:                    {:#010x}", codeset.bss_size);
        log::debug!("Core version:                {}", caps.core_version);
        log::debug!("Thread priority:             {:#x}", caps.priority);
        log::debug!("Resource limit category:     {}", caps.resource_limit_category);
        log::debug!("System mode:                 {}", caps.flags0.system_mode());

        if !self.header.flags.no_crypto() {
            log::info!("NCCH {} does not set the no-crypto flag, assuming it was decrypted", self.path.display());
        }
        if caps.program_id != self.header.program_id {
            log::error!("ExHeader program ID mismatch: the ROM is probably encrypted.");
            return EncryptedSnafu { program_id: self.header.program_id, exheader_program_id: caps.program_id }.fail();
        }

        self.exheader = exheader;
        Ok(())
    }

    fn load_exefs(&mut self, file: &Arc<File>) -> Result<(), LoadError> {
        if let SectionSource::Overridden(path) = self.overrides.exefs.clone() {
            match Self::read_exefs_override(&path) {
                Some((override_file, exefs_header)) => {
                    log::debug!("Loading ExeFS section from {}", path.display());
                    self.exefs_header = exefs_header;
                    self.exefs_file = Some((Arc::new(override_file), 0));
                    self.exefs_offset = 0;
                    self.has_exefs = true;
                    return Ok(());
                }
                None => {
                    log::warn!("Ignoring unreadable ExeFS override {}", path.display());
                    self.overrides.drop_exefs();
                }
            }
        }

        if !self.has_exefs {
            return Ok(());
        }
        self.exefs_offset = self.header.exefs.byte_offset();
        let exefs_size = self.header.exefs.byte_size();
        log::debug!("ExeFS offset:                {:#010x}", self.exefs_offset);
        log::debug!("ExeFS size:                  {:#010x}", exefs_size);

        let base = self.ncch_offset + self.exefs_offset;
        let mut buf = [0u8; size_of::<ExeFsHeader>()];
        read_exact_at(file, base, &mut buf)?;
        let exefs_header = ExeFsHeader::read_from_slice(&buf)?;
        exefs_header.check_bounds(exefs_size)?;

        self.exefs_header = exefs_header;
        self.exefs_file = Some((file.clone(), base));
        Ok(())
    }

    fn read_exefs_override(path: &Path) -> Option<(File, ExeFsHeader)> {
        let file = open_file(path).inspect_err(|error| log::debug!("{error}")).ok()?;
        let mut buf = [0u8; size_of::<ExeFsHeader>()];
        read_exact_at(&file, 0, &mut buf).ok()?;
        let exefs_header = ExeFsHeader::read_from_slice(&buf).ok()?;
        let size = file.metadata().ok()?.len();
        exefs_header.check_bounds(size).ok()?;
        Some((file, exefs_header))
    }

    /// Reads an ExeFS section such as `.code`, `icon`, `banner` or `logo`. Override files take precedence over the
    /// container, and `.code` is decompressed if needed.
    ///
    /// # Errors
    ///
    /// This function will return an error if loading fails, the section does not exist, the compressed code is
    /// malformed, or an I/O operation fails.
    pub fn load_section_exefs(&mut self, name: &str) -> Result<Vec<u8>, LoadError> {
        self.load()?;

        match self.load_override_exefs_section(name) {
            Ok(data) => return Ok(data),
            Err(error) if matches!(error.status(), ResultStatus::ErrorNotUsed | ResultStatus::ErrorNotFound) => {}
            Err(error) => return Err(error),
        }

        // Newer containers store the logo in its own region instead of the ExeFS
        if name == LOGO_SECTION && !self.overrides.exefs.is_overridden() {
            if self.header.logo_region.is_present() {
                let file = self.file()?;
                let offset = self.ncch_offset + self.header.logo_region.byte_offset();
                return read_region(&file, offset, self.header.logo_region.byte_size(), "logo region")
                    .inspect_err(|_| log::error!("Could not read NCCH logo"));
            }
            log::info!("Attempting to load logo from the ExeFS");
        }

        let Some((file, base)) = self.exefs_file.clone().filter(|_| self.has_exefs) else {
            return NotUsedSnafu { what: "ExeFS" }.fail();
        };
        let Some(index) = self.exefs_header.position(name) else {
            return NotUsedSnafu { what: format!("ExeFS section '{name}'") }.fail();
        };
        let section: ExeFsSection = self.exefs_header.sections[index];
        log::debug!("{index} - offset: {:#010x}, size: {:#010x}, name: {}", section.offset, section.size, section.name);

        let offset = base + EXEFS_HEADER_SIZE + section.offset as u64;
        let buf = read_region(&file, offset, section.size as u64, &format!("ExeFS section '{name}'"))?;

        if name == CODE_SECTION && self.is_compressed {
            let decompressed = Lz77 {}.decompress(&buf)?;
            return Ok(decompressed.into_vec());
        }
        Ok(buf)
    }

    /// Reads an ExeFS section from its override file instead of the container, e.g. `code.bin` for `.code`.
    ///
    /// # Errors
    ///
    /// This function will return [`LoadError::NotFound`] if no override file name is known for the section, and
    /// [`LoadError::NotUsed`] if the override file was not found or cannot be read.
    pub fn load_override_exefs_section(&mut self, name: &str) -> Result<Vec<u8>, LoadError> {
        self.load()?;

        if self.config.section_file_name(name).is_none() {
            return NotFoundSnafu { name }.fail();
        }
        if let SectionSource::Overridden(path) = self.overrides.section(name) {
            if let Some(data) = read_whole_file(&path) {
                log::warn!("File {} overriding built-in ExeFS file", path.display());
                return Ok(data);
            }
            log::warn!("Override {} could not be read, using the built-in section", path.display());
        }
        NotUsedSnafu { what: format!("override for section '{name}'") }.fail()
    }

    /// Loads the container if needed, tolerating failures after the header was validated. Those only concern the
    /// executable sections, so the header and RomFS can still be used.
    fn ensure_header(&mut self) -> Result<(), LoadError> {
        match self.load() {
            Ok(()) => Ok(()),
            Err(error) if self.has_header => {
                log::debug!("Using the header of a partially loaded container: {error}");
                Ok(())
            }
            Err(error) => Err(error),
        }
    }

    /// Locates the RomFS without reading it. An override RomFS takes precedence over the embedded one.
    ///
    /// # Errors
    ///
    /// This function will return [`LoadError::NotUsed`] if the container has no RomFS, or another error if the header
    /// cannot be loaded.
    pub fn read_romfs(&mut self) -> Result<RomFsRange, LoadError> {
        self.ensure_header()?;

        if let Ok(range) = self.read_override_romfs() {
            return Ok(range);
        }

        if !self.has_romfs {
            log::debug!("RomFS requested from NCCH which has no RomFS");
            return NotUsedSnafu { what: "RomFS" }.fail();
        }

        let offset = self.ncch_offset + self.header.romfs.byte_offset();
        let size = self.header.romfs.byte_size();
        log::debug!("RomFS offset:                {:#010x}", offset);
        log::debug!("RomFS size:                  {:#010x}", size);

        let file = self.file()?;
        Ok(RomFsRange::new(file, self.path.clone(), offset, size))
    }

    /// Locates the override RomFS next to the container, if there is one.
    ///
    /// # Errors
    ///
    /// This function will return [`LoadError::NotUsed`] if there is no readable override RomFS.
    pub fn read_override_romfs(&mut self) -> Result<RomFsRange, LoadError> {
        self.ensure_header()?;

        if let SectionSource::Overridden(path) = &self.overrides.romfs {
            let opened = open_file(path).and_then(|file| Ok((file.metadata()?.len(), file)));
            match opened {
                Ok((size, file)) => {
                    log::warn!("File {} overriding built-in RomFS", path.display());
                    return Ok(RomFsRange::new(Arc::new(file), path.clone(), 0, size));
                }
                Err(error) => log::warn!("Override {} could not be opened: {error}", path.display()),
            }
        }
        NotUsedSnafu { what: "RomFS override" }.fail()
    }

    /// Returns the program ID from the header.
    ///
    /// # Errors
    ///
    /// This function will return an error if the header cannot be loaded.
    pub fn read_program_id(&mut self) -> Result<u64, LoadError> {
        self.ensure_header()?;
        Ok(self.header.program_id)
    }

    /// Returns `true` if the container has an ExeFS, either embedded or from a full override image.
    pub fn has_exefs(&self) -> bool {
        self.has_exefs
    }

    /// Returns `true` if the header declares a RomFS.
    pub fn has_romfs(&self) -> bool {
        self.has_romfs
    }

    /// Returns `true` if the header declares an extended header.
    pub fn has_exheader(&self) -> bool {
        self.has_exheader
    }

    /// Returns `true` once the header has been read and validated.
    pub fn has_header(&self) -> bool {
        self.has_header
    }

    /// Returns `true` if any part of the container is replaced by an override file.
    pub fn is_tainted(&self) -> bool {
        self.overrides.is_tainted()
    }

    /// Returns `true` if the last [`Self::load`] succeeded.
    pub fn is_loaded(&self) -> bool {
        self.state == LoadState::Loaded
    }

    /// Returns `true` if the `.code` section is compressed, as declared by the extended header.
    pub fn is_compressed(&self) -> bool {
        self.is_compressed
    }

    /// Current load state.
    pub fn state(&self) -> LoadState {
        self.state
    }

    /// Path of the container file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Byte offset of the container inside its file.
    pub fn ncch_offset(&self) -> u64 {
        self.ncch_offset
    }

    /// Offset of the ExeFS relative to the container start.
    pub fn exefs_offset(&self) -> u64 {
        self.exefs_offset
    }

    /// Override files found next to the container.
    pub fn overrides(&self) -> &Overrides {
        &self.overrides
    }

    /// The decoded header, if it has been validated.
    pub fn header(&self) -> Option<&Header> {
        self.has_header.then_some(&self.header)
    }

    /// The decoded extended header, if the container has one and it was loaded.
    pub fn exheader(&self) -> Option<&ExHeader> {
        (self.has_exheader && self.is_loaded()).then_some(&self.exheader)
    }

    /// The decoded ExeFS header, if the container has an ExeFS.
    pub fn exefs_header(&self) -> Option<&ExeFsHeader> {
        (self.has_exefs && self.exefs_file.is_some()).then_some(&self.exefs_header)
    }

    /// Summarizes the loaded container.
    pub fn info(&self) -> ContainerInfo {
        ContainerInfo {
            path: self.path.clone(),
            ncch_offset: self.ncch_offset,
            program_id: self.header().map(|header| format!("{:016x}", header.program_id)),
            product_code: self.header().map(|header| header.product_code.to_string()),
            has_exheader: self.has_exheader,
            has_exefs: self.has_exefs,
            has_romfs: self.has_romfs,
            is_tainted: self.is_tainted(),
            is_compressed: self.is_compressed,
            exefs_sections: self.exefs_header().map(|exefs| exefs.used_sections().copied().collect()).unwrap_or_default(),
            codeset: self.exheader().map(|exheader| CodeSetSummary {
                name: exheader.codeset_info.name.to_string(),
                text: exheader.codeset_info.text,
                ro: exheader.codeset_info.ro,
                data: exheader.codeset_info.data,
                stack_size: exheader.codeset_info.stack_size,
                bss_size: exheader.codeset_info.bss_size,
                priority: exheader.arm11_system_local_caps.priority,
                services: exheader.arm11_system_local_caps.services().map(|service| service.to_string()).collect(),
                dependencies: exheader.dependencies().map(|id| format!("{id:016x}")).collect(),
            }),
        }
    }
}

/// Reads `size` bytes at `offset`, after checking that they lie within the file so a corrupt size cannot cause a huge
/// allocation.
fn read_region(file: &File, offset: u64, size: u64, what: &str) -> Result<Vec<u8>, LoadError> {
    let file_size = file.metadata().map_err(FileError::from)?.len();
    if offset.checked_add(size).map_or(true, |end| end > file_size) {
        return RegionOutOfBoundsSnafu { what, offset, size, file_size }.fail();
    }
    let mut buf = vec![0u8; size as usize];
    read_exact_at(file, offset, &mut buf)?;
    Ok(buf)
}

/// Serializable summary of a container, see [`NcchContainer::info`].
#[derive(Serialize, Debug)]
pub struct ContainerInfo {
    /// Path of the container file.
    pub path: PathBuf,
    /// Byte offset of the container inside its file.
    pub ncch_offset: u64,
    /// Program id as 16 hex digits, if the header was read.
    pub program_id: Option<String>,
    /// Product code, if the header was read.
    pub product_code: Option<String>,
    /// Whether an extended header is present.
    pub has_exheader: bool,
    /// Whether an ExeFS is present.
    pub has_exefs: bool,
    /// Whether a RomFS is present.
    pub has_romfs: bool,
    /// Whether any override file is in use.
    pub is_tainted: bool,
    /// Whether `.code` is compressed.
    pub is_compressed: bool,
    /// Used ExeFS slots.
    pub exefs_sections: Vec<ExeFsSection>,
    /// Code layout, if the extended header was loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codeset: Option<CodeSetSummary>,
}

/// Serializable summary of the code set in an extended header.
#[derive(Serialize, Debug)]
pub struct CodeSetSummary {
    /// Process name.
    pub name: String,
    /// Text segment.
    pub text: CodeSegmentInfo,
    /// Read-only data segment.
    pub ro: CodeSegmentInfo,
    /// Data segment.
    pub data: CodeSegmentInfo,
    /// Stack size in bytes.
    pub stack_size: u32,
    /// BSS size in bytes.
    pub bss_size: u32,
    /// Main thread priority.
    pub priority: u8,
    /// Services the program may access.
    pub services: Vec<String>,
    /// Program ids of required modules, as hex.
    pub dependencies: Vec<String>,
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn missing_file_fails_once() {
        let path = std::env::temp_dir().join(format!("ncch-container-missing-{}.cxi", std::process::id()));
        let mut container = NcchContainer::new(&path, 0);
        assert_eq!(container.state(), LoadState::Unopened);

        let error = container.load().unwrap_err();
        assert_eq!(error.status(), ResultStatus::Error);
        assert_eq!(container.state(), LoadState::Failed(ResultStatus::Error));

        // The file appearing later does not revive a failed container
        fs::write(&path, [0u8; 0x200]).unwrap();
        let error = container.load().unwrap_err();
        assert!(matches!(error, LoadError::PreviouslyFailed { status: ResultStatus::Error, .. }));
        assert!(!container.has_header());
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn bad_magic_is_invalid_format() {
        let path = std::env::temp_dir().join(format!("ncch-container-magic-{}.cxi", std::process::id()));
        fs::write(&path, [0u8; 0x400]).unwrap();

        let mut container = NcchContainer::new(&path, 0);
        assert_eq!(container.load().unwrap_err().status(), ResultStatus::ErrorInvalidFormat);
        assert!(!container.has_header());
        assert!(container.header().is_none());
        assert_eq!(container.read_romfs().unwrap_err().status(), ResultStatus::ErrorInvalidFormat);
        fs::remove_file(path).unwrap();
    }

    #[test]
    fn exefs_override_needs_an_openable_image() {
        let dir = std::env::temp_dir().join(format!("ncch-container-exefs-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        assert!(NcchContainer::read_exefs_override(&dir.join("missing.exefs")).is_none());

        let truncated = dir.join("truncated.exefs");
        fs::write(&truncated, [0u8; 0x100]).unwrap();
        assert!(NcchContainer::read_exefs_override(&truncated).is_none());

        let mut image = vec![0u8; 0x400];
        image[..5].copy_from_slice(b"icon\0");
        image[12..16].copy_from_slice(&0x200u32.to_le_bytes());
        let valid = dir.join("valid.exefs");
        fs::write(&valid, &image).unwrap();
        let (_, exefs_header) = NcchContainer::read_exefs_override(&valid).unwrap();
        assert!(exefs_header.section("icon").is_some());

        fs::remove_dir_all(dir).unwrap();
    }
}
