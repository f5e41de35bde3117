use std::{fs, io, path::Path};

use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Naming conventions for override files next to a container at `<path>`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Suffix of the directory holding per-section override files, `<path><exefs_dir_suffix>/`.
    pub exefs_dir_suffix: String,
    /// Suffix of a full ExeFS image replacing the embedded one, `<path><exefs_suffix>`.
    pub exefs_suffix: String,
    /// Suffix of a full RomFS image replacing the embedded one, `<path><romfs_suffix>`.
    pub romfs_suffix: String,
    /// Override file names for each ExeFS section.
    pub sections: Vec<SectionOverride>,
}

/// Maps an ExeFS section name to the name of its override file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SectionOverride {
    /// Section name, such as `.code`.
    pub section: String,
    /// File name inside the `.exefsdir` directory.
    pub file_name: String,
}

/// Errors related to [`LoaderConfig::from_file`].
#[derive(Debug, Snafu)]
pub enum LoaderConfigError {
    /// See [`io::Error`].
    #[snafu(transparent)]
    Io {
        /// Source error.
        source: io::Error,
    },
    /// See [`serde_yml::Error`].
    #[snafu(transparent)]
    SerdeYml {
        /// Source error.
        source: serde_yml::Error,
    },
}

impl Default for LoaderConfig {
    fn default() -> Self {
        let sections = [(".code", "code.bin"), ("logo", "logo.bcma.lz"), ("icon", "icon.icn"), ("banner", "banner.bnr")]
            .into_iter()
            .map(|(section, file_name)| SectionOverride { section: section.to_string(), file_name: file_name.to_string() })
            .collect();
        Self {
            exefs_dir_suffix: ".exefsdir".to_string(),
            exefs_suffix: ".exefs".to_string(),
            romfs_suffix: ".romfs".to_string(),
            sections,
        }
    }
}

impl LoaderConfig {
    /// Loads from a YAML file. Missing keys keep their default values.
    ///
    /// # Errors
    ///
    /// This function will return an error if the file cannot be read or is not valid YAML.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, LoaderConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Loads from a YAML string. Missing keys keep their default values.
    ///
    /// # Errors
    ///
    /// This function will return an error if the string is not valid YAML.
    pub fn from_yaml(text: &str) -> Result<Self, LoaderConfigError> {
        Ok(serde_yml::from_str(text)?)
    }

    /// Returns the override file name for an ExeFS section, if one is known.
    pub fn section_file_name(&self, section: &str) -> Option<&str> {
        self.sections.iter().find(|entry| entry.section == section).map(|entry| entry.file_name.as_str())
    }
}
