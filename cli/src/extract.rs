use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
};

use anyhow::Result;
use clap::Args;
use ncch::{
    config::LoaderConfig,
    error::ResultStatus,
    io::write_file,
    ncch::NcchContainer,
};

#[derive(Debug, Args)]
pub struct Extract {
    /// NCCH container
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Byte offset of the container in the input file.
    #[arg(short = 'O', long, default_value_t = 0)]
    offset: u64,

    /// Output directory
    #[arg(short = 'o', long)]
    output: PathBuf,
}

impl Extract {
    pub fn run(&self, config: &LoaderConfig) -> Result<()> {
        let mut container = NcchContainer::new(&self.input, self.offset).with_config(config.clone());
        container.load()?;
        fs::create_dir_all(&self.output)?;

        let names: Vec<String> = container
            .exefs_header()
            .map(|exefs| exefs.used_sections().map(|section| section.name.to_string()).collect())
            .unwrap_or_default();
        if names.is_empty() {
            log::info!("{} has no ExeFS sections", self.input.display());
        }
        for name in names {
            let data = container.load_section_exefs(&name)?;
            let file_name = config.section_file_name(&name).map_or_else(|| format!("{name}.bin"), str::to_string);
            let path = self.output.join("exefs").join(file_name);
            fs::create_dir_all(self.output.join("exefs"))?;
            write_file(&path, &data)?;
            log::info!("Extracted section '{name}' to {}", path.display());
        }

        match container.read_romfs() {
            Ok(romfs) => {
                let path = self.output.join("romfs.bin");
                let mut writer = BufWriter::new(File::create(&path)?);
                let size = romfs.copy_to(&mut writer)?;
                log::info!("Extracted {size:#x} bytes of RomFS to {}", path.display());
            }
            Err(error) if error.status() == ResultStatus::ErrorNotUsed => {
                log::info!("{} has no RomFS", self.input.display());
            }
            Err(error) => return Err(error.into()),
        }
        Ok(())
    }
}
