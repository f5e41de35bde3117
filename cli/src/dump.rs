use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use ncch::{config::LoaderConfig, ncch::NcchContainer};

use crate::print_hex;

#[derive(Debug, Args)]
pub struct Dump {
    /// NCCH container
    #[arg(short = 'i', long)]
    input: PathBuf,

    /// Byte offset of the container in the input file.
    #[arg(short = 'O', long, default_value_t = 0)]
    offset: u64,

    /// Shows the contents of the NCCH header.
    #[arg(short = 'H', long)]
    show_header: bool,

    /// Shows the contents of the extended header.
    #[arg(short = 'x', long)]
    show_exheader: bool,

    /// Shows the ExeFS section table.
    #[arg(short = 'e', long)]
    show_exefs: bool,

    /// Prints the contents of an ExeFS section, decompressed if needed.
    #[arg(short = 's', long, value_name = "NAME")]
    print_section: Option<String>,

    /// Prints contents as raw bytes.
    #[arg(short = 'R', long)]
    raw: bool,

    /// Prints a summary of the container as YAML.
    #[arg(long)]
    yaml: bool,
}

impl Dump {
    pub fn run(&self, config: &LoaderConfig) -> Result<()> {
        let mut container = NcchContainer::new(&self.input, self.offset).with_config(config.clone());
        container.load()?;

        if self.show_header {
            let Some(header) = container.header() else { bail!("The container has no header") };
            println!("NCCH header:\n{}", header.display(2));
        }

        if self.show_exheader {
            match container.exheader() {
                Some(exheader) => println!("Extended header:\n{}", exheader.display(2)),
                None => println!("The container has no extended header"),
            }
        }

        if self.show_exefs {
            match container.exefs_header() {
                Some(exefs) => println!("ExeFS:\n{}", exefs.display(2)),
                None => println!("The container has no ExeFS"),
            }
        }

        if let Some(name) = &self.print_section {
            let data = container.load_section_exefs(name)?;
            let base_address = match (name.as_str(), container.exheader()) {
                (".code", Some(exheader)) => exheader.codeset_info.text.address as u64,
                _ => 0,
            };
            print_hex(&data, self.raw, base_address)?;
        }

        if self.yaml {
            print!("{}", serde_yml::to_string(&container.info())?);
        }
        Ok(())
    }
}
